//! Cache middleware for reqwest-middleware.
//!
//! [`CacheMiddleware`] implements [`reqwest_middleware::Middleware`] and
//! interposes a [`CacheStore`] between the application and the upstream
//! server. For each request it decides whether a stored response can be
//! served directly, served stale while a revalidation runs in the
//! background, validated conditionally against the origin, or fetched
//! fresh — and updates the store with the outcome.
//!
//! Use [`CacheMiddleware::builder()`] to construct an instance.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use cachet_core::{CacheControl, CacheEntry, CacheKey, CacheStatus, StoredResponse};
use cachet_store::CacheStore;
use chrono::{DateTime, Utc};
use http::header::{HeaderMap, HeaderName, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use http::{Extensions, Method, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware::{ClientWithMiddleware, Middleware, Next, Result};
use tracing::{debug, warn};

use crate::convert;
use crate::revalidate::RevalidationManager;

/// Internal marker tagging requests issued by background revalidation.
///
/// Stripped from any request before it reaches the next handler, so
/// revalidation traffic looping back through this middleware is delegated
/// instead of re-entering the cache decision.
pub const REVALIDATION_MARKER: HeaderName = HeaderName::from_static("x-cache-revalidation");

/// Default header name for the HIT/MISS/STALE annotation.
pub const DEFAULT_DEBUG_HEADER: HeaderName = HeaderName::from_static("x-cache-status");

/// Statuses a response may carry and still be stored.
///
/// The heuristically cacheable set of RFC 7231 §6.1; anything else passes
/// through uncached.
const CACHEABLE_STATUS: [u16; 10] = [200, 203, 204, 300, 301, 404, 405, 410, 414, 501];

fn is_cacheable_status(status: StatusCode) -> bool {
    CACHEABLE_STATUS.contains(&status.as_u16())
}

/// Marker type for unset builder fields.
pub struct NotSet;

#[derive(Clone)]
struct Options {
    enabled: bool,
    methods: HashSet<Method>,
    debug: bool,
    debug_header: HeaderName,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enabled: true,
            methods: HashSet::from([Method::GET]),
            debug: false,
            debug_header: DEFAULT_DEBUG_HEADER,
        }
    }
}

/// Client-side caching middleware for reqwest.
///
/// The store is the only mandatory component; see
/// [`CacheMiddlewareBuilder`] for the recognized options. Cloning shares
/// the store, the revalidation task list, and the registered revalidation
/// client.
pub struct CacheMiddleware<S> {
    store: Arc<S>,
    options: Options,
    revalidations: RevalidationManager,
    client: Arc<OnceLock<ClientWithMiddleware>>,
}

impl CacheMiddleware<NotSet> {
    /// Creates a new builder for constructing cache middleware.
    ///
    /// [`store()`](CacheMiddlewareBuilder::store) must be called before
    /// [`build()`](CacheMiddlewareBuilder::build).
    pub fn builder() -> CacheMiddlewareBuilder<NotSet> {
        CacheMiddlewareBuilder::new()
    }
}

impl<S> Clone for CacheMiddleware<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            options: self.options.clone(),
            revalidations: self.revalidations.clone(),
            client: Arc::clone(&self.client),
        }
    }
}

impl<S> CacheMiddleware<S> {
    /// Registers the client used for background revalidation.
    ///
    /// The client usually wraps this very middleware; the marker header
    /// keeps its requests from re-entering the cache decision. Without a
    /// registered client, stale-while-revalidate degrades to inline
    /// validation.
    ///
    /// Returns `false` if a client was already registered.
    pub fn set_revalidation_client(&self, client: ClientWithMiddleware) -> bool {
        self.client.set(client).is_ok()
    }

    /// The background revalidation task list.
    pub fn revalidations(&self) -> &RevalidationManager {
        &self.revalidations
    }

    /// Drains all pending background revalidations.
    ///
    /// Call before process exit so revalidation side effects complete
    /// deterministically. [`revalidations()`](Self::revalidations) exposes
    /// `cancel_all` and `wait_all_timeout` when a bounded shutdown is
    /// needed instead.
    pub async fn shutdown(&self) {
        self.revalidations.wait_all().await;
    }
}

fn add_conditional_headers(headers: &mut HeaderMap, entry: &CacheEntry) {
    if let Some(last_modified) = entry.last_modified() {
        headers.insert(IF_MODIFIED_SINCE, last_modified.clone());
    }
    if let Some(etag) = entry.etag() {
        headers.insert(IF_NONE_MATCH, etag.clone());
    }
}

impl<S> CacheMiddleware<S>
where
    S: CacheStore + 'static,
{
    fn tag(&self, response: &mut Response, status: CacheStatus) {
        if self.options.debug {
            response
                .headers_mut()
                .insert(self.options.debug_header.clone(), status.as_header_value());
        }
    }

    fn serve_entry(&self, entry: &CacheEntry, status: CacheStatus) -> Response {
        let mut response = convert::response_from_stored(entry.response());
        self.tag(&mut response, status);
        response
    }

    /// Sends the conditional request off the request path and folds the
    /// outcome back into the store. Failures never reach the caller.
    fn spawn_revalidation(
        &self,
        key: CacheKey,
        entry: CacheEntry,
        mut request: Request,
        client: ClientWithMiddleware,
    ) {
        add_conditional_headers(request.headers_mut(), &entry);
        request
            .headers_mut()
            .insert(REVALIDATION_MARKER, HeaderValue::from_static("1"));

        let store = Arc::clone(&self.store);
        let debug_header = self.options.debug_header.clone();
        self.revalidations.spawn(async move {
            let request_time = Utc::now();
            let response = match client.execute(request).await {
                Ok(response) => response,
                Err(error) => {
                    debug!(%error, key = %key, "background revalidation failed");
                    return;
                }
            };
            let response_time = Utc::now();

            if response.status() == StatusCode::NOT_MODIFIED {
                let merged = entry.merge_not_modified(
                    response.headers(),
                    request_time,
                    response_time,
                    &debug_header,
                );
                if let Err(error) = store.update(key, merged).await {
                    warn!(%error, "store update failed after background revalidation");
                }
                return;
            }

            let control = CacheControl::from_headers(response.headers());
            if !is_cacheable_status(response.status()) || control.no_store {
                return;
            }
            let status = response.status();
            let headers = response.headers().clone();
            match response.bytes().await {
                Ok(body) => {
                    let fresh = CacheEntry::new(
                        StoredResponse {
                            status,
                            headers,
                            body,
                        },
                        request_time,
                        response_time,
                    );
                    if let Err(error) = store.cache(key, fresh).await {
                        warn!(%error, "store write failed after background revalidation");
                    }
                }
                Err(error) => {
                    debug!(%error, "failed to read revalidated response body");
                }
            }
        });
    }

    async fn on_response(
        &self,
        key: CacheKey,
        entry: Option<CacheEntry>,
        response: Response,
        request_time: DateTime<Utc>,
        response_time: DateTime<Utc>,
    ) -> Result<Response> {
        let status = response.status();

        if status.is_server_error()
            && let Some(entry) = entry
                .as_ref()
                .filter(|entry| entry.serve_stale_if_error(response_time))
        {
            debug!(%status, "serving stale entry for upstream server error");
            return Ok(self.serve_entry(entry, CacheStatus::Stale));
        }

        if status == StatusCode::NOT_MODIFIED && let Some(entry) = &entry {
            let merged = entry.merge_not_modified(
                response.headers(),
                request_time,
                response_time,
                &self.options.debug_header,
            );
            let mut merged_response = convert::response_from_stored(merged.response());
            self.tag(&mut merged_response, CacheStatus::Hit);
            if let Err(error) = self.store.update(key, merged).await {
                warn!(%error, "store update failed after revalidation");
            }
            return Ok(merged_response);
        }

        let control = CacheControl::from_headers(response.headers());
        if is_cacheable_status(status) && !control.no_store {
            let (parts, body) = convert::materialize(response).await?;
            let fresh = CacheEntry::new(
                StoredResponse {
                    status: parts.status,
                    headers: parts.headers.clone(),
                    body: body.clone(),
                },
                request_time,
                response_time,
            );
            if let Err(error) = self.store.cache(key, fresh).await {
                warn!(%error, "store write failed");
            }
            let mut response = convert::rebuild(parts, body);
            self.tag(&mut response, CacheStatus::Miss);
            return Ok(response);
        }

        let mut response = response;
        self.tag(&mut response, CacheStatus::Miss);
        Ok(response)
    }
}

#[async_trait]
impl<S> Middleware for CacheMiddleware<S>
where
    S: CacheStore + 'static,
{
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if !self.options.enabled {
            return next.run(req, extensions).await;
        }

        if req.headers().contains_key(REVALIDATION_MARKER) {
            req.headers_mut().remove(REVALIDATION_MARKER);
            return next.run(req, extensions).await;
        }

        if !self.options.methods.contains(req.method()) {
            let mut response = next.run(req, extensions).await?;
            self.tag(&mut response, CacheStatus::Miss);
            return Ok(response);
        }

        let directives = CacheControl::from_headers(req.headers());
        let key = CacheKey::of(req.url().as_str());
        let entry = match self.store.fetch(&key).await {
            Ok(entry) => entry,
            Err(error) => {
                warn!(%error, key = %key, "store fetch failed, treating as miss");
                None
            }
        };

        let now = Utc::now();
        if let Some(entry) = &entry {
            let min_fresh_satisfied = directives
                .min_fresh
                .is_none_or(|min_fresh| entry.stale_age(now) + min_fresh <= 0);
            if entry.is_fresh(now) && !entry.requires_validation() && min_fresh_satisfied {
                return Ok(self.serve_entry(entry, CacheStatus::Hit));
            }

            let within_accepted_staleness = directives
                .max_stale_seconds
                .is_none_or(|limit| entry.stale_age(now) <= limit);
            if directives.max_stale
                && entry.allows_stale()
                && !entry.requires_validation()
                && within_accepted_staleness
            {
                return Ok(self.serve_entry(entry, CacheStatus::Hit));
            }

            if entry.has_validators() && !directives.only_if_cached {
                let revalidatable = entry.allows_stale()
                    && !entry.requires_validation()
                    && entry.within_stale_while_revalidate(now);
                if revalidatable && let Some(client) = self.client.get() {
                    let response = self.serve_entry(entry, CacheStatus::Stale);
                    self.spawn_revalidation(key, entry.clone(), req, client.clone());
                    return Ok(response);
                }
                add_conditional_headers(req.headers_mut(), entry);
            }
        } else if directives.only_if_cached {
            let mut response = convert::gateway_timeout();
            self.tag(&mut response, CacheStatus::Miss);
            return Ok(response);
        }

        let request_time = Utc::now();
        match next.run(req, extensions).await {
            Ok(response) => {
                self.on_response(key, entry, response, request_time, Utc::now())
                    .await
            }
            Err(error) => {
                if let Some(entry) = entry.filter(|entry| entry.serve_stale_if_error(Utc::now())) {
                    debug!(%error, "serving stale entry after transport failure");
                    return Ok(self.serve_entry(&entry, CacheStatus::Stale));
                }
                Err(error)
            }
        }
    }
}

/// Builder for [`CacheMiddleware`] with a fluent API.
///
/// Obtained via [`CacheMiddleware::builder()`].
/// [`store()`](Self::store) must be called before [`build()`](Self::build);
/// the typestate makes forgetting it a compile error.
pub struct CacheMiddlewareBuilder<S> {
    store: S,
    options: Options,
    client: Option<ClientWithMiddleware>,
}

impl CacheMiddlewareBuilder<NotSet> {
    /// Creates a new builder. Equivalent to [`CacheMiddleware::builder()`].
    pub fn new() -> Self {
        Self {
            store: NotSet,
            options: Options::default(),
            client: None,
        }
    }
}

impl Default for CacheMiddlewareBuilder<NotSet> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> CacheMiddlewareBuilder<S> {
    /// Sets the cache store.
    pub fn store<NS>(self, store: NS) -> CacheMiddlewareBuilder<Arc<NS>>
    where
        NS: CacheStore,
    {
        CacheMiddlewareBuilder {
            store: Arc::new(store),
            options: self.options,
            client: self.client,
        }
    }

    /// Enables or disables the cache entirely.
    ///
    /// When disabled the middleware delegates every request unchanged and
    /// never touches the store. Defaults to enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.options.enabled = enabled;
        self
    }

    /// Sets the HTTP methods eligible for caching.
    ///
    /// Defaults to `GET` only.
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.options.methods = methods.into_iter().collect();
        self
    }

    /// Enables the HIT/MISS/STALE annotation header on every response.
    ///
    /// Defaults to off.
    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    /// Sets the annotation header name.
    ///
    /// Defaults to `x-cache-status`.
    pub fn debug_header(mut self, name: HeaderName) -> Self {
        self.options.debug_header = name;
        self
    }

    /// Sets the client used for background revalidation.
    ///
    /// When the client should wrap this very middleware, build first and
    /// register it afterwards with
    /// [`CacheMiddleware::set_revalidation_client`].
    pub fn revalidation_client(mut self, client: ClientWithMiddleware) -> Self {
        self.client = Some(client);
        self
    }
}

impl<S> CacheMiddlewareBuilder<Arc<S>>
where
    S: CacheStore,
{
    /// Builds the cache middleware.
    pub fn build(self) -> CacheMiddleware<S> {
        let client = Arc::new(OnceLock::new());
        if let Some(registered) = self.client {
            let _ = client.set(registered);
        }
        CacheMiddleware {
            store: self.store,
            options: self.options,
            revalidations: RevalidationManager::new(),
            client,
        }
    }
}
