//! Stored cache entries and freshness arithmetic.
//!
//! A [`CacheEntry`] wraps an origin response with the two timestamps
//! bounding its round trip and a [`FreshnessPolicy`] derived from the
//! response headers. All freshness decisions are timestamp comparisons
//! against a caller-supplied `now`, so the predicates are deterministic and
//! cheap to test.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{DATE, ETAG, EXPIRES, LAST_MODIFIED};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use crate::directives::CacheControl;

/// An origin response as received, body fully materialized.
///
/// The body is [`Bytes`], so every hand-off reads the complete payload from
/// offset zero; cloning shares the underlying buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResponse {
    /// Origin status code.
    #[serde(with = "http_serde::status_code")]
    pub status: StatusCode,
    /// Origin headers, multi-valued.
    #[serde(with = "http_serde::header_map")]
    pub headers: HeaderMap,
    /// Materialized body bytes.
    pub body: Bytes,
}

/// Freshness metadata derived from origin response headers.
///
/// Recorded alongside the response so backends can persist it, but always
/// recomputable from the stored headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessPolicy {
    freshness_lifetime: i64,
    stale_while_revalidate: Option<i64>,
    stale_if_error: Option<i64>,
    must_revalidate: bool,
    no_cache: bool,
}

impl FreshnessPolicy {
    /// Derives the policy from response headers.
    ///
    /// The freshness lifetime comes from `Cache-Control: max-age`, falling
    /// back to `Expires − Date`, falling back to zero.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let control = CacheControl::from_headers(headers);
        let freshness_lifetime = control
            .max_age
            .or_else(|| expires_minus_date(headers))
            .unwrap_or(0);
        FreshnessPolicy {
            freshness_lifetime,
            stale_while_revalidate: control.stale_while_revalidate,
            stale_if_error: control.stale_if_error,
            must_revalidate: control.must_revalidate,
            no_cache: control.no_cache,
        }
    }

    /// Seconds the response stays fresh after `response_time`.
    pub fn freshness_lifetime(&self) -> i64 {
        self.freshness_lifetime
    }
}

fn expires_minus_date(headers: &HeaderMap) -> Option<i64> {
    let expires = parse_http_date(headers.get(EXPIRES)?)?;
    let date = parse_http_date(headers.get(DATE)?)?;
    Some((expires - date).num_seconds())
}

fn parse_http_date(value: &HeaderValue) -> Option<DateTime<Utc>> {
    let value = value.to_str().ok()?;
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// A stored response plus the metadata needed for freshness decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    response: StoredResponse,
    request_time: DateTime<Utc>,
    response_time: DateTime<Utc>,
    policy: FreshnessPolicy,
}

impl CacheEntry {
    /// Builds an entry from an origin response and the timestamps bounding
    /// its round trip.
    ///
    /// `response_time` is clamped to `request_time` so the stored invariant
    /// `response_time >= request_time` holds even under clock skew.
    pub fn new(
        response: StoredResponse,
        request_time: DateTime<Utc>,
        response_time: DateTime<Utc>,
    ) -> Self {
        let policy = FreshnessPolicy::from_headers(&response.headers);
        CacheEntry {
            response,
            request_time,
            response_time: response_time.max(request_time),
            policy,
        }
    }

    /// The stored origin response.
    ///
    /// The body is a full buffer; callers may read it from offset zero any
    /// number of times.
    pub fn response(&self) -> &StoredResponse {
        &self.response
    }

    /// When the request that produced this entry was sent.
    pub fn request_time(&self) -> DateTime<Utc> {
        self.request_time
    }

    /// When the origin response was received.
    pub fn response_time(&self) -> DateTime<Utc> {
        self.response_time
    }

    /// The derived freshness policy.
    pub fn policy(&self) -> &FreshnessPolicy {
        &self.policy
    }

    /// Corrected age in seconds: time since the response was received plus
    /// the origin round trip.
    pub fn age(&self, now: DateTime<Utc>) -> i64 {
        let resident = (now - self.response_time).num_seconds().max(0);
        let round_trip = (self.response_time - self.request_time).num_seconds().max(0);
        resident + round_trip
    }

    /// Whether the entry is still within its freshness lifetime.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.policy.freshness_lifetime > self.age(now)
    }

    /// Seconds past the freshness lifetime; negative while fresh.
    pub fn stale_age(&self, now: DateTime<Utc>) -> i64 {
        self.age(now) - self.policy.freshness_lifetime
    }

    /// Whether the entry carries an `ETag` or `Last-Modified` validator.
    pub fn has_validators(&self) -> bool {
        self.etag().is_some() || self.last_modified().is_some()
    }

    /// Stored `ETag` validator, if any.
    pub fn etag(&self) -> Option<&HeaderValue> {
        self.response.headers.get(ETAG)
    }

    /// Stored `Last-Modified` validator, if any.
    pub fn last_modified(&self) -> Option<&HeaderValue> {
        self.response.headers.get(LAST_MODIFIED)
    }

    /// Whether the staleness falls inside the `stale-while-revalidate`
    /// window. Always false when the directive is absent.
    pub fn within_stale_while_revalidate(&self, now: DateTime<Utc>) -> bool {
        self.policy
            .stale_while_revalidate
            .is_some_and(|window| self.stale_age(now) <= window)
    }

    /// Whether the entry may stand in for a failed upstream. Always false
    /// when `stale-if-error` is absent.
    pub fn serve_stale_if_error(&self, now: DateTime<Utc>) -> bool {
        self.policy
            .stale_if_error
            .is_some_and(|window| self.stale_age(now) <= window)
    }

    /// Whether the response carried `no-cache`: it must be revalidated
    /// before every reuse.
    pub fn requires_validation(&self) -> bool {
        self.policy.no_cache
    }

    /// Whether the entry may be served stale at all. False when the
    /// response carried `must-revalidate`.
    pub fn allows_stale(&self) -> bool {
        !self.policy.must_revalidate
    }

    /// Applies a `304 Not Modified` revalidation result.
    ///
    /// The merged entry keeps the stored status and body, takes the fresh
    /// headers, and carries over each stored header the origin did not
    /// resend — except `skip`, which names the middleware's own annotation
    /// header and must never be replayed from storage. Freshness metadata
    /// is recomputed from the merged headers and the timestamps are
    /// replaced.
    pub fn merge_not_modified(
        &self,
        fresh_headers: &HeaderMap,
        request_time: DateTime<Utc>,
        response_time: DateTime<Utc>,
        skip: &HeaderName,
    ) -> CacheEntry {
        let mut headers = fresh_headers.clone();
        for name in self.response.headers.keys() {
            if name == skip || headers.contains_key(name) {
                continue;
            }
            for value in self.response.headers.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        CacheEntry::new(
            StoredResponse {
                status: self.response.status,
                headers,
                body: self.response.body.clone(),
            },
            request_time,
            response_time,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use http::header::CACHE_CONTROL;

    fn entry_with(headers: HeaderMap, stored_ago: i64) -> CacheEntry {
        let stored_at = Utc::now() - Duration::seconds(stored_ago);
        CacheEntry::new(
            StoredResponse {
                status: StatusCode::OK,
                headers,
                body: Bytes::from_static(b"payload"),
            },
            stored_at,
            stored_at,
        )
    }

    fn cache_control(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn fresh_within_max_age() {
        let entry = entry_with(cache_control("max-age=60"), 10);
        let now = Utc::now();
        assert!(entry.is_fresh(now));
        assert!(entry.stale_age(now) < 0);
    }

    #[test]
    fn stale_past_max_age() {
        let entry = entry_with(cache_control("max-age=60"), 90);
        let now = Utc::now();
        assert!(!entry.is_fresh(now));
        assert!(entry.stale_age(now) >= 30);
    }

    #[test]
    fn freshness_is_monotonic() {
        let entry = entry_with(cache_control("max-age=60"), 30);
        let now = Utc::now();
        let earlier = now - Duration::seconds(20);
        assert!(entry.is_fresh(now));
        assert!(entry.is_fresh(earlier));
        // Once fresh at t, it was fresh at every t' <= t.
        assert!(entry.age(earlier) <= entry.age(now));
    }

    #[test]
    fn lifetime_from_expires_when_max_age_absent() {
        let date = Utc::now();
        let expires = date + Duration::seconds(120);
        let mut headers = HeaderMap::new();
        headers.insert(DATE, date.to_rfc2822().parse().unwrap());
        headers.insert(EXPIRES, expires.to_rfc2822().parse().unwrap());
        let entry = entry_with(headers, 0);
        assert_eq!(entry.policy().freshness_lifetime(), 120);
    }

    #[test]
    fn lifetime_defaults_to_zero() {
        let entry = entry_with(HeaderMap::new(), 0);
        assert_eq!(entry.policy().freshness_lifetime(), 0);
        assert!(!entry.is_fresh(Utc::now()));
    }

    #[test]
    fn age_counts_round_trip() {
        let response_time = Utc::now();
        let request_time = response_time - Duration::seconds(3);
        let entry = CacheEntry::new(
            StoredResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            },
            request_time,
            response_time,
        );
        assert_eq!(entry.age(response_time), 3);
    }

    #[test]
    fn skewed_clock_is_clamped() {
        let request_time = Utc::now();
        let response_time = request_time - Duration::seconds(5);
        let entry = CacheEntry::new(
            StoredResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            },
            request_time,
            response_time,
        );
        assert_eq!(entry.response_time(), entry.request_time());
        assert_eq!(entry.age(request_time), 0);
    }

    #[test]
    fn validators_detected() {
        let mut headers = cache_control("max-age=60");
        assert!(!entry_with(headers.clone(), 0).has_validators());
        headers.insert(ETAG, HeaderValue::from_static("\"v1\""));
        let entry = entry_with(headers, 0);
        assert!(entry.has_validators());
        assert_eq!(entry.etag().unwrap(), "\"v1\"");
    }

    #[test]
    fn stale_windows() {
        let entry = entry_with(
            cache_control("max-age=60, stale-while-revalidate=30, stale-if-error=3600"),
            70,
        );
        let now = Utc::now();
        assert!(entry.within_stale_while_revalidate(now));
        assert!(entry.serve_stale_if_error(now));

        let beyond = entry_with(cache_control("max-age=60, stale-while-revalidate=30"), 120);
        assert!(!beyond.within_stale_while_revalidate(now));
        assert!(!beyond.serve_stale_if_error(now));
    }

    #[test]
    fn revalidation_flags() {
        let entry = entry_with(cache_control("max-age=60, no-cache, must-revalidate"), 0);
        assert!(entry.requires_validation());
        assert!(!entry.allows_stale());
    }

    #[test]
    fn merge_keeps_body_and_status_takes_fresh_headers() {
        let mut stored = cache_control("max-age=60");
        stored.insert(ETAG, HeaderValue::from_static("\"v1\""));
        stored.insert("x-kept", HeaderValue::from_static("old"));
        stored.insert("x-replaced", HeaderValue::from_static("old"));
        let entry = entry_with(stored, 120);

        let mut fresh = cache_control("max-age=60");
        fresh.insert("x-served-by", HeaderValue::from_static("cache2"));
        fresh.insert("x-replaced", HeaderValue::from_static("new"));

        let now = Utc::now();
        let merged =
            entry.merge_not_modified(&fresh, now, now, &HeaderName::from_static("x-cache-status"));

        let response = merged.response();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"payload"));
        assert_eq!(response.headers.get("x-served-by").unwrap(), "cache2");
        assert_eq!(response.headers.get("x-replaced").unwrap(), "new");
        assert_eq!(response.headers.get("x-kept").unwrap(), "old");
        assert_eq!(response.headers.get(ETAG).unwrap(), "\"v1\"");
        assert!(merged.is_fresh(now));
    }

    #[test]
    fn merge_never_replays_the_annotation_header() {
        let mut stored = cache_control("max-age=60");
        stored.insert("x-cache-status", HeaderValue::from_static("HIT"));
        let entry = entry_with(stored, 120);

        let now = Utc::now();
        let merged = entry.merge_not_modified(
            &HeaderMap::new(),
            now,
            now,
            &HeaderName::from_static("x-cache-status"),
        );
        assert!(merged.response().headers.get("x-cache-status").is_none());
    }

    #[test]
    fn merge_carries_multi_valued_headers() {
        let mut stored = cache_control("max-age=60");
        stored.append("set-cookie", HeaderValue::from_static("a=1"));
        stored.append("set-cookie", HeaderValue::from_static("b=2"));
        let entry = entry_with(stored, 0);

        let now = Utc::now();
        let merged = entry.merge_not_modified(
            &HeaderMap::new(),
            now,
            now,
            &HeaderName::from_static("x-cache-status"),
        );
        let cookies: Vec<_> = merged
            .response()
            .headers
            .get_all("set-cookie")
            .iter()
            .map(|value| value.to_str().unwrap())
            .collect();
        assert_eq!(cookies, ["a=1", "b=2"]);
    }

    #[test]
    fn entry_survives_serde_round_trip() {
        let mut headers = cache_control("max-age=60");
        headers.insert(ETAG, HeaderValue::from_static("\"v1\""));
        let entry = entry_with(headers, 10);

        let encoded = serde_json::to_vec(&entry).unwrap();
        let decoded: CacheEntry = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded.response().status, entry.response().status);
        assert_eq!(decoded.response().body, entry.response().body);
        assert_eq!(decoded.etag(), entry.etag());
        assert_eq!(decoded.policy(), entry.policy());
    }
}
