#![warn(missing_docs)]
//! # cachet
//!
//! RFC 7234 client-side response caching middleware for
//! [`reqwest`](https://docs.rs/reqwest), built on
//! [`reqwest-middleware`](https://docs.rs/reqwest-middleware).
//!
//! The middleware interposes a [`CacheStore`] between the application and
//! the upstream server. Per request it serves fresh entries directly,
//! serves stale entries while revalidating in the background
//! (`stale-while-revalidate`), revalidates conditionally with stored
//! `ETag`/`Last-Modified` validators, falls back to stale entries when the
//! upstream fails (`stale-if-error`), and stores cacheable origin
//! responses.
//!
//! # Example
//!
//! ```no_run
//! use cachet::{CacheMiddleware, MokaStore};
//! use reqwest::Client;
//! use reqwest_middleware::ClientBuilder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let middleware = CacheMiddleware::builder()
//!     .store(MokaStore::new(10_000))
//!     .debug(true)
//!     .build();
//!
//! let client = ClientBuilder::new(Client::new())
//!     .with(middleware.clone())
//!     .build();
//!
//! // Route background revalidations back through the cached client.
//! middleware.set_revalidation_client(client.clone());
//!
//! let response = client.get("https://api.example/users").send().await?;
//! println!("{:?}", response.headers().get("x-cache-status"));
//!
//! // Drain pending background revalidations before exit.
//! middleware.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod convert;
pub mod middleware;
pub mod revalidate;

pub use middleware::{
    CacheMiddleware, CacheMiddlewareBuilder, DEFAULT_DEBUG_HEADER, NotSet, REVALIDATION_MARKER,
};
pub use revalidate::RevalidationManager;

pub use cachet_core::{CacheControl, CacheEntry, CacheKey, CacheStatus, StoredResponse};
pub use cachet_store::{CacheStore, DeleteStatus, MokaStore, StoreError, StoreResult};
