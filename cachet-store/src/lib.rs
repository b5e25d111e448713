#![warn(missing_docs)]
//! # cachet-store
//!
//! Storage abstraction for the cachet client-side HTTP cache.
//!
//! The [`CacheStore`] trait is the contract between the middleware and any
//! backing storage: `fetch`, `cache`, `update`, and `remove` keyed by
//! [`CacheKey`](cachet_core::CacheKey). [`MokaStore`] is the bundled
//! in-memory implementation; custom backends (disk, redis, ...) implement
//! the same trait and may persist entries in any format —
//! [`CacheEntry`](cachet_core::CacheEntry) derives serde for that purpose.

mod error;
mod memory;
mod store;

pub use error::StoreError;
pub use memory::{MokaStore, MokaStoreBuilder};
pub use store::{CacheStore, DeleteStatus, StoreResult};
