//! The storage contract.

use std::sync::Arc;

use async_trait::async_trait;
use cachet_core::{CacheEntry, CacheKey};

use crate::StoreError;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a remove operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    /// An entry existed under the key and was removed.
    Deleted,
    /// No entry was stored under the key.
    Missing,
}

/// Storage abstraction keyed by request fingerprint.
///
/// At most one entry exists per key: `cache` overwrites. Implementations
/// must tolerate concurrent access from foreground requests and background
/// revalidation tasks; individual operations must be logically atomic.
///
/// Eviction policy is the backend's business. Entries should outlive their
/// freshness lifetime whenever possible — a stale entry is still the input
/// to conditional revalidation and stale-on-error serving.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Looks up the entry stored under `key`.
    async fn fetch(&self, key: &CacheKey) -> StoreResult<Option<CacheEntry>>;

    /// Stores `entry` under `key`, overwriting any existing entry.
    async fn cache(&self, key: CacheKey, entry: CacheEntry) -> StoreResult<()>;

    /// Stores the outcome of a successful revalidation.
    ///
    /// Semantically identical to [`cache`](CacheStore::cache); split out so
    /// backends can account revalidation hits separately.
    async fn update(&self, key: CacheKey, entry: CacheEntry) -> StoreResult<()> {
        self.cache(key, entry).await
    }

    /// Removes the entry stored under `key`.
    async fn remove(&self, key: &CacheKey) -> StoreResult<DeleteStatus>;
}

#[async_trait]
impl<S> CacheStore for Arc<S>
where
    S: CacheStore + ?Sized,
{
    async fn fetch(&self, key: &CacheKey) -> StoreResult<Option<CacheEntry>> {
        (**self).fetch(key).await
    }

    async fn cache(&self, key: CacheKey, entry: CacheEntry) -> StoreResult<()> {
        (**self).cache(key, entry).await
    }

    async fn update(&self, key: CacheKey, entry: CacheEntry) -> StoreResult<()> {
        (**self).update(key, entry).await
    }

    async fn remove(&self, key: &CacheKey) -> StoreResult<DeleteStatus> {
        (**self).remove(key).await
    }
}

#[async_trait]
impl CacheStore for Box<dyn CacheStore> {
    async fn fetch(&self, key: &CacheKey) -> StoreResult<Option<CacheEntry>> {
        (**self).fetch(key).await
    }

    async fn cache(&self, key: CacheKey, entry: CacheEntry) -> StoreResult<()> {
        (**self).cache(key, entry).await
    }

    async fn update(&self, key: CacheKey, entry: CacheEntry) -> StoreResult<()> {
        (**self).update(key, entry).await
    }

    async fn remove(&self, key: &CacheKey) -> StoreResult<DeleteStatus> {
        (**self).remove(key).await
    }
}
