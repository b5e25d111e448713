//! In-memory store built on moka.

use std::time::Duration;

use async_trait::async_trait;
use cachet_core::{CacheEntry, CacheKey};
use moka::future::{Cache, CacheBuilder};

use crate::{CacheStore, DeleteStatus, StoreResult};

/// In-memory cache store backed by moka's concurrent cache.
///
/// Eviction is size-based (TinyLFU) with optional wall-clock bounds set on
/// the builder. Entries are not evicted at freshness end: stale entries
/// remain available for conditional revalidation and stale-on-error
/// serving until capacity or the configured TTL pushes them out.
///
/// Cloning is cheap and shares the underlying cache.
///
/// # Example
///
/// ```
/// use cachet_store::MokaStore;
///
/// let store = MokaStore::builder(10_000).build();
/// ```
#[derive(Clone, Debug)]
pub struct MokaStore {
    cache: Cache<CacheKey, CacheEntry>,
}

impl MokaStore {
    /// Creates a builder with the given maximum entry count.
    pub fn builder(max_capacity: u64) -> MokaStoreBuilder {
        MokaStoreBuilder::new(max_capacity)
    }

    /// Creates a store with the given capacity and no time bounds.
    pub fn new(max_capacity: u64) -> Self {
        Self::builder(max_capacity).build()
    }

    /// Number of entries currently stored.
    ///
    /// Moka maintains this estimate lazily; call
    /// [`run_pending_tasks`](Self::run_pending_tasks) first when an exact
    /// count matters (tests, admin endpoints).
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Flushes moka's pending housekeeping (evictions, counters).
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl CacheStore for MokaStore {
    async fn fetch(&self, key: &CacheKey) -> StoreResult<Option<CacheEntry>> {
        Ok(self.cache.get(key).await)
    }

    async fn cache(&self, key: CacheKey, entry: CacheEntry) -> StoreResult<()> {
        self.cache.insert(key, entry).await;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> StoreResult<DeleteStatus> {
        match self.cache.remove(key).await {
            Some(_) => Ok(DeleteStatus::Deleted),
            None => Ok(DeleteStatus::Missing),
        }
    }
}

/// Builder for [`MokaStore`].
pub struct MokaStoreBuilder {
    builder: CacheBuilder<CacheKey, CacheEntry, Cache<CacheKey, CacheEntry>>,
}

impl MokaStoreBuilder {
    /// Creates a new builder with the specified maximum entry count.
    ///
    /// When the cache exceeds `max_capacity` entries, least-valuable
    /// entries are evicted.
    pub fn new(max_capacity: u64) -> Self {
        Self {
            builder: CacheBuilder::new(max_capacity),
        }
    }

    /// Evicts entries a fixed duration after insertion, regardless of
    /// freshness. Off by default.
    pub fn time_to_live(mut self, duration: Duration) -> Self {
        self.builder = self.builder.time_to_live(duration);
        self
    }

    /// Evicts entries unused for `duration`. Off by default.
    pub fn time_to_idle(mut self, duration: Duration) -> Self {
        self.builder = self.builder.time_to_idle(duration);
        self
    }

    /// Builds the store.
    pub fn build(self) -> MokaStore {
        MokaStore {
            cache: self.builder.build(),
        }
    }
}
