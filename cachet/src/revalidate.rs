//! Background revalidation task tracking.
//!
//! Stale-while-revalidate serves a stale entry immediately and refreshes it
//! off the request path. This module owns the bookkeeping for those
//! background tasks so they can be drained or cancelled deterministically
//! at shutdown.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug_span};

#[derive(Debug)]
struct RevalidationManagerInner {
    tasks: DashMap<u64, JoinHandle<()>>,
    task_counter: AtomicU64,
}

/// Tracks in-flight background revalidation tasks.
///
/// Each spawned task removes its own handle on completion, so the map only
/// holds tasks that are still running (plus handles of aborted tasks not
/// yet swept by [`cleanup_finished`](Self::cleanup_finished)).
///
/// The manager is an instance field of the middleware, not process-global;
/// cloning shares the same task map.
#[derive(Clone, Debug)]
pub struct RevalidationManager {
    inner: Arc<RevalidationManagerInner>,
}

impl RevalidationManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RevalidationManagerInner {
                tasks: DashMap::new(),
                task_counter: AtomicU64::new(0),
            }),
        }
    }

    /// Spawns a tracked background task and returns its id.
    pub fn spawn<F>(&self, task: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.inner.task_counter.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let span = debug_span!("revalidation", id);
        let handle = tokio::spawn(
            async move {
                task.await;
                inner.tasks.remove(&id);
            }
            .instrument(span),
        );
        self.inner.tasks.insert(id, handle);
        id
    }

    /// Number of tasks still running.
    pub fn active_count(&self) -> usize {
        self.inner
            .tasks
            .iter()
            .filter(|entry| !entry.is_finished())
            .count()
    }

    /// Drops handles of finished tasks.
    pub fn cleanup_finished(&self) {
        self.inner.tasks.retain(|_, handle| !handle.is_finished());
    }

    /// Aborts every tracked task.
    pub fn cancel_all(&self) {
        for entry in self.inner.tasks.iter() {
            entry.abort();
        }
    }

    /// Waits until every tracked task has completed.
    ///
    /// Polls with a yield between checks so tasks make progress on
    /// single-threaded runtimes.
    pub async fn wait_all(&self) {
        loop {
            self.cleanup_finished();
            if self.inner.tasks.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Waits for all tasks, giving up after `timeout`.
    ///
    /// Returns `true` if every task completed within the timeout.
    pub async fn wait_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_all()).await.is_ok()
    }
}

impl Default for RevalidationManager {
    fn default() -> Self {
        Self::new()
    }
}
