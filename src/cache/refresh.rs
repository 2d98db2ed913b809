//! Background Refresh
//!
//! Stale L1 hits enqueue a [`RefreshTask`]; a periodic sweep hands batches of
//! tasks to a [`Fetcher`] and writes the results back through the normal
//! write path.
//!
//! A key is tracked from enqueue until its fetch settles, so there is never
//! more than one pending or in-flight refresh per key.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::entry::EntryMetadata;
use crate::error::Result;

/// Work item for the refresher
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTask {
    pub key: String,
    pub enqueued_at: u64,
    /// TTL of the entry being refreshed
    pub ttl: Duration,
    /// Metadata of the entry being refreshed
    pub metadata: EntryMetadata,
}

/// Result of [`RefreshQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    AlreadyQueued,
    InProgress,
    /// Queue at capacity; request dropped
    Full,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<RefreshTask>,
    queued: HashSet<String>,
    in_progress: HashSet<String>,
    /// In-flight keys deleted or cleared since their batch was taken
    cancelled: HashSet<String>,
}

/// Bounded FIFO of refresh tasks with per-key deduplication
pub struct RefreshQueue {
    state: Mutex<QueueState>,
    capacity: usize,
}

impl RefreshQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity,
        }
    }

    /// Add a task unless the key is already queued or being refreshed
    pub fn enqueue(&self, task: RefreshTask) -> EnqueueOutcome {
        let mut state = self.state.lock();
        if state.in_progress.contains(&task.key) {
            return EnqueueOutcome::InProgress;
        }
        if state.queued.contains(&task.key) {
            return EnqueueOutcome::AlreadyQueued;
        }
        if state.pending.len() >= self.capacity {
            return EnqueueOutcome::Full;
        }

        state.queued.insert(task.key.clone());
        state.pending.push_back(task);
        EnqueueOutcome::Queued
    }

    /// Dequeue up to `max` tasks and mark them in progress
    pub fn take_batch(&self, max: usize) -> Vec<RefreshTask> {
        let mut state = self.state.lock();
        let count = max.min(state.pending.len());
        let batch: Vec<RefreshTask> = state.pending.drain(..count).collect();
        for task in &batch {
            state.queued.remove(&task.key);
            state.in_progress.insert(task.key.clone());
        }
        batch
    }

    /// Clear the in-progress mark after a refresh settles.
    ///
    /// Returns `false` when the key was cancelled while in flight; the
    /// fetched value must then be discarded.
    pub fn complete(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        state.in_progress.remove(key);
        !state.cancelled.remove(key)
    }

    /// Drop a pending task for `key` and mark an in-flight refresh as
    /// cancelled. Returns whether anything was tracked.
    pub fn cancel(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let mut tracked = false;
        if state.queued.remove(key) {
            state.pending.retain(|task| task.key != key);
            tracked = true;
        }
        if state.in_progress.contains(key) {
            state.cancelled.insert(key.to_string());
            tracked = true;
        }
        tracked
    }

    /// Drop every pending task and cancel every in-flight refresh.
    /// Returns the number of pending tasks dropped.
    pub fn clear_pending(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        state.queued.clear();
        let in_flight: Vec<String> = state.in_progress.iter().cloned().collect();
        state.cancelled.extend(in_flight);
        dropped
    }

    /// Whether `key` is queued or in flight
    pub fn is_tracked(&self, key: &str) -> bool {
        let state = self.state.lock();
        state.queued.contains(key) || state.in_progress.contains(key)
    }

    pub fn queued_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn in_progress_len(&self) -> usize {
        self.state.lock().in_progress.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// =============================================================================
// Fetcher
// =============================================================================

/// Produces a fresh value for a key
#[async_trait]
pub trait Fetcher<V: Send>: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<V>;
}

/// Adapts an async closure into a [`Fetcher`]
pub struct FnFetcher<F>(F);

impl<F> FnFetcher<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<V, F, Fut> Fetcher<V> for FnFetcher<F>
where
    V: Send + 'static,
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<V>> + Send + 'static,
{
    async fn fetch(&self, key: &str) -> Result<V> {
        (self.0)(key.to_string()).await
    }
}

// =============================================================================
// Sweep Report & Handle
// =============================================================================

/// Outcome of one refresh sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub attempted: usize,
    pub refreshed: usize,
    pub failed: usize,
    /// Fetched for a key that was deleted meanwhile
    pub discarded: usize,
}

/// Owner handle for a spawned refresher
pub struct RefreshHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl RefreshHandle {
    pub(crate) fn new(cancel: CancellationToken, join: JoinHandle<()>) -> Self {
        Self { cancel, join }
    }

    /// Token that stops the refresher when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the timer and wait for the current sweep to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "Refresher task ended abnormally");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn task(key: &str) -> RefreshTask {
        RefreshTask {
            key: key.to_string(),
            enqueued_at: 0,
            ttl: Duration::from_secs(5),
            metadata: EntryMetadata::default(),
        }
    }

    #[test]
    fn test_enqueue_deduplicates() {
        let queue = RefreshQueue::new(10);
        assert_eq!(queue.enqueue(task("a")), EnqueueOutcome::Queued);
        assert_eq!(queue.enqueue(task("a")), EnqueueOutcome::AlreadyQueued);
        assert_eq!(queue.queued_len(), 1);
    }

    #[test]
    fn test_in_progress_blocks_enqueue() {
        let queue = RefreshQueue::new(10);
        queue.enqueue(task("a"));

        let batch = queue.take_batch(5);
        assert_eq!(batch.len(), 1);
        assert_eq!(queue.in_progress_len(), 1);
        assert_eq!(queue.enqueue(task("a")), EnqueueOutcome::InProgress);

        assert!(queue.complete("a"));
        assert!(!queue.is_tracked("a"));
        assert_eq!(queue.enqueue(task("a")), EnqueueOutcome::Queued);
    }

    #[test]
    fn test_bounded_queue_drops_overflow() {
        let queue = RefreshQueue::new(2);
        queue.enqueue(task("a"));
        queue.enqueue(task("b"));
        assert_eq!(queue.enqueue(task("c")), EnqueueOutcome::Full);
        assert!(!queue.is_tracked("c"));
    }

    #[test]
    fn test_take_batch_is_fifo() {
        let queue = RefreshQueue::new(10);
        for key in ["a", "b", "c", "d"] {
            queue.enqueue(task(key));
        }

        let keys: Vec<String> = queue.take_batch(3).into_iter().map(|t| t.key).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(queue.queued_len(), 1);
        assert_eq!(queue.in_progress_len(), 3);
    }

    #[test]
    fn test_cancel_and_clear() {
        let queue = RefreshQueue::new(10);
        queue.enqueue(task("a"));
        queue.enqueue(task("b"));

        assert!(queue.cancel("a"));
        assert!(!queue.cancel("a"));
        assert_eq!(queue.queued_len(), 1);

        assert_eq!(queue.clear_pending(), 1);
        assert_eq!(queue.queued_len(), 0);
        assert!(!queue.is_tracked("b"));
    }

    #[test]
    fn test_cancel_in_flight_discards_result() {
        let queue = RefreshQueue::new(10);
        queue.enqueue(task("a"));
        queue.enqueue(task("b"));
        queue.take_batch(2);

        assert!(queue.cancel("a"));
        assert!(!queue.complete("a"));
        assert!(queue.complete("b"));

        // Cancellation does not outlive the refresh it applied to
        queue.enqueue(task("a"));
        queue.take_batch(1);
        assert!(queue.complete("a"));
    }

    #[test]
    fn test_clear_cancels_in_flight() {
        let queue = RefreshQueue::new(10);
        queue.enqueue(task("a"));
        queue.take_batch(1);

        assert_eq!(queue.clear_pending(), 0);
        assert!(!queue.complete("a"));
    }

    #[tokio::test]
    async fn test_fn_fetcher() {
        let fetcher = FnFetcher::new(|key: String| async move {
            if key == "missing" {
                Err(Error::Fetch {
                    key,
                    reason: "not found".into(),
                })
            } else {
                Ok(key.len())
            }
        });

        let fetched: usize = Fetcher::fetch(&fetcher, "team:138").await.unwrap();
        assert_eq!(fetched, 8);
        assert!(Fetcher::<usize>::fetch(&fetcher, "missing").await.is_err());
    }
}
