//! Commit scheduler
//!
//! A map from row key to a cancelable deferred task, so rescheduling,
//! cancellation and "is a commit pending" are single operations instead of
//! scattered timer handles. Entries are generation-stamped: a task only
//! clears its own entry, never a newer timer that replaced it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;

struct PendingTask {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Deferred, cancelable per-row commit timers
#[derive(Default)]
pub struct CommitScheduler {
    pending: Arc<DashMap<String, PendingTask>>,
    generation: AtomicU64,
}

impl CommitScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to run after `delay`, replacing any pending timer
    /// for the same key (the grace period restarts).
    ///
    /// The map entry is removed when the timer fires, before `task` runs:
    /// a key is "pending" only while its grace period is still counting
    /// down.
    pub fn schedule<F>(&self, key: &str, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel(key);

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.pending.insert(
            key.to_string(),
            PendingTask {
                generation,
                handle: None,
            },
        );

        let pending = self.pending.clone();
        let owned_key = key.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.remove_if(&owned_key, |_, t| t.generation == generation);
            task.await;
        });

        if let Some(mut entry) = self.pending.get_mut(key) {
            if entry.generation == generation {
                entry.handle = Some(handle);
            }
        }
        debug!(key, delay_ms = delay.as_millis() as u64, "commit scheduled");
    }

    /// Cancel a pending timer. Returns whether one was still pending.
    ///
    /// Only effective while the grace period is counting down; a timer
    /// that already fired has left the map and runs to completion.
    pub fn cancel(&self, key: &str) -> bool {
        if let Some((_, task)) = self.pending.remove(key) {
            if let Some(handle) = task.handle {
                handle.abort();
            }
            debug!(key, "commit cancelled");
            true
        } else {
            false
        }
    }

    /// Cancel every pending timer whose key starts with `prefix`
    pub fn cancel_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        let mut count = 0;
        for key in keys {
            if self.cancel(&key) {
                count += 1;
            }
        }
        count
    }

    /// Whether a commit is pending for this key
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    /// Number of pending timers
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_schedule_fires_once() {
        let scheduler = CommitScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let f = fired.clone();
        scheduler.schedule("todos:a", Duration::from_millis(20), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.is_pending("todos:a"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending("todos:a"));
    }

    #[tokio::test]
    async fn test_cancel_prevents_fire() {
        let scheduler = CommitScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let f = fired.clone();
        scheduler.schedule("todos:a", Duration::from_millis(30), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.cancel("todos:a"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!scheduler.cancel("todos:a"));
    }

    #[tokio::test]
    async fn test_reschedule_replaces_pending_timer() {
        let scheduler = CommitScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let f = fired.clone();
            scheduler.schedule("todos:a", Duration::from_millis(40), async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(scheduler.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_prefix() {
        let scheduler = CommitScheduler::new();
        scheduler.schedule("todos:a", Duration::from_secs(60), async {});
        scheduler.schedule("todos:b", Duration::from_secs(60), async {});
        scheduler.schedule("ideas:c", Duration::from_secs(60), async {});

        assert_eq!(scheduler.cancel_prefix("todos:"), 2);
        assert_eq!(scheduler.pending_count(), 1);
        assert!(scheduler.is_pending("ideas:c"));
    }
}
