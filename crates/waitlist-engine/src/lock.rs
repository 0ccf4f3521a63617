//! # Per-Queue Locks
//!
//! Every mutation of a queue runs while holding that queue's lock. Different
//! queues never contend; the same queue is strictly serialized.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  QueueLocks (DashMap<queue_id, Arc<Mutex<()>>>)                         │
//! │                                                                         │
//! │   "patio" ──► Mutex ◄── join (holding)                                  │
//! │                     ◄── call (waiting ≤ lock_timeout, then Busy)        │
//! │                                                                         │
//! │   "bar"   ──► Mutex ◄── seat (holding, unaffected by "patio")           │
//! │                                                                         │
//! │  prune_idle(): drop map entries nobody holds or waits on                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// Proof that the caller holds a queue's lock. Released on drop.
#[derive(Debug)]
pub struct QueueGuard {
    queue_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl QueueGuard {
    pub fn queue_id(&self) -> &str {
        &self.queue_id
    }
}

/// Registry of per-queue async mutexes.
#[derive(Debug)]
pub struct QueueLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl QueueLocks {
    pub fn new(timeout: Duration) -> Self {
        QueueLocks {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Acquires the lock for `queue_id`, waiting at most the configured timeout.
    pub async fn acquire(&self, queue_id: &str) -> EngineResult<QueueGuard> {
        // Clone the Arc and release the shard before awaiting
        let lock = self
            .locks
            .entry(queue_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => {
                debug!(queue_id = %queue_id, "Queue lock acquired");
                Ok(QueueGuard {
                    queue_id: queue_id.to_string(),
                    _guard: guard,
                })
            }
            Err(_) => {
                warn!(
                    queue_id = %queue_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Queue lock not acquired in time"
                );
                Err(EngineError::Busy(format!(
                    "queue {} is locked by another operation",
                    queue_id
                )))
            }
        }
    }

    /// Drops locks that nobody holds or waits on. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        // The map's own Arc is the only reference when idle
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    /// Number of queues with a lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_queue_times_out_with_busy() {
        let locks = QueueLocks::new(Duration::from_millis(20));

        let held = locks.acquire("patio").await.unwrap();
        let err = locks.acquire("patio").await.unwrap_err();
        assert!(err.is_retryable());

        drop(held);
        assert!(locks.acquire("patio").await.is_ok());
    }

    #[tokio::test]
    async fn test_different_queues_do_not_contend() {
        let locks = QueueLocks::new(Duration::from_millis(20));

        let _patio = locks.acquire("patio").await.unwrap();
        let bar = locks.acquire("bar").await.unwrap();
        assert_eq!(bar.queue_id(), "bar");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_idle_keeps_held_locks() {
        let locks = QueueLocks::new(Duration::from_millis(20));

        let held = locks.acquire("patio").await.unwrap();
        drop(locks.acquire("bar").await.unwrap());

        assert_eq!(locks.prune_idle(), 1);
        assert_eq!(locks.len(), 1);

        drop(held);
        assert_eq!(locks.prune_idle(), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let locks = Arc::new(QueueLocks::new(Duration::from_secs(2)));
        let held = locks.acquire("patio").await.unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire("patio").await.map(|g| g.queue_id().to_string()) })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(held);

        assert_eq!(waiter.await.unwrap().unwrap(), "patio");
    }
}
