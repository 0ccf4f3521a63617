//! # Lifecycle Tracker
//!
//! The front door for every queue operation. Mutations are serialized per
//! queue and committed atomically with their position recompute and outbox
//! row; reads go straight to the latest committed state.
//!
//! ## Mutation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  call(entry_id)                                                         │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  resolve owning queue (committed read)                                  │
//! │     │                                                                   │
//! │     ▼                                  Busy?                            │
//! │  ┌──────────────── retry loop ◄──────── sleep(backoff) ◄──┐             │
//! │  │  QueueLocks::acquire(queue_id)                         │             │
//! │  │  Database::begin_queue            (SQLite write lock)  │             │
//! │  │  uow.entry(entry_id)              re-read under lock   │             │
//! │  │  lifecycle::call(&mut entry)      pure transition      │             │
//! │  │  uow.save_entry                                        │             │
//! │  │  uow.reassign_positions           if waiting set moved │             │
//! │  │  uow.supersede_pending_notifications  terminal/renotify│             │
//! │  │  uow.enqueue_notification         if one is due        │             │
//! │  │  uow.commit ───────────────────── error? rolled back ──┘             │
//! │  └──────────────────────────────────────────────────────────            │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  release lock, wake dispatcher                                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use waitlist_core::NewCustomer;
//! use waitlist_engine::{EngineConfig, LiveSessions, LifecycleTracker};
//!
//! # async fn example() -> waitlist_engine::EngineResult<()> {
//! let sessions = Arc::new(LiveSessions::new());
//! let (tracker, dispatcher) = LifecycleTracker::open(EngineConfig::load(None)?, sessions).await?;
//! tokio::spawn(dispatcher.run());
//!
//! let queue = tracker
//!     .create_queue("6f1c3a52-8f0e-4c9b-9a59-1f8e4b0c2d11", "Main Dining", Some(40), 10)
//!     .await?;
//! let entry = tracker
//!     .join(&queue.id, NewCustomer::new("Ana", "+1 555 010 2030", 2))
//!     .await?;
//! tracker.call(&entry.id).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use waitlist_core::code::generate_verification_code;
use waitlist_core::lifecycle::{self, Transition, TransitionOutcome};
use waitlist_core::validation::{
    validate_average_service_minutes, validate_capacity, validate_queue_name, validate_uuid,
};
use waitlist_core::{
    Clock, CoreResult, EntryStatus, EntryView, NewCustomer, Queue, QueueEntry, QueueStats,
    SystemClock,
};
use waitlist_db::Database;

use crate::channel::{NotificationChannel, NotificationPayload};
use crate::config::{EngineConfig, LockingSettings};
use crate::error::{EngineError, EngineResult};
use crate::lock::QueueLocks;
use crate::outbox::{DispatcherHandle, NotificationDispatcher};

/// Default page size for [`LifecycleTracker::by_status`].
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

// =============================================================================
// Tracker
// =============================================================================

/// Serializes and commits queue entry lifecycle changes.
#[derive(Debug)]
pub struct LifecycleTracker {
    db: Database,
    locks: QueueLocks,
    clock: Arc<dyn Clock>,
    locking: LockingSettings,
    dispatcher: Option<DispatcherHandle>,
}

impl LifecycleTracker {
    /// Creates a tracker over an open database.
    ///
    /// Without [`with_dispatcher`](Self::with_dispatcher), committed outbox
    /// rows wait for the dispatcher's next poll.
    pub fn new(db: Database, config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        LifecycleTracker {
            locks: QueueLocks::new(config.locking.lock_timeout()),
            locking: config.locking.clone(),
            db,
            clock,
            dispatcher: None,
        }
    }

    /// Wakes `handle` after every commit that wrote an outbox row.
    pub fn with_dispatcher(mut self, handle: DispatcherHandle) -> Self {
        self.dispatcher = Some(handle);
        self
    }

    /// Opens the configured database and wires a dispatcher for `channel`.
    ///
    /// The dispatcher is returned unstarted; spawn [`NotificationDispatcher::run`].
    pub async fn open(
        config: EngineConfig,
        channel: Arc<dyn NotificationChannel>,
    ) -> EngineResult<(Self, NotificationDispatcher)> {
        config.validate()?;

        let db = Database::new(config.db_config()?).await?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (dispatcher, handle) = NotificationDispatcher::new(
            db.clone(),
            channel,
            config.notifications.clone(),
            Arc::clone(&clock),
        );

        let tracker = LifecycleTracker::new(db, &config, clock).with_dispatcher(handle);
        info!("Lifecycle tracker ready");
        Ok((tracker, dispatcher))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn locks(&self) -> &QueueLocks {
        &self.locks
    }

    // =========================================================================
    // Queue Administration
    // =========================================================================

    /// Creates an open queue.
    pub async fn create_queue(
        &self,
        merchant_id: &str,
        name: &str,
        capacity: Option<i64>,
        average_service_minutes: i64,
    ) -> EngineResult<Queue> {
        validate_uuid("merchant_id", merchant_id)?;
        validate_queue_name(name)?;
        validate_capacity(capacity)?;
        validate_average_service_minutes(average_service_minutes)?;

        let now = self.clock.now();
        let queue = Queue {
            id: Uuid::new_v4().to_string(),
            merchant_id: merchant_id.trim().to_string(),
            name: name.trim().to_string(),
            capacity,
            average_service_minutes,
            is_open: true,
            created_at: now,
            updated_at: now,
        };

        self.db.queues().create(&queue).await?;
        info!(queue_id = %queue.id, name = %queue.name, "Queue created");
        Ok(queue)
    }

    /// Opens or closes a queue for new joins. Existing entries are unaffected.
    pub async fn set_queue_open(&self, queue_id: &str, is_open: bool) -> EngineResult<Queue> {
        let queue = self
            .with_busy_retry(queue_id, || async move {
                let _guard = self.locks.acquire(queue_id).await?;
                let mut uow = self.db.begin_queue(queue_id, self.clock.now()).await?;
                uow.set_open(is_open).await?;
                let queue = uow.queue().clone();
                uow.commit().await?;
                Ok(queue)
            })
            .await?;

        info!(queue_id = %queue_id, is_open, "Queue availability changed");
        Ok(queue)
    }

    /// Changes a queue's settings and re-derives every waiting estimate.
    ///
    /// Lowering `capacity` below the current waiting count only blocks new joins.
    pub async fn update_queue_settings(
        &self,
        queue_id: &str,
        name: &str,
        capacity: Option<i64>,
        average_service_minutes: i64,
    ) -> EngineResult<Queue> {
        validate_queue_name(name)?;
        validate_capacity(capacity)?;
        validate_average_service_minutes(average_service_minutes)?;

        let queue = self
            .with_busy_retry(queue_id, || async move {
                let _guard = self.locks.acquire(queue_id).await?;
                let mut uow = self.db.begin_queue(queue_id, self.clock.now()).await?;
                uow.update_queue_settings(name.trim(), capacity, average_service_minutes)
                    .await?;
                uow.reassign_positions().await?;
                let queue = uow.queue().clone();
                uow.commit().await?;
                Ok(queue)
            })
            .await?;

        info!(
            queue_id = %queue_id,
            average_service_minutes,
            capacity = ?capacity,
            "Queue settings updated"
        );
        Ok(queue)
    }

    // =========================================================================
    // Lifecycle Operations
    // =========================================================================

    /// Adds a customer to the back of the queue.
    pub async fn join(&self, queue_id: &str, customer: NewCustomer) -> EngineResult<QueueEntry> {
        let entry = self
            .with_busy_retry(queue_id, || self.join_once(queue_id, customer.clone()))
            .await?;

        info!(
            queue_id = %queue_id,
            entry_id = %entry.id,
            position = ?entry.position,
            estimated_wait_minutes = ?entry.estimated_wait_minutes,
            "Customer joined queue"
        );
        Ok(entry)
    }

    async fn join_once(&self, queue_id: &str, customer: NewCustomer) -> EngineResult<QueueEntry> {
        let _guard = self.locks.acquire(queue_id).await?;
        let now = self.clock.now();

        let mut uow = self.db.begin_queue(queue_id, now).await?;
        let waiting = uow.waiting_count().await?;

        let mut entry = lifecycle::admit(
            uow.queue(),
            waiting,
            customer,
            Uuid::new_v4().to_string(),
            generate_verification_code(),
            now,
        )?;

        uow.insert_entry(&entry).await?;
        let assignments = uow.reassign_positions().await?;
        if let Some(own) = assignments.iter().find(|a| a.entry_id == entry.id) {
            entry.position = Some(own.position);
            entry.estimated_wait_minutes = Some(own.estimated_wait_minutes);
        }

        uow.commit().await?;
        Ok(entry)
    }

    /// Calls the customer to the host stand and notifies them.
    pub async fn call(&self, entry_id: &str) -> EngineResult<QueueEntry> {
        self.transition(entry_id, Transition::Call, lifecycle::call)
            .await
    }

    /// Seats a called customer whose verification code matches.
    pub async fn seat(&self, entry_id: &str, code: &str) -> EngineResult<QueueEntry> {
        self.transition(entry_id, Transition::Seat, |entry, now| {
            lifecycle::seat(entry, code, now)
        })
        .await
    }

    /// Records that a called customer never showed up.
    pub async fn mark_no_show(&self, entry_id: &str) -> EngineResult<QueueEntry> {
        self.transition(entry_id, Transition::MarkNoShow, lifecycle::mark_no_show)
            .await
    }

    /// Cancels a waiting or called entry.
    pub async fn withdraw(&self, entry_id: &str, reason: Option<&str>) -> EngineResult<QueueEntry> {
        self.transition(entry_id, Transition::Withdraw, |entry, now| {
            lifecycle::withdraw(entry, reason, now)
        })
        .await
    }

    /// Sends the call notification again, e.g. after the customer reconnects.
    pub async fn renotify(&self, entry_id: &str) -> EngineResult<QueueEntry> {
        self.transition(entry_id, Transition::Renotify, lifecycle::renotify)
            .await
    }

    async fn transition<F>(
        &self,
        entry_id: &str,
        transition: Transition,
        apply: F,
    ) -> EngineResult<QueueEntry>
    where
        F: Fn(&mut QueueEntry, DateTime<Utc>) -> CoreResult<TransitionOutcome>,
    {
        let queue_id = self.owning_queue(entry_id).await?;

        let (entry, outcome) = self
            .with_busy_retry(&queue_id, || self.transition_once(&queue_id, entry_id, &apply))
            .await
            .inspect_err(|e| {
                if e.is_caller_error() {
                    debug!(entry_id = %entry_id, %transition, error = %e, "Transition rejected");
                }
            })?;

        info!(
            queue_id = %queue_id,
            entry_id = %entry_id,
            %transition,
            from = %outcome.from,
            to = %outcome.to,
            "Entry transitioned"
        );
        self.wake_dispatcher(outcome.notification.is_some());
        Ok(entry)
    }

    async fn transition_once<F>(
        &self,
        queue_id: &str,
        entry_id: &str,
        apply: &F,
    ) -> EngineResult<(QueueEntry, TransitionOutcome)>
    where
        F: Fn(&mut QueueEntry, DateTime<Utc>) -> CoreResult<TransitionOutcome>,
    {
        let _guard = self.locks.acquire(queue_id).await?;
        let now = self.clock.now();

        // Dropping `uow` on any early return rolls everything back
        let mut uow = self.db.begin_queue(queue_id, now).await?;
        let mut entry = uow.entry(entry_id).await?;

        let outcome = apply(&mut entry, now)?;
        uow.save_entry(&entry).await?;

        if outcome.left_waiting_set {
            uow.reassign_positions().await?;
        }

        // A terminal entry must never hear "your table is ready" again, and a
        // renotify replaces whatever is still waiting to go out
        if outcome.to.is_terminal() || outcome.transition == Transition::Renotify {
            let reason = if outcome.to.is_terminal() {
                format!("entry is {}", outcome.to)
            } else {
                "superseded by renotify".to_string()
            };
            uow.supersede_pending_notifications(&entry.id, &reason, now)
                .await?;
        }

        if let Some(kind) = outcome.notification {
            let payload = NotificationPayload::for_entry(&entry, kind);
            uow.enqueue_notification(&entry, kind, &payload, now).await?;
        }

        uow.commit().await?;
        Ok((entry, outcome))
    }

    // =========================================================================
    // Reads (no lock, latest committed state)
    // =========================================================================

    pub async fn entry(&self, entry_id: &str) -> EngineResult<QueueEntry> {
        self.db
            .entries()
            .get_by_id(entry_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Entry", entry_id))
    }

    /// What the customer's chat widget shows.
    pub async fn entry_view(&self, entry_id: &str) -> EngineResult<EntryView> {
        Ok(self.entry(entry_id).await?.view())
    }

    pub async fn queue(&self, queue_id: &str) -> EngineResult<Queue> {
        self.db
            .queues()
            .get_by_id(queue_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Queue", queue_id))
    }

    pub async fn queues_for_merchant(&self, merchant_id: &str) -> EngineResult<Vec<Queue>> {
        Ok(self.db.queues().list_for_merchant(merchant_id).await?)
    }

    /// Waiting entries in position order.
    pub async fn waiting(&self, queue_id: &str) -> EngineResult<Vec<QueueEntry>> {
        self.queue(queue_id).await?;
        Ok(self.db.entries().list_waiting(queue_id).await?)
    }

    /// Waiting entries by position, then called entries by call time.
    pub async fn active(&self, queue_id: &str) -> EngineResult<Vec<QueueEntry>> {
        self.queue(queue_id).await?;
        Ok(self.db.entries().list_active(queue_id).await?)
    }

    /// Most recently updated entries with `status`.
    pub async fn by_status(
        &self,
        queue_id: &str,
        status: EntryStatus,
        limit: Option<u32>,
    ) -> EngineResult<Vec<QueueEntry>> {
        self.queue(queue_id).await?;
        Ok(self
            .db
            .entries()
            .list_by_status(queue_id, status, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
            .await?)
    }

    pub async fn stats(&self, queue_id: &str) -> EngineResult<QueueStats> {
        self.queue(queue_id).await?;
        Ok(self.db.entries().stats(queue_id).await?)
    }

    // =========================================================================
    // Administrative Cleanup
    // =========================================================================

    /// Deletes terminal entries of `queue_id` finished more than `older_than` ago.
    pub async fn cleanup_terminal(&self, queue_id: &str, older_than: Duration) -> EngineResult<u64> {
        self.queue(queue_id).await?;
        let cutoff = self.clock.now() - older_than;
        Ok(self
            .db
            .entries()
            .delete_terminal_before(queue_id, cutoff)
            .await?)
    }

    /// Deletes delivered outbox rows older than `older_than`.
    pub async fn cleanup_notifications(&self, older_than: Duration) -> EngineResult<u64> {
        let cutoff = self.clock.now() - older_than;
        Ok(self.db.notifications().cleanup_delivered_before(cutoff).await?)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn owning_queue(&self, entry_id: &str) -> EngineResult<String> {
        Ok(self.entry(entry_id).await?.queue_id)
    }

    fn busy_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.locking.initial_backoff())
            .with_max_interval(self.locking.max_backoff())
            .with_max_elapsed_time(Some(self.locking.busy_retry()))
            .build()
    }

    /// Runs `op` until it succeeds, fails with a non-Busy error, or the busy
    /// retry budget is spent.
    async fn with_busy_retry<T, F, Fut>(&self, queue_id: &str, mut op: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut backoff = self.busy_backoff();
        let mut attempt = 1u32;

        loop {
            match op().await {
                Err(e) if e.is_retryable() => match backoff.next_backoff() {
                    Some(wait) => {
                        debug!(
                            queue_id = %queue_id,
                            attempt,
                            wait_ms = wait.as_millis() as u64,
                            "Queue busy, retrying"
                        );
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                    }
                    None => {
                        warn!(queue_id = %queue_id, attempts = attempt, "Queue still busy, giving up");
                        return Err(e);
                    }
                },
                other => return other,
            }
        }
    }

    fn wake_dispatcher(&self, notification_written: bool) {
        if !notification_written {
            return;
        }
        if let Some(handle) = &self.dispatcher {
            handle.wake();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
