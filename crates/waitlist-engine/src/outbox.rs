//! # Notification Dispatcher
//!
//! Drains the notification outbox into a [`NotificationChannel`].
//!
//! ## Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Notification Dispatcher                              │
//! │                                                                         │
//! │  wake() after a commit ─┐      ┌─ interval tick (poll_interval_secs)    │
//! │                         ▼      ▼                                        │
//! │                    dispatch_pending()                                   │
//! │                         │                                               │
//! │                         ▼                                               │
//! │  SELECT due rows (not delivered, not abandoned, next_attempt_at ≤ now) │
//! │                         │                                               │
//! │        entry no longer called? ──► mark_abandoned (stale)               │
//! │                         │                                               │
//! │          ┌──────────────┼──────────────────────┐                        │
//! │          ▼              ▼                      ▼                        │
//! │      send ok        send failed           send failed,                  │
//! │          │          attempts < max        attempts = max                │
//! │          ▼              ▼                      ▼                        │
//! │   mark_delivered   mark_failed            mark_abandoned + warn         │
//! │                    next_attempt_at =                                    │
//! │                    now + initial·2^(n-1)                                │
//! │                                                                         │
//! │  Entries are never touched here. A lost notification is recovered by   │
//! │  the merchant calling renotify.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use waitlist_core::{Clock, EntryStatus, NotificationOutboxEntry};
use waitlist_db::Database;

use crate::channel::{NotificationChannel, NotificationPayload};
use crate::config::NotificationSettings;
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Dispatcher
// =============================================================================

/// Background worker that delivers outbox rows.
pub struct NotificationDispatcher {
    db: Database,
    channel: Arc<dyn NotificationChannel>,
    settings: NotificationSettings,
    clock: Arc<dyn Clock>,
    wake_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for nudging or stopping a running dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    wake_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl DispatcherHandle {
    /// Asks for a dispatch pass now. Never blocks; a pending wake is enough.
    pub fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    /// Stops the dispatcher after its current pass.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::Internal("Dispatcher already stopped".into()))
    }
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    pub abandoned: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.delivered + self.failed + self.abandoned
    }
}

impl NotificationDispatcher {
    /// Creates a dispatcher and its handle.
    pub fn new(
        db: Database,
        channel: Arc<dyn NotificationChannel>,
        settings: NotificationSettings,
        clock: Arc<dyn Clock>,
    ) -> (Self, DispatcherHandle) {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let dispatcher = NotificationDispatcher {
            db,
            channel,
            settings,
            clock,
            wake_rx,
            shutdown_rx,
        };

        (
            dispatcher,
            DispatcherHandle {
                wake_tx,
                shutdown_tx,
            },
        )
    }

    /// Runs until [`DispatcherHandle::shutdown`] is called or every handle is dropped.
    pub async fn run(mut self) {
        info!("Notification dispatcher starting");

        let mut interval = tokio::time::interval(self.settings.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.dispatch_logged().await;
                }

                woken = self.wake_rx.recv() => {
                    if woken.is_none() {
                        info!("All dispatcher handles dropped");
                        break;
                    }
                    self.dispatch_logged().await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Notification dispatcher shutting down");
                    break;
                }
            }
        }

        info!("Notification dispatcher stopped");
    }

    async fn dispatch_logged(&self) {
        match self.dispatch_pending().await {
            Ok(report) if report.total() > 0 => {
                info!(
                    delivered = report.delivered,
                    failed = report.failed,
                    abandoned = report.abandoned,
                    "Dispatch pass complete"
                );
            }
            Ok(_) => debug!("No due notifications"),
            Err(e) => error!(?e, "Failed to process notification outbox"),
        }
    }

    /// Delivers every row due now, once.
    pub async fn dispatch_pending(&self) -> EngineResult<DispatchReport> {
        let now = self.clock.now();
        let rows = self
            .db
            .notifications()
            .get_pending(now, self.settings.batch_size)
            .await?;

        let mut report = DispatchReport::default();
        for row in rows {
            self.dispatch_one(&row, &mut report).await;
        }

        Ok(report)
    }

    async fn dispatch_one(&self, row: &NotificationOutboxEntry, report: &mut DispatchReport) {
        let outbox = self.db.notifications();
        let now = self.clock.now();

        let payload: NotificationPayload = match serde_json::from_str(&row.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(id = %row.id, entry_id = %row.entry_id, error = %e, "Abandoning undecodable notification");
                if let Err(e) = outbox
                    .mark_abandoned(&row.id, &format!("undecodable payload: {e}"), now)
                    .await
                {
                    error!(?e, id = %row.id, "Failed to mark notification abandoned");
                }
                report.abandoned += 1;
                return;
            }
        };

        // Only a called entry may be told its table is ready
        match self.db.entries().get_by_id(&row.entry_id).await {
            Ok(Some(entry)) if entry.status == EntryStatus::Called => {}
            Ok(current) => {
                let reason = match current {
                    Some(entry) => format!("entry is {}", entry.status),
                    None => "entry no longer exists".to_string(),
                };
                debug!(id = %row.id, entry_id = %row.entry_id, reason = %reason, "Dropping stale notification");
                if let Err(e) = outbox.mark_abandoned(&row.id, &reason, now).await {
                    error!(?e, id = %row.id, "Failed to mark notification abandoned");
                }
                report.abandoned += 1;
                return;
            }
            Err(e) => {
                error!(?e, id = %row.id, entry_id = %row.entry_id, "Failed to read entry for notification");
                return;
            }
        }

        match self.channel.send(&row.entry_id, &payload).await {
            Ok(()) => {
                if let Err(e) = outbox.mark_delivered(&row.id, now).await {
                    error!(?e, id = %row.id, "Failed to mark notification delivered");
                }
                info!(
                    id = %row.id,
                    entry_id = %row.entry_id,
                    kind = ?row.kind,
                    "Notification delivered"
                );
                report.delivered += 1;
            }
            Err(send_err) => {
                let attempts = row.attempts + 1;
                let message = send_err.to_string();

                if attempts >= i64::from(self.settings.max_attempts) {
                    warn!(
                        id = %row.id,
                        entry_id = %row.entry_id,
                        attempts,
                        error = %message,
                        "Giving up on notification"
                    );
                    if let Err(e) = outbox.mark_abandoned(&row.id, &message, now).await {
                        error!(?e, id = %row.id, "Failed to mark notification abandoned");
                    }
                    report.abandoned += 1;
                } else {
                    let delay = self.settings.retry_delay(attempts as u32);
                    let next_attempt_at = now
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(self.settings.max_retry_secs as i64));

                    debug!(
                        id = %row.id,
                        entry_id = %row.entry_id,
                        attempts,
                        retry_in_secs = delay.as_secs(),
                        error = %message,
                        "Notification delivery failed"
                    );
                    if let Err(e) = outbox
                        .mark_failed(&row.id, &message, now, next_attempt_at)
                        .await
                    {
                        error!(?e, id = %row.id, "Failed to mark notification failed");
                    }
                    report.failed += 1;
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LiveSessions;
    use chrono::{Duration, Utc};
    use waitlist_core::lifecycle;
    use waitlist_core::{ManualClock, NewCustomer, NotificationKind, Queue};
    use waitlist_db::DbConfig;

    async fn db_with_called_entry(now: chrono::DateTime<Utc>) -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let queue = Queue {
            id: "queue-1".into(),
            merchant_id: "merchant-1".into(),
            name: "Main".into(),
            capacity: None,
            average_service_minutes: 10,
            is_open: true,
            created_at: now,
            updated_at: now,
        };
        db.queues().create(&queue).await.unwrap();

        let mut entry = lifecycle::admit(
            &queue,
            0,
            NewCustomer::new("Ana", "5550102030", 2),
            "entry-1".into(),
            "ABC234".into(),
            now,
        )
        .unwrap();

        let mut uow = db.begin_queue(&queue.id, now).await.unwrap();
        uow.insert_entry(&entry).await.unwrap();
        lifecycle::call(&mut entry, now).unwrap();
        uow.save_entry(&entry).await.unwrap();
        let payload = NotificationPayload::for_entry(&entry, NotificationKind::Called);
        uow.enqueue_notification(&entry, NotificationKind::Called, &payload, now)
            .await
            .unwrap();
        uow.commit().await.unwrap();

        (db, entry.id)
    }

    fn settings(max_attempts: u32) -> NotificationSettings {
        NotificationSettings {
            max_attempts,
            ..NotificationSettings::default()
        }
    }

    #[tokio::test]
    async fn test_delivers_to_live_session() {
        let start = Utc::now();
        let (db, entry_id) = db_with_called_entry(start).await;
        let sessions = Arc::new(LiveSessions::new());
        let mut rx = sessions.register(&entry_id);

        let (dispatcher, _handle) = NotificationDispatcher::new(
            db.clone(),
            sessions.clone(),
            settings(3),
            Arc::new(ManualClock::new(start)),
        );

        let report = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(report.delivered, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, NotificationKind::Called);
        assert_eq!(received.verification_code, "ABC234");
        assert_eq!(db.notifications().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failure_backs_off_then_abandons() {
        let start = Utc::now();
        let (db, entry_id) = db_with_called_entry(start).await;
        let clock = Arc::new(ManualClock::new(start));

        let (dispatcher, _handle) = NotificationDispatcher::new(
            db.clone(),
            Arc::new(LiveSessions::new()),
            settings(2),
            clock.clone(),
        );

        let first = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(first.failed, 1);

        // Not due again until the backoff passes
        assert_eq!(dispatcher.dispatch_pending().await.unwrap().total(), 0);

        clock.advance(Duration::seconds(5));
        let second = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(second.abandoned, 1);

        let rows = db.notifications().list_for_entry(&entry_id).await.unwrap();
        assert_eq!(rows[0].attempts, 2);
        assert!(rows[0].abandoned_at.is_some());

        // The entry itself is untouched by delivery failures
        let entry = db.entries().get_by_id(&entry_id).await.unwrap().unwrap();
        assert_eq!(entry.status, waitlist_core::EntryStatus::Called);
        assert_eq!(entry.notification_count, 1);
    }

    #[tokio::test]
    async fn test_row_for_entry_no_longer_called_is_abandoned() {
        let start = Utc::now();
        let (db, entry_id) = db_with_called_entry(start).await;

        // Withdraw behind the tracker's back, leaving the call row pending
        let mut uow = db.begin_queue("queue-1", start).await.unwrap();
        let mut entry = uow.entry(&entry_id).await.unwrap();
        lifecycle::withdraw(&mut entry, None, start).unwrap();
        uow.save_entry(&entry).await.unwrap();
        uow.commit().await.unwrap();

        let sessions = Arc::new(LiveSessions::new());
        let mut rx = sessions.register(&entry_id);
        let (dispatcher, _handle) = NotificationDispatcher::new(
            db.clone(),
            sessions.clone(),
            settings(3),
            Arc::new(ManualClock::new(start)),
        );

        let report = dispatcher.dispatch_pending().await.unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(report.abandoned, 1);
        assert!(rx.try_recv().is_err());

        let rows = db.notifications().list_for_entry(&entry_id).await.unwrap();
        assert_eq!(rows[0].last_error.as_deref(), Some("entry is withdrawn"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let start = Utc::now();
        let (db, _entry_id) = db_with_called_entry(start).await;

        let (dispatcher, handle) = NotificationDispatcher::new(
            db.clone(),
            Arc::new(crate::channel::NoOpChannel),
            settings(3),
            Arc::new(ManualClock::new(start)),
        );
        let task = tokio::spawn(dispatcher.run());

        handle.wake();
        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
