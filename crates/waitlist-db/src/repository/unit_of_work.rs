//! # Queue Unit of Work
//!
//! One transaction scoped to one queue. Everything a lifecycle operation
//! writes goes through here, so the status change, the position recompute and
//! the outbox row either all commit or none do.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  begin(queue_id)                                                       │
//! │    BEGIN                                                               │
//! │    UPDATE queues SET updated_at = ? WHERE id = ?   ← takes write lock  │
//! │    SELECT queue row                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  entry(id) / waiting_count()          reads inside the transaction     │
//! │  insert_entry / save_entry            the transition itself            │
//! │  reassign_positions()                 full recompute of waiting set    │
//! │  enqueue_notification()               outbox row                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  commit()    ── or drop ──► ROLLBACK                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Touching the queue row first means a second writer blocks at `begin`
//! instead of failing halfway through with a lock upgrade error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use waitlist_core::position::{recompute_positions, PositionAssignment, WaitingSlot};
use waitlist_core::{NotificationKind, NotificationOutboxEntry, Queue, QueueEntry};

/// An open transaction holding the write lock for one queue.
pub struct QueueUnitOfWork {
    tx: Transaction<'static, Sqlite>,
    queue: Queue,
}

impl std::fmt::Debug for QueueUnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueUnitOfWork")
            .field("queue_id", &self.queue.id)
            .finish_non_exhaustive()
    }
}

impl QueueUnitOfWork {
    pub(crate) async fn begin(
        pool: &SqlitePool,
        queue_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Self> {
        let mut tx = pool.begin().await?;

        let touched = sqlx::query("UPDATE queues SET updated_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(queue_id)
            .execute(&mut *tx)
            .await?;

        if touched.rows_affected() == 0 {
            return Err(DbError::not_found("Queue", queue_id));
        }

        let queue = sqlx::query_as::<_, Queue>(concat!(
            "SELECT ",
            queue_columns!(),
            " FROM queues WHERE id = ?1"
        ))
        .bind(queue_id)
        .fetch_one(&mut *tx)
        .await?;

        debug!(queue_id = %queue_id, "Unit of work opened");
        Ok(QueueUnitOfWork { tx, queue })
    }

    /// The queue as of the start of this unit of work (plus own changes).
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Reads an entry of this queue inside the transaction.
    ///
    /// Entries belonging to other queues are reported as not found.
    pub async fn entry(&mut self, entry_id: &str) -> DbResult<QueueEntry> {
        sqlx::query_as::<_, QueueEntry>(concat!(
            "SELECT ",
            entry_columns!(),
            " FROM queue_entries WHERE id = ?1 AND queue_id = ?2"
        ))
        .bind(entry_id)
        .bind(&self.queue.id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| DbError::not_found("Entry", entry_id))
    }

    /// Number of entries currently waiting in this queue.
    pub async fn waiting_count(&mut self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_entries WHERE queue_id = ?1 AND status = 'waiting'",
        )
        .bind(&self.queue.id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }

    /// Inserts a freshly admitted entry.
    pub async fn insert_entry(&mut self, entry: &QueueEntry) -> DbResult<()> {
        debug!(id = %entry.id, queue_id = %entry.queue_id, "Inserting entry");

        sqlx::query(
            r#"
            INSERT INTO queue_entries (
                id, queue_id, merchant_id, customer_name, customer_phone,
                party_size, notes, status, position, joined_at,
                called_at, completed_at, estimated_wait_minutes, verification_code,
                notification_count, last_notified, withdraw_reason, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18
            )
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.queue_id)
        .bind(&entry.merchant_id)
        .bind(&entry.customer_name)
        .bind(&entry.customer_phone)
        .bind(entry.party_size)
        .bind(&entry.notes)
        .bind(entry.status)
        .bind(entry.position)
        .bind(entry.joined_at)
        .bind(entry.called_at)
        .bind(entry.completed_at)
        .bind(entry.estimated_wait_minutes)
        .bind(&entry.verification_code)
        .bind(entry.notification_count)
        .bind(entry.last_notified)
        .bind(&entry.withdraw_reason)
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    /// Writes back the mutable fields of an entry after a transition.
    pub async fn save_entry(&mut self, entry: &QueueEntry) -> DbResult<()> {
        debug!(id = %entry.id, status = %entry.status, "Saving entry");

        let result = sqlx::query(
            r#"
            UPDATE queue_entries SET
                status = ?2,
                position = ?3,
                called_at = ?4,
                completed_at = ?5,
                estimated_wait_minutes = ?6,
                notification_count = ?7,
                last_notified = ?8,
                withdraw_reason = ?9,
                updated_at = ?10
            WHERE id = ?1 AND queue_id = ?11
            "#,
        )
        .bind(&entry.id)
        .bind(entry.status)
        .bind(entry.position)
        .bind(entry.called_at)
        .bind(entry.completed_at)
        .bind(entry.estimated_wait_minutes)
        .bind(entry.notification_count)
        .bind(entry.last_notified)
        .bind(&entry.withdraw_reason)
        .bind(entry.updated_at)
        .bind(&self.queue.id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Entry", &entry.id));
        }
        Ok(())
    }

    /// Changes queue settings. Call [`reassign_positions`](Self::reassign_positions)
    /// afterwards so estimates follow a new average.
    pub async fn update_queue_settings(
        &mut self,
        name: &str,
        capacity: Option<i64>,
        average_service_minutes: i64,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE queues SET
                name = ?2,
                capacity = ?3,
                average_service_minutes = ?4
            WHERE id = ?1
            "#,
        )
        .bind(&self.queue.id)
        .bind(name)
        .bind(capacity)
        .bind(average_service_minutes)
        .execute(&mut *self.tx)
        .await?;

        self.queue.name = name.to_string();
        self.queue.capacity = capacity;
        self.queue.average_service_minutes = average_service_minutes;
        Ok(())
    }

    /// Opens or closes the queue for new joins.
    pub async fn set_open(&mut self, is_open: bool) -> DbResult<()> {
        sqlx::query("UPDATE queues SET is_open = ?2 WHERE id = ?1")
            .bind(&self.queue.id)
            .bind(is_open)
            .execute(&mut *self.tx)
            .await?;

        self.queue.is_open = is_open;
        Ok(())
    }

    /// Recomputes positions and estimates for every waiting entry.
    ///
    /// Reads the waiting set as this transaction sees it, so the entry just
    /// saved is already in or out of it. Only rows whose values change are
    /// written.
    pub async fn reassign_positions(&mut self) -> DbResult<Vec<PositionAssignment>> {
        let rows: Vec<(String, DateTime<Utc>, Option<i64>, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT id, joined_at, position, estimated_wait_minutes
            FROM queue_entries
            WHERE queue_id = ?1 AND status = 'waiting'
            "#,
        )
        .bind(&self.queue.id)
        .fetch_all(&mut *self.tx)
        .await?;

        let slots: Vec<WaitingSlot> = rows
            .iter()
            .map(|(id, joined_at, position, _)| WaitingSlot {
                entry_id: id.clone(),
                joined_at: *joined_at,
                position: *position,
            })
            .collect();

        let assignments = recompute_positions(&slots, self.queue.average_service_minutes);

        let mut changed = 0usize;
        for assignment in &assignments {
            let unchanged = rows.iter().any(|(id, _, position, estimate)| {
                *id == assignment.entry_id
                    && *position == Some(assignment.position)
                    && *estimate == Some(assignment.estimated_wait_minutes)
            });
            if unchanged {
                continue;
            }

            sqlx::query(
                "UPDATE queue_entries SET position = ?2, estimated_wait_minutes = ?3 WHERE id = ?1",
            )
            .bind(&assignment.entry_id)
            .bind(assignment.position)
            .bind(assignment.estimated_wait_minutes)
            .execute(&mut *self.tx)
            .await?;
            changed += 1;
        }

        debug!(
            queue_id = %self.queue.id,
            waiting = assignments.len(),
            changed,
            "Positions reassigned"
        );
        Ok(assignments)
    }

    /// Writes an outbox row for `entry`, committed together with the transition.
    pub async fn enqueue_notification<P: Serialize>(
        &mut self,
        entry: &QueueEntry,
        kind: NotificationKind,
        payload: &P,
        now: DateTime<Utc>,
    ) -> DbResult<NotificationOutboxEntry> {
        let row = NotificationOutboxEntry {
            id: Uuid::new_v4().to_string(),
            entry_id: entry.id.clone(),
            queue_id: entry.queue_id.clone(),
            kind,
            payload: serde_json::to_string(payload)?,
            attempts: 0,
            last_error: None,
            created_at: now,
            attempted_at: None,
            next_attempt_at: None,
            delivered_at: None,
            abandoned_at: None,
        };

        debug!(id = %row.id, entry_id = %row.entry_id, kind = ?kind, "Queuing notification");

        sqlx::query(
            r#"
            INSERT INTO notification_outbox (
                id, entry_id, queue_id, kind, payload, attempts, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            "#,
        )
        .bind(&row.id)
        .bind(&row.entry_id)
        .bind(&row.queue_id)
        .bind(row.kind)
        .bind(&row.payload)
        .bind(row.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(row)
    }

    /// Abandons every undelivered notification of `entry_id`.
    ///
    /// Used when the entry leaves `called` or a newer notification replaces
    /// the older ones. Delivered rows are left alone.
    pub async fn supersede_pending_notifications(
        &mut self,
        entry_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notification_outbox SET
                abandoned_at = ?3,
                last_error = ?2
            WHERE entry_id = ?1
              AND queue_id = ?4
              AND delivered_at IS NULL
              AND abandoned_at IS NULL
            "#,
        )
        .bind(entry_id)
        .bind(reason)
        .bind(now)
        .bind(&self.queue.id)
        .execute(&mut *self.tx)
        .await?;

        let superseded = result.rows_affected();
        if superseded > 0 {
            debug!(entry_id = %entry_id, superseded, reason = %reason, "Pending notifications superseded");
        }
        Ok(superseded)
    }

    /// Commits everything written through this unit of work.
    ///
    /// A commit that hits SQLite BUSY/LOCKED fails with [`DbError::Busy`].
    pub async fn commit(self) -> DbResult<()> {
        let queue_id = self.queue.id;
        self.tx.commit().await?;
        debug!(queue_id = %queue_id, "Unit of work committed");
        Ok(())
    }

    /// Discards everything written through this unit of work.
    ///
    /// Dropping without commit does the same; this just makes it explicit.
    pub async fn rollback(self) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// =============================================================================
// Test Support
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Utc};
    use waitlist_core::lifecycle::admit;
    use waitlist_core::{NewCustomer, Queue, QueueEntry};

    use crate::{Database, DbConfig};

    /// In-memory database with one open queue (average 10 minutes).
    pub async fn seeded_db() -> (Database, Queue) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let queue = Queue {
            id: "queue-1".to_string(),
            merchant_id: "merchant-1".to_string(),
            name: "Main Dining".to_string(),
            capacity: None,
            average_service_minutes: 10,
            is_open: true,
            created_at: now,
            updated_at: now,
        };
        db.queues().create(&queue).await.unwrap();
        (db, queue)
    }

    /// A waiting entry admitted behind `ahead` others.
    pub fn waiting_entry(queue: &Queue, id: &str, ahead: i64, joined_at: DateTime<Utc>) -> QueueEntry {
        admit(
            queue,
            ahead,
            NewCustomer::new(format!("Guest {id}"), "5550102030", 2),
            id.to_string(),
            "ABC234".to_string(),
            joined_at,
        )
        .unwrap()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::test_support::{seeded_db, waiting_entry};
    use crate::{Database, DbConfig, DbError};
    use chrono::{Duration, Utc};
    use waitlist_core::{lifecycle, EntryStatus, NotificationKind};

    #[tokio::test]
    async fn test_begin_unknown_queue_is_not_found() {
        let (db, _queue) = seeded_db().await;
        let err = db.begin_queue("missing", Utc::now()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_reassign_closes_gap_after_call() {
        let (db, queue) = seeded_db().await;
        let t0 = Utc::now();

        let mut uow = db.begin_queue(&queue.id, t0).await.unwrap();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let entry = waiting_entry(&queue, id, i as i64, t0 + Duration::seconds(i as i64));
            uow.insert_entry(&entry).await.unwrap();
        }
        assert_eq!(uow.waiting_count().await.unwrap(), 3);

        let mut a = uow.entry("a").await.unwrap();
        lifecycle::call(&mut a, t0).unwrap();
        uow.save_entry(&a).await.unwrap();
        let assignments = uow.reassign_positions().await.unwrap();
        uow.commit().await.unwrap();

        let summary: Vec<(String, i64, i64)> = assignments
            .into_iter()
            .map(|a| (a.entry_id, a.position, a.estimated_wait_minutes))
            .collect();
        assert_eq!(
            summary,
            vec![("b".into(), 1, 10), ("c".into(), 2, 20)]
        );

        let b = db.entries().get_by_id("b").await.unwrap().unwrap();
        assert_eq!(b.position, Some(1));
        assert_eq!(b.estimated_wait_minutes, Some(10));
        let a = db.entries().get_by_id("a").await.unwrap().unwrap();
        assert_eq!(a.status, EntryStatus::Called);
        assert_eq!(a.position, None);
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let (db, queue) = seeded_db().await;
        let t0 = Utc::now();

        {
            let mut uow = db.begin_queue(&queue.id, t0).await.unwrap();
            let entry = waiting_entry(&queue, "a", 0, t0);
            uow.insert_entry(&entry).await.unwrap();
            uow.enqueue_notification(&entry, NotificationKind::Called, &"x", t0)
                .await
                .unwrap();
        }

        assert!(db.entries().get_by_id("a").await.unwrap().is_none());
        assert_eq!(db.notifications().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_entry_of_other_queue_is_not_found() {
        let (db, queue) = seeded_db().await;
        let mut other = queue.clone();
        other.id = "queue-2".to_string();
        db.queues().create(&other).await.unwrap();

        let t0 = Utc::now();
        let mut uow = db.begin_queue(&other.id, t0).await.unwrap();
        uow.insert_entry(&waiting_entry(&other, "x", 0, t0)).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = db.begin_queue(&queue.id, t0).await.unwrap();
        assert!(matches!(
            uow.entry("x").await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_supersede_abandons_only_pending_rows() {
        let (db, queue) = seeded_db().await;
        let t0 = Utc::now();

        let mut uow = db.begin_queue(&queue.id, t0).await.unwrap();
        let entry = waiting_entry(&queue, "a", 0, t0);
        uow.insert_entry(&entry).await.unwrap();
        let delivered = uow
            .enqueue_notification(&entry, NotificationKind::Called, &"first", t0)
            .await
            .unwrap();
        let pending = uow
            .enqueue_notification(&entry, NotificationKind::Renotified, &"second", t0)
            .await
            .unwrap();
        uow.commit().await.unwrap();
        db.notifications().mark_delivered(&delivered.id, t0).await.unwrap();

        let mut uow = db.begin_queue(&queue.id, t0).await.unwrap();
        let superseded = uow
            .supersede_pending_notifications("a", "entry is withdrawn", t0)
            .await
            .unwrap();
        uow.commit().await.unwrap();
        assert_eq!(superseded, 1);

        let outbox = db.notifications();
        assert_eq!(outbox.count_pending().await.unwrap(), 0);
        let stored = outbox.get_by_id(&pending.id).await.unwrap().unwrap();
        assert!(stored.abandoned_at.is_some());
        assert_eq!(stored.last_error.as_deref(), Some("entry is withdrawn"));
        let kept = outbox.get_by_id(&delivered.id).await.unwrap().unwrap();
        assert!(kept.delivered_at.is_some());
        assert!(kept.abandoned_at.is_none());
    }

    #[tokio::test]
    async fn test_contended_write_lock_surfaces_as_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contended.db");
        let config = DbConfig::new(&path).busy_timeout(std::time::Duration::from_millis(50));

        let first = Database::new(config.clone()).await.unwrap();
        let second = Database::new(config).await.unwrap();

        let now = Utc::now();
        let queue = waitlist_core::Queue {
            id: "queue-1".to_string(),
            merchant_id: "merchant-1".to_string(),
            name: "Main Dining".to_string(),
            capacity: None,
            average_service_minutes: 10,
            is_open: true,
            created_at: now,
            updated_at: now,
        };
        first.queues().create(&queue).await.unwrap();

        let held = first.begin_queue(&queue.id, now).await.unwrap();
        let err = second.begin_queue(&queue.id, now).await.unwrap_err();
        assert!(err.is_busy(), "expected busy, got {err:?}");

        held.commit().await.unwrap();
        second
            .begin_queue(&queue.id, now)
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_settings_change_rederives_estimates() {
        let (db, queue) = seeded_db().await;
        let t0 = Utc::now();

        let mut uow = db.begin_queue(&queue.id, t0).await.unwrap();
        uow.insert_entry(&waiting_entry(&queue, "a", 0, t0)).await.unwrap();
        uow.insert_entry(&waiting_entry(&queue, "b", 1, t0 + Duration::seconds(1)))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let mut uow = db.begin_queue(&queue.id, t0).await.unwrap();
        uow.update_queue_settings("Main Dining", Some(5), 15).await.unwrap();
        uow.set_open(false).await.unwrap();
        assert!(!uow.queue().is_open);
        uow.reassign_positions().await.unwrap();
        uow.commit().await.unwrap();

        let b = db.entries().get_by_id("b").await.unwrap().unwrap();
        assert_eq!(b.estimated_wait_minutes, Some(30));

        let stored = db.queues().get_by_id(&queue.id).await.unwrap().unwrap();
        assert_eq!(stored.capacity, Some(5));
        assert!(!stored.is_open);
    }
}
