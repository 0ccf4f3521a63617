//! # Notification Outbox Repository
//!
//! Delivery bookkeeping for customer notifications.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LIFECYCLE OPERATION (e.g., call)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION (QueueUnitOfWork)          │   │
//! │  │                                                                 │   │
//! │  │  1. UPDATE queue_entries SET status = 'called' WHERE id = ?    │   │
//! │  │  2. UPDATE queue_entries SET position = ... (recompute)        │   │
//! │  │  3. INSERT INTO notification_outbox (entry_id, kind, payload)  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← All succeed or all fail                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            NOTIFICATION DISPATCHER (THIS REPOSITORY)            │   │
//! │  │                                                                 │   │
//! │  │  1. get_pending: not delivered, not abandoned, due now          │   │
//! │  │  2. For each row:                                              │   │
//! │  │     a. Send over the customer's live connection                │   │
//! │  │     b. Success: mark_delivered                                 │   │
//! │  │     c. Failure: mark_failed (attempts += 1, next_attempt_at)   │   │
//! │  │     d. Too many failures: mark_abandoned                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  A failed delivery never rolls back or alters the entry.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use waitlist_core::NotificationOutboxEntry;

const OUTBOX_COLUMNS_SELECT: &str = r#"
    SELECT
        id, entry_id, queue_id, kind, payload, attempts, last_error,
        created_at, attempted_at, next_attempt_at, delivered_at, abandoned_at
    FROM notification_outbox
"#;

/// Repository for notification outbox operations.
#[derive(Debug, Clone)]
pub struct NotificationOutboxRepository {
    pool: SqlitePool,
}

impl NotificationOutboxRepository {
    /// Creates a new NotificationOutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        NotificationOutboxRepository { pool }
    }

    /// Gets a single outbox row.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<NotificationOutboxEntry>> {
        let sql = format!("{OUTBOX_COLUMNS_SELECT} WHERE id = ?1");
        let row = sqlx::query_as::<_, NotificationOutboxEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    /// Rows due for delivery at `now`, oldest first.
    pub async fn get_pending(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<NotificationOutboxEntry>> {
        let sql = format!(
            "{OUTBOX_COLUMNS_SELECT}
            WHERE delivered_at IS NULL
              AND abandoned_at IS NULL
              AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
            ORDER BY created_at ASC
            LIMIT ?2"
        );
        let rows = sqlx::query_as::<_, NotificationOutboxEntry>(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Every outbox row written for one entry, oldest first.
    pub async fn list_for_entry(&self, entry_id: &str) -> DbResult<Vec<NotificationOutboxEntry>> {
        let sql = format!("{OUTBOX_COLUMNS_SELECT} WHERE entry_id = ?1 ORDER BY created_at ASC");
        let rows = sqlx::query_as::<_, NotificationOutboxEntry>(&sql)
            .bind(entry_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Marks a row as delivered.
    pub async fn mark_delivered(&self, id: &str, now: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE notification_outbox SET
                delivered_at = ?2,
                attempted_at = ?2,
                last_error = NULL
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Notification", id));
        }
        Ok(())
    }

    /// Records a failed attempt and when to try again.
    pub async fn mark_failed(
        &self,
        id: &str,
        error: &str,
        now: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(id = %id, error = %error, "Recording notification failure");

        let result = sqlx::query(
            r#"
            UPDATE notification_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3,
                next_attempt_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Notification", id));
        }
        Ok(())
    }

    /// Stops retrying a row. It stays in the table for inspection.
    pub async fn mark_abandoned(&self, id: &str, error: &str, now: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE notification_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3,
                abandoned_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Notification", id));
        }
        Ok(())
    }

    /// Counts rows still awaiting delivery.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_outbox \
             WHERE delivered_at IS NULL AND abandoned_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Deletes delivered rows older than `cutoff`.
    ///
    /// ## Returns
    /// Number of deleted rows.
    pub async fn cleanup_delivered_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM notification_outbox
            WHERE delivered_at IS NOT NULL
              AND delivered_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
