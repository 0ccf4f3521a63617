//! # Entry Repository
//!
//! Lock-free reads over `queue_entries`. These see the latest committed state
//! and never wait on a queue's unit of work (WAL readers don't block).
//!
//! ## Ordering
//! ```text
//! list_waiting   position ASC
//! list_active    waiting by position, then called by called_at
//! list_by_status most recently updated first
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;
use waitlist_core::{EntryStatus, QueueEntry, QueueStats};

/// Repository for queue entry reads.
#[derive(Debug, Clone)]
pub struct EntryRepository {
    pool: SqlitePool,
}

impl EntryRepository {
    /// Creates a new EntryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        EntryRepository { pool }
    }

    /// Gets an entry by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<QueueEntry>> {
        let entry = sqlx::query_as::<_, QueueEntry>(concat!(
            "SELECT ",
            entry_columns!(),
            " FROM queue_entries WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Waiting entries of a queue, front of the line first.
    pub async fn list_waiting(&self, queue_id: &str) -> DbResult<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(concat!(
            "SELECT ",
            entry_columns!(),
            " FROM queue_entries WHERE queue_id = ?1 AND status = 'waiting' \
             ORDER BY position ASC, joined_at ASC"
        ))
        .bind(queue_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Waiting and called entries, as the host dashboard lists them.
    pub async fn list_active(&self, queue_id: &str) -> DbResult<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(concat!(
            "SELECT ",
            entry_columns!(),
            " FROM queue_entries WHERE queue_id = ?1 AND status IN ('waiting', 'called') \
             ORDER BY CASE status WHEN 'waiting' THEN 0 ELSE 1 END, \
                      CASE status WHEN 'waiting' THEN position END ASC, \
                      CASE status WHEN 'called' THEN called_at END ASC, \
                      joined_at ASC"
        ))
        .bind(queue_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries of one status, most recently updated first.
    pub async fn list_by_status(
        &self,
        queue_id: &str,
        status: EntryStatus,
        limit: u32,
    ) -> DbResult<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(concat!(
            "SELECT ",
            entry_columns!(),
            " FROM queue_entries WHERE queue_id = ?1 AND status = ?2 \
             ORDER BY updated_at DESC LIMIT ?3"
        ))
        .bind(queue_id)
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Per-status counts and the mean wait until called.
    pub async fn stats(&self, queue_id: &str) -> DbResult<QueueStats> {
        let counts: Vec<(EntryStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM queue_entries WHERE queue_id = ?1 GROUP BY status",
        )
        .bind(queue_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats {
            queue_id: queue_id.to_string(),
            ..Default::default()
        };
        for (status, count) in counts {
            stats.record(status, count);
        }

        let waits: Vec<(DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT joined_at, called_at FROM queue_entries \
             WHERE queue_id = ?1 AND called_at IS NOT NULL",
        )
        .bind(queue_id)
        .fetch_all(&self.pool)
        .await?;

        if !waits.is_empty() {
            let total_secs: i64 = waits
                .iter()
                .map(|(joined, called)| (*called - *joined).num_seconds().max(0))
                .sum();
            stats.average_wait_minutes = Some(total_secs as f64 / 60.0 / waits.len() as f64);
        }

        debug!(queue_id = %queue_id, active = stats.active(), "Computed queue stats");
        Ok(stats)
    }

    /// Deletes terminal entries that finished before `cutoff`.
    ///
    /// Outbox rows of deleted entries go with them (`ON DELETE CASCADE`).
    /// Active entries are never touched.
    pub async fn delete_terminal_before(
        &self,
        queue_id: &str,
        cutoff: DateTime<Utc>,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM queue_entries
            WHERE queue_id = ?1
              AND status IN ('completed', 'no_show', 'withdrawn')
              AND completed_at IS NOT NULL
              AND completed_at < ?2
            "#,
        )
        .bind(queue_id)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!(queue_id = %queue_id, deleted, "Deleted terminal entries");
        }
        Ok(deleted)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::repository::unit_of_work::test_support::{seeded_db, waiting_entry};
    use chrono::{Duration, Utc};
    use waitlist_core::lifecycle;
    use waitlist_core::EntryStatus;

    #[tokio::test]
    async fn test_list_active_orders_waiting_then_called() {
        let (db, queue) = seeded_db().await;
        let t0 = Utc::now();

        let mut uow = db.begin_queue(&queue.id, t0).await.unwrap();
        let a = waiting_entry(&queue, "a", 0, t0);
        let mut b = waiting_entry(&queue, "b", 1, t0 + Duration::seconds(1));
        let mut c = waiting_entry(&queue, "c", 2, t0 + Duration::seconds(2));
        uow.insert_entry(&a).await.unwrap();
        uow.insert_entry(&b).await.unwrap();
        uow.insert_entry(&c).await.unwrap();
        let d = waiting_entry(&queue, "d", 3, t0 + Duration::seconds(3));
        uow.insert_entry(&d).await.unwrap();
        // c is called before b, so c comes first among called entries
        lifecycle::call(&mut c, t0 + Duration::seconds(5)).unwrap();
        uow.save_entry(&c).await.unwrap();
        lifecycle::call(&mut b, t0 + Duration::seconds(6)).unwrap();
        uow.save_entry(&b).await.unwrap();
        uow.reassign_positions().await.unwrap();
        uow.commit().await.unwrap();

        let entries = db.entries();
        let active: Vec<String> = entries
            .list_active(&queue.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(active, vec!["a", "d", "c", "b"]);

        let waiting = entries.list_waiting(&queue.id).await.unwrap();
        assert_eq!(waiting.len(), 2);
        assert_eq!(waiting[1].id, "d");
        assert_eq!(waiting[1].position, Some(2));

        let called = entries
            .list_by_status(&queue.id, EntryStatus::Called, 10)
            .await
            .unwrap();
        assert_eq!(called.len(), 2);
    }

    #[tokio::test]
    async fn test_stats_counts_and_average_wait() {
        let (db, queue) = seeded_db().await;
        let t0 = Utc::now();

        let mut uow = db.begin_queue(&queue.id, t0).await.unwrap();
        let mut a = waiting_entry(&queue, "a", 0, t0);
        let b = waiting_entry(&queue, "b", 1, t0);
        uow.insert_entry(&a).await.unwrap();
        uow.insert_entry(&b).await.unwrap();
        lifecycle::call(&mut a, t0 + Duration::minutes(15)).unwrap();
        uow.save_entry(&a).await.unwrap();
        uow.commit().await.unwrap();

        let stats = db.entries().stats(&queue.id).await.unwrap();
        assert_eq!(stats.waiting, 1);
        assert_eq!(stats.called, 1);
        assert_eq!(stats.active(), 2);
        assert_eq!(stats.average_wait_minutes, Some(15.0));

        let empty = db.entries().stats("other-queue").await.unwrap();
        assert_eq!(empty.active(), 0);
        assert_eq!(empty.average_wait_minutes, None);
    }

    #[tokio::test]
    async fn test_delete_terminal_before_keeps_active_entries() {
        let (db, queue) = seeded_db().await;
        let t0 = Utc::now() - Duration::days(2);

        let mut uow = db.begin_queue(&queue.id, t0).await.unwrap();
        let mut done = waiting_entry(&queue, "done", 0, t0);
        let still_waiting = waiting_entry(&queue, "waiting", 1, t0);
        uow.insert_entry(&done).await.unwrap();
        uow.insert_entry(&still_waiting).await.unwrap();
        lifecycle::withdraw(&mut done, None, t0).unwrap();
        uow.save_entry(&done).await.unwrap();
        uow.commit().await.unwrap();

        let deleted = db
            .entries()
            .delete_terminal_before(&queue.id, Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        assert!(db.entries().get_by_id("done").await.unwrap().is_none());
        assert!(db.entries().get_by_id("waiting").await.unwrap().is_some());
    }
}
