//! # Queue Repository
//!
//! Queue creation and lookup. Settings changes go through
//! [`QueueUnitOfWork`](super::unit_of_work::QueueUnitOfWork) so that estimated
//! waits are re-derived in the same transaction.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use waitlist_core::Queue;

/// Repository for queue operations.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    pool: SqlitePool,
}

impl QueueRepository {
    /// Creates a new QueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        QueueRepository { pool }
    }

    /// Inserts a new queue.
    pub async fn create(&self, queue: &Queue) -> DbResult<()> {
        debug!(id = %queue.id, merchant_id = %queue.merchant_id, "Inserting queue");

        sqlx::query(
            r#"
            INSERT INTO queues (
                id, merchant_id, name, capacity, average_service_minutes,
                is_open, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&queue.id)
        .bind(&queue.merchant_id)
        .bind(&queue.name)
        .bind(queue.capacity)
        .bind(queue.average_service_minutes)
        .bind(queue.is_open)
        .bind(queue.created_at)
        .bind(queue.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a queue by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Queue>> {
        let queue = sqlx::query_as::<_, Queue>(concat!(
            "SELECT ",
            queue_columns!(),
            " FROM queues WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(queue)
    }

    /// Lists a merchant's queues by name.
    pub async fn list_for_merchant(&self, merchant_id: &str) -> DbResult<Vec<Queue>> {
        let queues = sqlx::query_as::<_, Queue>(concat!(
            "SELECT ",
            queue_columns!(),
            " FROM queues WHERE merchant_id = ?1 ORDER BY name ASC, created_at ASC"
        ))
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await?;

        debug!(merchant_id = %merchant_id, count = queues.len(), "Listed queues");
        Ok(queues)
    }

    /// Counts all queues.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queues")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
