use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::queue::{QueueItemRow, QueueStatus};
use crate::store::{QueueStore, StoreError};

#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn enqueue(&self, queue_name: &str, payload: &Value) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO queue_items (id, queue_name, status, payload) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(queue_name)
        .bind(QueueStatus::Pending.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(id)
    }

    async fn claim_next(&self, queue_name: &str) -> Result<Option<QueueItemRow>, StoreError> {
        // The transaction covers only the claim. Row locks taken by
        // SKIP LOCKED keep a concurrent claimer from seeing the same row.
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
        let claimable: Vec<&str> = QueueStatus::CLAIMABLE.iter().map(QueueStatus::as_str).collect();

        let candidate: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM queue_items
            WHERE queue_name = $1 AND status = ANY($2)
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(queue_name)
        .bind(claimable)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        let Some(id) = candidate else {
            tx.commit().await.map_err(StoreError::from_sqlx)?;
            return Ok(None);
        };

        let claimed = sqlx::query_as::<_, QueueItemRow>(
            r#"
            UPDATE queue_items
            SET status = $2, attempts = attempts + 1, started_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(QueueStatus::Processing.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        Ok(Some(claimed))
    }

    async fn mark_completed(&self, id: Uuid, result: &Value) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE queue_items SET status = $2, result = $3, completed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(QueueStatus::Completed.as_str())
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE queue_items SET status = $2, error = $3, failed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(QueueStatus::Failed.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueItemRow>, StoreError> {
        sqlx::query_as::<_, QueueItemRow>("SELECT * FROM queue_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }
}
