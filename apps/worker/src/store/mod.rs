//! Persistence seams used by the pipeline.
//!
//! The worker talks to Postgres through these traits so that the queue loop,
//! ingestion, résumé pipeline and ranking engine can run against any backing
//! store. `crate::db` provides the sqlx implementations.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::job::{JobRow, SortingState};
use crate::models::queue::QueueItemRow;
use crate::models::resume::{
    ChunkEmbedding, NewResume, RankableResume, RegisteredResume, ResumeSource,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// No connection could be obtained. Callers back off and retry.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Maps pool exhaustion to `Unavailable` so claim loops can tell it apart
    /// from query failures.
    pub fn from_sqlx(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(e.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::from_sqlx(e)
    }
}

/// Durable work queue with atomic claims.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn enqueue(&self, queue_name: &str, payload: &Value) -> Result<Uuid, StoreError>;

    /// Claims the oldest claimable item of `queue_name`, moving it to
    /// `processing`, bumping `attempts` and stamping `started_at` in one
    /// transaction. Two concurrent callers never receive the same item.
    async fn claim_next(&self, queue_name: &str) -> Result<Option<QueueItemRow>, StoreError>;

    async fn mark_completed(&self, id: Uuid, result: &Value) -> Result<(), StoreError>;

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<QueueItemRow>, StoreError>;
}

/// Candidate, résumé, stored-file and job records.
#[async_trait]
pub trait RecruitStore: Send + Sync {
    /// Creates the candidate, stored file and résumé rows together or not at all.
    async fn register_resume(&self, new: &NewResume) -> Result<RegisteredResume, StoreError>;

    /// Set-union of the given ids into the job's reference lists.
    async fn merge_job_references(
        &self,
        job_id: Uuid,
        file_ids: &[Uuid],
        resume_ids: &[Uuid],
    ) -> Result<(), StoreError>;

    async fn load_resume_source(&self, resume_id: Uuid)
        -> Result<Option<ResumeSource>, StoreError>;

    /// Stores extracted text and fields and moves the résumé to `embedding`.
    async fn mark_resume_embedding(
        &self,
        resume_id: Uuid,
        extracted_text: &str,
        fields: &Value,
    ) -> Result<(), StoreError>;

    /// Replaces the résumé's chunks and moves it to `completed`.
    async fn complete_resume(
        &self,
        resume_id: Uuid,
        chunks: &[ChunkEmbedding],
    ) -> Result<(), StoreError>;

    async fn fail_resume(&self, resume_id: Uuid, message: &str) -> Result<(), StoreError>;

    async fn load_job(&self, job_id: Uuid) -> Result<Option<JobRow>, StoreError>;

    async fn save_job_embedding(&self, job_id: Uuid, embedding: &[f32])
        -> Result<(), StoreError>;

    /// Updates `sorting_state`, and `cv_sorted_count` when a count is given.
    async fn set_sorting_state(
        &self,
        job_id: Uuid,
        state: SortingState,
        sorted_count: Option<i32>,
    ) -> Result<(), StoreError>;

    /// Completed résumés of a job that have at least one chunk vector.
    async fn completed_resumes(&self, job_id: Uuid) -> Result<Vec<RankableResume>, StoreError>;

    async fn save_ranking(
        &self,
        resume_id: Uuid,
        overall_score: f64,
        breakdown: &Value,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(result: Result<(), sqlx::Error>) -> Result<(), StoreError> {
        result?;
        Ok(())
    }

    #[test]
    fn test_pool_exhaustion_through_question_mark_is_unavailable() {
        let err = lookup(Err(sqlx::Error::PoolTimedOut)).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        let err = lookup(Err(sqlx::Error::PoolClosed)).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_query_failures_stay_database_errors() {
        let err = lookup(Err(sqlx::Error::RowNotFound)).unwrap_err();
        assert!(matches!(err, StoreError::Database(sqlx::Error::RowNotFound)));
    }
}
