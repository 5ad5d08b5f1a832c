use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::job::{JobRow, SortingState};
use crate::models::resume::{
    ChunkEmbedding, NewResume, RankableResume, RegisteredResume, ResumeRow, ResumeSource,
    ResumeStatus, StoredFileRow,
};
use crate::store::{RecruitStore, StoreError};

#[derive(Clone)]
pub struct PgRecruitStore {
    pool: PgPool,
}

impl PgRecruitStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecruitStore for PgRecruitStore {
    async fn register_resume(&self, new: &NewResume) -> Result<RegisteredResume, StoreError> {
        let registered = RegisteredResume {
            candidate_id: Uuid::new_v4(),
            resume_id: Uuid::new_v4(),
            file_id: Uuid::new_v4(),
        };

        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        sqlx::query("INSERT INTO candidates (id, full_name, source) VALUES ($1, $2, $3)")
            .bind(registered.candidate_id)
            .bind(&new.candidate_name)
            .bind(&new.candidate_source)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO stored_files
                (id, storage_key, bucket, mime_type, size_bytes, checksum, uploaded_by, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(registered.file_id)
        .bind(&new.storage_key)
        .bind(&new.bucket)
        .bind(&new.mime_type)
        .bind(new.size_bytes)
        .bind(&new.checksum)
        .bind(new.uploaded_by)
        .bind(&new.metadata)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO resumes (id, candidate_id, job_id, file_id, status)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(registered.resume_id)
        .bind(registered.candidate_id)
        .bind(new.job_id)
        .bind(registered.file_id)
        .bind(ResumeStatus::Uploaded.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(registered)
    }

    async fn merge_job_references(
        &self,
        job_id: Uuid,
        file_ids: &[Uuid],
        resume_ids: &[Uuid],
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET file_ids = ARRAY(SELECT DISTINCT unnest(file_ids || $2::uuid[])),
                resume_ids = ARRAY(SELECT DISTINCT unnest(resume_ids || $3::uuid[])),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(file_ids)
        .bind(resume_ids)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("job {job_id}")));
        }
        Ok(())
    }

    async fn load_resume_source(
        &self,
        resume_id: Uuid,
    ) -> Result<Option<ResumeSource>, StoreError> {
        let resume: Option<ResumeRow> = sqlx::query_as("SELECT * FROM resumes WHERE id = $1")
            .bind(resume_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(resume) = resume else {
            return Ok(None);
        };

        let file: StoredFileRow = sqlx::query_as("SELECT * FROM stored_files WHERE id = $1")
            .bind(resume.file_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("stored file {}", resume.file_id)))?;

        Ok(Some(ResumeSource { resume, file }))
    }

    async fn mark_resume_embedding(
        &self,
        resume_id: Uuid,
        extracted_text: &str,
        fields: &Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE resumes
            SET status = $2, extracted_text = $3, extracted_fields = $4, parsed_json = $4,
                error_message = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(resume_id)
        .bind(ResumeStatus::Embedding.as_str())
        .bind(extracted_text)
        .bind(fields)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_resume(
        &self,
        resume_id: Uuid,
        chunks: &[ChunkEmbedding],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM resume_chunks WHERE resume_id = $1")
            .bind(resume_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO resume_chunks (resume_id, chunk_index, content, embedding)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(resume_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.embedding)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE resumes SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(resume_id)
            .bind(ResumeStatus::Completed.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Stored {} chunk vectors for resume {resume_id}", chunks.len());
        Ok(())
    }

    async fn fail_resume(&self, resume_id: Uuid, message: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE resumes SET status = $2, error_message = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(resume_id)
        .bind(ResumeStatus::Failed.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_job(&self, job_id: Uuid) -> Result<Option<JobRow>, StoreError> {
        Ok(sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn save_job_embedding(
        &self,
        job_id: Uuid,
        embedding: &[f32],
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE jobs SET embedding = $2, updated_at = NOW() WHERE id = $1")
            .bind(job_id)
            .bind(embedding)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_sorting_state(
        &self,
        job_id: Uuid,
        state: SortingState,
        sorted_count: Option<i32>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET sorting_state = $2,
                cv_sorted_count = COALESCE($3, cv_sorted_count),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(state.as_str())
        .bind(sorted_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn completed_resumes(&self, job_id: Uuid) -> Result<Vec<RankableResume>, StoreError> {
        let resumes: Vec<(Uuid, Option<Value>)> = sqlx::query_as(
            "SELECT id, extracted_fields FROM resumes WHERE job_id = $1 AND status = $2",
        )
        .bind(job_id)
        .bind(ResumeStatus::Completed.as_str())
        .fetch_all(&self.pool)
        .await?;

        if resumes.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<Uuid> = resumes.iter().map(|(id, _)| *id).collect();
        let chunk_rows: Vec<(Uuid, Vec<f32>)> = sqlx::query_as(
            r#"
            SELECT resume_id, embedding FROM resume_chunks
            WHERE resume_id = ANY($1)
            ORDER BY resume_id, chunk_index
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut chunks_by_resume: HashMap<Uuid, Vec<Vec<f32>>> = HashMap::new();
        for (resume_id, embedding) in chunk_rows {
            chunks_by_resume.entry(resume_id).or_default().push(embedding);
        }

        Ok(resumes
            .into_iter()
            .filter_map(|(resume_id, fields)| {
                let chunk_embeddings = chunks_by_resume.remove(&resume_id)?;
                Some(RankableResume {
                    resume_id,
                    extracted_fields: fields.unwrap_or(Value::Null),
                    chunk_embeddings,
                })
            })
            .collect())
    }

    async fn save_ranking(
        &self,
        resume_id: Uuid,
        overall_score: f64,
        breakdown: &Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE resumes
            SET overall_score = $2, score_breakdown = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(resume_id)
        .bind(overall_score)
        .bind(breakdown)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
