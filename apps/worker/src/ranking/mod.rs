//! Per-job candidate ranking: vector similarity plus rule-based factors.
//!
//! A run marks the job `PROCESSING`, embeds the job profile once, keeps a
//! per-job collection at the job vector's dimension, upserts one averaged
//! vector per completed résumé, queries nearest neighbours and writes the
//! composite score onto each hit. Every run ends with the job `COMPLETED` or
//! reset to `NOT_STARTED`.

pub mod qdrant;
pub mod scoring;
pub mod vectors;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::embedding::{EmbeddingError, EmbeddingService};
use crate::models::job::{JobRow, SortingState};
use crate::models::resume::RankableResume;
use crate::parsing::ParsedFields;
use crate::store::{RecruitStore, StoreError};

pub use qdrant::{QdrantClient, ScoredPoint, VectorError, VectorIndex, VectorPoint};
pub use scoring::RankingResult;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Job {0} produced an empty embedding")]
    EmptyJobEmbedding(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector index error: {0}")]
    Vector(#[from] VectorError),
}

/// Result of one sort run, reported as the queue item result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortOutcome {
    pub job_id: Uuid,
    pub ranked_count: usize,
    pub ranked: Vec<RankingResult>,
}

#[derive(Clone)]
pub struct RankingEngine {
    store: Arc<dyn RecruitStore>,
    index: Arc<dyn VectorIndex>,
    embeddings: EmbeddingService,
}

impl RankingEngine {
    pub fn new(
        store: Arc<dyn RecruitStore>,
        index: Arc<dyn VectorIndex>,
        embeddings: EmbeddingService,
    ) -> Self {
        Self {
            store,
            index,
            embeddings,
        }
    }

    /// Ranks the job's completed résumés. `top_n` limits the neighbours
    /// queried; `None` ranks all of them.
    #[instrument(skip(self), fields(op = "run_sort"))]
    pub async fn run_sort(
        &self,
        job_id: Uuid,
        top_n: Option<u32>,
    ) -> Result<SortOutcome, RankingError> {
        let job = self
            .store
            .load_job(job_id)
            .await?
            .ok_or(RankingError::JobNotFound(job_id))?;

        self.store
            .set_sorting_state(job_id, SortingState::Processing, None)
            .await?;

        match self.rank(&job, top_n).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(%job_id, "Sort run failed, resetting job: {e}");
                if let Err(reset) = self
                    .store
                    .set_sorting_state(job_id, SortingState::NotStarted, None)
                    .await
                {
                    warn!(%job_id, "Could not reset sorting state: {reset}");
                }
                Err(e)
            }
        }
    }

    async fn rank(&self, job: &JobRow, top_n: Option<u32>) -> Result<SortOutcome, RankingError> {
        let resumes = self.store.completed_resumes(job.id).await?;
        if resumes.is_empty() {
            info!(job_id = %job.id, "No completed résumés to rank");
            return self.finish_empty(job.id).await;
        }

        let job_vector = self.job_embedding(job).await?;
        let dimension = job_vector.len();

        let points: Vec<VectorPoint> = resumes
            .iter()
            .filter_map(|r| {
                let averaged = vectors::average(&r.chunk_embeddings, dimension);
                if averaged.is_none() {
                    warn!(resume_id = %r.resume_id, "No chunk vectors of length {dimension}, skipping");
                }
                Some(VectorPoint {
                    id: vectors::point_id(r.resume_id),
                    vector: vectors::sanitize(averaged?),
                    payload: json!({ "resumeId": r.resume_id, "jobId": job.id }),
                })
            })
            .collect();
        if points.is_empty() {
            return self.finish_empty(job.id).await;
        }

        let collection = vectors::collection_name(job.id);
        self.ensure_collection(&collection, dimension).await?;

        let limit = top_n
            .map(|n| n as usize)
            .unwrap_or(points.len())
            .min(points.len());
        let hits = match self
            .index_and_search(&collection, &points, &job_vector, limit)
            .await
        {
            Err(e) if e.is_rejection() => {
                warn!(%collection, "Vector service rejected request, recreating collection: {e}");
                self.recreate(&collection, dimension).await?;
                self.index_and_search(&collection, &points, &job_vector, limit)
                    .await?
            }
            other => other?,
        };

        let ranked = score_hits(job, &resumes, &hits);
        for result in &ranked {
            let breakdown = serde_json::to_value(result).unwrap_or_default();
            self.store
                .save_ranking(result.resume_id, result.composite_score, &breakdown)
                .await?;
        }
        self.store
            .set_sorting_state(
                job.id,
                SortingState::Completed,
                Some(ranked.len() as i32),
            )
            .await?;

        info!(job_id = %job.id, ranked = ranked.len(), "Sort run completed");
        Ok(SortOutcome {
            job_id: job.id,
            ranked_count: ranked.len(),
            ranked,
        })
    }

    async fn finish_empty(&self, job_id: Uuid) -> Result<SortOutcome, RankingError> {
        self.store
            .set_sorting_state(job_id, SortingState::NotStarted, Some(0))
            .await?;
        Ok(SortOutcome {
            job_id,
            ranked_count: 0,
            ranked: Vec::new(),
        })
    }

    /// The cached job vector, or a freshly computed one that is then cached.
    async fn job_embedding(&self, job: &JobRow) -> Result<Vec<f32>, RankingError> {
        if let Some(cached) = job.cached_embedding() {
            return Ok(cached.to_vec());
        }
        let vector = vectors::sanitize(self.embeddings.embed_text(&job.embedding_text()).await?);
        if vector.is_empty() {
            return Err(RankingError::EmptyJobEmbedding(job.id));
        }
        self.store.save_job_embedding(job.id, &vector).await?;
        Ok(vector)
    }

    /// Keeps the collection only when it reports exactly `dimension`; an
    /// unreadable schema counts as a mismatch.
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<(), VectorError> {
        match self.index.collection_info(name).await {
            Ok(Some(info)) if info.dimension == Some(dimension) => return Ok(()),
            Ok(Some(info)) => {
                info!(
                    collection = name,
                    existing = ?info.dimension,
                    wanted = dimension,
                    "Collection dimension mismatch, recreating"
                );
                self.index.delete_collection(name).await?;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(collection = name, "Collection introspection failed, recreating: {e}");
                if let Err(e) = self.index.delete_collection(name).await {
                    warn!(collection = name, "Delete before recreate failed: {e}");
                }
            }
        }
        self.index.create_collection(name, dimension).await
    }

    async fn recreate(&self, name: &str, dimension: usize) -> Result<(), VectorError> {
        self.index.delete_collection(name).await?;
        self.index.create_collection(name, dimension).await
    }

    async fn index_and_search(
        &self,
        collection: &str,
        points: &[VectorPoint],
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorError> {
        self.index.upsert(collection, points).await?;
        // Points from earlier runs may belong to résumés no longer completed.
        let current: Vec<Uuid> = points.iter().map(|p| p.id).collect();
        self.index.search(collection, query, &current, limit).await
    }
}

/// Joins hits back to résumés, scores them and assigns ranks by descending
/// composite score.
fn score_hits(job: &JobRow, resumes: &[RankableResume], hits: &[ScoredPoint]) -> Vec<RankingResult> {
    let by_point: HashMap<Uuid, &RankableResume> = resumes
        .iter()
        .map(|r| (vectors::point_id(r.resume_id), r))
        .collect();

    let mut results: Vec<RankingResult> = hits
        .iter()
        .filter_map(|hit| {
            let resume = by_point.get(&hit.id)?;
            let fields = ParsedFields::from_value(&resume.extracted_fields);
            let similarity = f64::from(hit.score);
            let skill_match = scoring::skill_match(&job.required_skills, &fields.skills);
            let education_match =
                scoring::education_match(job.min_education.as_deref(), &fields.education);
            let age_fit = scoring::age_fit(job.min_age, job.max_age, fields.age);
            Some(RankingResult {
                resume_id: resume.resume_id,
                similarity,
                skill_match,
                education_match,
                age_fit,
                composite_score: scoring::composite(
                    similarity,
                    skill_match,
                    education_match,
                    age_fit,
                ),
                rank: 0,
            })
        })
        .collect();

    results.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }
    results
}
