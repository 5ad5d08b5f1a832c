//! In-memory stand-ins for the external services, shared by module tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::config::ExtractionConfig;
use crate::embedding::{Embedder, EmbeddingError, EmbeddingService};
use crate::extraction::text::PlainTextStrategy;
use crate::extraction::DocumentExtractor;
use crate::ingest::ArchiveIngestor;
use crate::llm_client::LlmError;
use crate::models::job::{JobRow, SortingState};
use crate::models::queue::{QueueItemRow, QueueStatus};
use crate::models::resume::{
    ChunkEmbedding, NewResume, RankableResume, RegisteredResume, ResumeRow, ResumeSource,
    ResumeStatus, StoredFileRow,
};
use crate::parsing::{FieldAssistant, ParsedFields, StructuredParser};
use crate::pipeline::ResumePipeline;
use crate::ranking::qdrant::CollectionInfo;
use crate::ranking::{RankingEngine, ScoredPoint, VectorError, VectorIndex, VectorPoint};
use crate::storage::{ObjectStore, StorageError};
use crate::store::{QueueStore, RecruitStore, StoreError};

pub const PROCESSING_QUEUE: &str = "cv-processing";

// ── Queue ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryQueue {
    items: Mutex<Vec<QueueItemRow>>,
    pub claims: AtomicUsize,
}

impl MemoryQueue {
    pub fn items(&self) -> Vec<QueueItemRow> {
        self.items.lock().unwrap().clone()
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut QueueItemRow)) -> Result<(), StoreError> {
        let mut items = self.items.lock().unwrap();
        let item = items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("queue item {id}")))?;
        f(item);
        Ok(())
    }
}

#[async_trait]
impl QueueStore for MemoryQueue {
    async fn enqueue(&self, queue_name: &str, payload: &Value) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.items.lock().unwrap().push(QueueItemRow {
            id,
            queue_name: queue_name.to_string(),
            status: QueueStatus::Pending.as_str().to_string(),
            payload: payload.clone(),
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            failed_at: None,
            result: None,
            error: None,
        });
        Ok(id)
    }

    async fn claim_next(&self, queue_name: &str) -> Result<Option<QueueItemRow>, StoreError> {
        let mut items = self.items.lock().unwrap();
        let next = items
            .iter_mut()
            .filter(|i| i.queue_name == queue_name && QueueStatus::is_claimable(&i.status))
            .min_by_key(|i| i.created_at);
        Ok(next.map(|item| {
            item.status = QueueStatus::Processing.as_str().to_string();
            item.attempts += 1;
            item.started_at = Some(Utc::now());
            self.claims.fetch_add(1, Ordering::SeqCst);
            item.clone()
        }))
    }

    async fn mark_completed(&self, id: Uuid, result: &Value) -> Result<(), StoreError> {
        self.update(id, |item| {
            item.status = QueueStatus::Completed.as_str().to_string();
            item.result = Some(result.clone());
            item.completed_at = Some(Utc::now());
        })
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        self.update(id, |item| {
            item.status = QueueStatus::Failed.as_str().to_string();
            item.error = Some(error.to_string());
            item.failed_at = Some(Utc::now());
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueItemRow>, StoreError> {
        Ok(self.items.lock().unwrap().iter().find(|i| i.id == id).cloned())
    }
}

// ── Recruit records ─────────────────────────────────────────────────────────

#[derive(Default)]
struct Records {
    /// Candidate id to full name.
    candidates: HashMap<Uuid, String>,
    files: HashMap<Uuid, StoredFileRow>,
    resumes: HashMap<Uuid, ResumeRow>,
    chunks: HashMap<Uuid, Vec<ChunkEmbedding>>,
    jobs: HashMap<Uuid, JobRow>,
}

#[derive(Default)]
pub struct MemoryRecruit {
    records: Mutex<Records>,
    /// Candidate names whose registration fails.
    pub reject_candidates: Mutex<Vec<String>>,
}

pub fn job(organization_id: Uuid, title: &str, description: &str, skills: &[&str]) -> JobRow {
    JobRow {
        id: Uuid::new_v4(),
        organization_id,
        title: title.to_string(),
        description: description.to_string(),
        description_preview: None,
        required_skills: skills.iter().map(|s| s.to_string()).collect(),
        min_education: None,
        min_age: None,
        max_age: None,
        embedding: None,
        sorting_state: SortingState::NotStarted.as_str().to_string(),
        cv_sorted_count: 0,
        file_ids: Vec::new(),
        resume_ids: Vec::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

impl MemoryRecruit {
    pub fn insert_job(&self, job: JobRow) -> Uuid {
        let id = job.id;
        self.records.lock().unwrap().jobs.insert(id, job);
        id
    }

    pub fn job(&self, id: Uuid) -> Option<JobRow> {
        self.records.lock().unwrap().jobs.get(&id).cloned()
    }

    pub fn resume(&self, id: Uuid) -> Option<ResumeRow> {
        self.records.lock().unwrap().resumes.get(&id).cloned()
    }

    pub fn chunks(&self, id: Uuid) -> Vec<ChunkEmbedding> {
        self.records
            .lock()
            .unwrap()
            .chunks
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn file(&self, id: Uuid) -> Option<StoredFileRow> {
        self.records.lock().unwrap().files.get(&id).cloned()
    }

    pub fn candidate_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .lock()
            .unwrap()
            .candidates
            .values()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// A résumé already through the pipeline, with the given fields and vectors.
    pub fn seed_completed(&self, job_id: Uuid, fields: &ParsedFields, vectors: Vec<Vec<f32>>) -> Uuid {
        let resume_id = Uuid::new_v4();
        let mut records = self.records.lock().unwrap();
        records.resumes.insert(
            resume_id,
            ResumeRow {
                id: resume_id,
                candidate_id: Uuid::new_v4(),
                job_id,
                file_id: Uuid::new_v4(),
                status: ResumeStatus::Completed.as_str().to_string(),
                extracted_text: None,
                extracted_fields: serde_json::to_value(fields).ok(),
                parsed_json: None,
                overall_score: None,
                score_breakdown: None,
                error_message: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
        records.chunks.insert(
            resume_id,
            vectors
                .into_iter()
                .enumerate()
                .map(|(i, embedding)| ChunkEmbedding {
                    chunk_index: i as i32,
                    content: format!("chunk {i}"),
                    embedding,
                })
                .collect(),
        );
        resume_id
    }

    fn update_resume(&self, id: Uuid, f: impl FnOnce(&mut ResumeRow)) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        let resume = records
            .resumes
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("resume {id}")))?;
        f(resume);
        Ok(())
    }

    fn update_job(&self, id: Uuid, f: impl FnOnce(&mut JobRow)) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        let job = records
            .jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;
        f(job);
        Ok(())
    }
}

fn union_into(target: &mut Vec<Uuid>, added: &[Uuid]) {
    for id in added {
        if !target.contains(id) {
            target.push(*id);
        }
    }
}

#[async_trait]
impl RecruitStore for MemoryRecruit {
    async fn register_resume(&self, new: &NewResume) -> Result<RegisteredResume, StoreError> {
        if self.reject_candidates.lock().unwrap().contains(&new.candidate_name) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        let registered = RegisteredResume {
            candidate_id: Uuid::new_v4(),
            resume_id: Uuid::new_v4(),
            file_id: Uuid::new_v4(),
        };
        let mut records = self.records.lock().unwrap();
        records
            .candidates
            .insert(registered.candidate_id, new.candidate_name.clone());
        records.files.insert(
            registered.file_id,
            StoredFileRow {
                id: registered.file_id,
                storage_key: new.storage_key.clone(),
                bucket: new.bucket.clone(),
                mime_type: new.mime_type.clone(),
                size_bytes: new.size_bytes,
                checksum: new.checksum.clone(),
                uploaded_by: new.uploaded_by,
                metadata: new.metadata.clone(),
                created_at: Utc::now(),
            },
        );
        records.resumes.insert(
            registered.resume_id,
            ResumeRow {
                id: registered.resume_id,
                candidate_id: registered.candidate_id,
                job_id: new.job_id,
                file_id: registered.file_id,
                status: ResumeStatus::Uploaded.as_str().to_string(),
                extracted_text: None,
                extracted_fields: None,
                parsed_json: None,
                overall_score: None,
                score_breakdown: None,
                error_message: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
        Ok(registered)
    }

    async fn merge_job_references(
        &self,
        job_id: Uuid,
        file_ids: &[Uuid],
        resume_ids: &[Uuid],
    ) -> Result<(), StoreError> {
        self.update_job(job_id, |job| {
            union_into(&mut job.file_ids, file_ids);
            union_into(&mut job.resume_ids, resume_ids);
        })
    }

    async fn load_resume_source(
        &self,
        resume_id: Uuid,
    ) -> Result<Option<ResumeSource>, StoreError> {
        let records = self.records.lock().unwrap();
        let Some(resume) = records.resumes.get(&resume_id).cloned() else {
            return Ok(None);
        };
        let file = records
            .files
            .get(&resume.file_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("stored file {}", resume.file_id)))?;
        Ok(Some(ResumeSource { resume, file }))
    }

    async fn mark_resume_embedding(
        &self,
        resume_id: Uuid,
        extracted_text: &str,
        fields: &Value,
    ) -> Result<(), StoreError> {
        self.update_resume(resume_id, |r| {
            r.status = ResumeStatus::Embedding.as_str().to_string();
            r.extracted_text = Some(extracted_text.to_string());
            r.extracted_fields = Some(fields.clone());
            r.parsed_json = Some(fields.clone());
            r.error_message = None;
        })
    }

    async fn complete_resume(
        &self,
        resume_id: Uuid,
        chunks: &[ChunkEmbedding],
    ) -> Result<(), StoreError> {
        self.update_resume(resume_id, |r| {
            r.status = ResumeStatus::Completed.as_str().to_string();
        })?;
        self.records
            .lock()
            .unwrap()
            .chunks
            .insert(resume_id, chunks.to_vec());
        Ok(())
    }

    async fn fail_resume(&self, resume_id: Uuid, message: &str) -> Result<(), StoreError> {
        self.update_resume(resume_id, |r| {
            r.status = ResumeStatus::Failed.as_str().to_string();
            r.error_message = Some(message.to_string());
        })
    }

    async fn load_job(&self, job_id: Uuid) -> Result<Option<JobRow>, StoreError> {
        Ok(self.job(job_id))
    }

    async fn save_job_embedding(
        &self,
        job_id: Uuid,
        embedding: &[f32],
    ) -> Result<(), StoreError> {
        self.update_job(job_id, |job| job.embedding = Some(embedding.to_vec()))
    }

    async fn set_sorting_state(
        &self,
        job_id: Uuid,
        state: SortingState,
        sorted_count: Option<i32>,
    ) -> Result<(), StoreError> {
        self.update_job(job_id, |job| {
            job.sorting_state = state.as_str().to_string();
            if let Some(count) = sorted_count {
                job.cv_sorted_count = count;
            }
        })
    }

    async fn completed_resumes(&self, job_id: Uuid) -> Result<Vec<RankableResume>, StoreError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .resumes
            .values()
            .filter(|r| r.job_id == job_id && r.status == ResumeStatus::Completed.as_str())
            .filter_map(|r| {
                let chunks = records.chunks.get(&r.id).filter(|c| !c.is_empty())?;
                Some(RankableResume {
                    resume_id: r.id,
                    extracted_fields: r.extracted_fields.clone().unwrap_or(Value::Null),
                    chunk_embeddings: chunks.iter().map(|c| c.embedding.clone()).collect(),
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
        self.update_resume(resume_id, |r| {
            r.overall_score = Some(overall_score);
            r.score_breakdown = Some(breakdown.clone());
        })
    }
}

// ── Object storage ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryObjects {
    objects: Mutex<HashMap<String, Bytes>>,
    /// Uploads fail for keys ending with any of these suffixes.
    pub reject_puts: Mutex<Vec<String>>,
}

impl MemoryObjects {
    pub fn insert(&self, key: &str, bytes: impl Into<Bytes>) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    fn bucket(&self) -> &str {
        "test-bucket"
    }

    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<(), StorageError> {
        if self.reject_puts.lock().unwrap().iter().any(|s| key.ends_with(s.as_str())) {
            return Err(StorageError::Status {
                method: "PUT",
                key: key.to_string(),
                status: 503,
                body: "SlowDown".to_string(),
            });
        }
        self.insert(key, body);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::Status {
                method: "GET",
                key: key.to_string(),
                status: 404,
                body: "NoSuchKey".to_string(),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

// ── Embeddings ──────────────────────────────────────────────────────────────

/// Bag-of-words vectors: each word adds 1.0 to a bucket picked by its bytes.
pub struct HashEmbedder {
    pub dimension: usize,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for word in text.split_whitespace() {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            vector[bucket % self.dimension] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model(&self) -> &str {
        "hash-test"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

// ── Vector index ────────────────────────────────────────────────────────────

struct Collection {
    dimension: usize,
    points: HashMap<Uuid, Vec<f32>>,
}

/// Behaves like the remote service: rejects vectors of the wrong length and
/// refuses to create a collection that already exists.
#[derive(Default)]
pub struct MemoryIndex {
    collections: Mutex<HashMap<String, Collection>>,
    /// Upserts to reject before accepting any.
    pub reject_upserts: AtomicUsize,
    pub operations: Mutex<Vec<String>>,
}

impl MemoryIndex {
    pub fn with_collection(name: &str, dimension: usize) -> Self {
        let index = Self::default();
        index.collections.lock().unwrap().insert(
            name.to_string(),
            Collection {
                dimension,
                points: HashMap::new(),
            },
        );
        index
    }

    pub fn dimension(&self, name: &str) -> Option<usize> {
        self.collections.lock().unwrap().get(name).map(|c| c.dimension)
    }

    pub fn point_count(&self, name: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(name)
            .map_or(0, |c| c.points.len())
    }

    fn log(&self, op: String) {
        self.operations.lock().unwrap().push(op);
    }
}

fn missing(operation: &'static str, name: &str) -> VectorError {
    VectorError::Status {
        operation,
        status: 404,
        body: format!("Collection `{name}` doesn't exist"),
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, VectorError> {
        Ok(self.dimension(name).map(|dimension| CollectionInfo {
            dimension: Some(dimension),
        }))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), VectorError> {
        self.log(format!("create {name} {dimension}"));
        let mut collections = self.collections.lock().unwrap();
        if collections.contains_key(name) {
            return Err(VectorError::Status {
                operation: "create collection",
                status: 409,
                body: format!("Collection `{name}` already exists"),
            });
        }
        collections.insert(
            name.to_string(),
            Collection {
                dimension,
                points: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), VectorError> {
        self.log(format!("delete {name}"));
        self.collections.lock().unwrap().remove(name);
        Ok(())
    }

    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<(), VectorError> {
        self.log(format!("upsert {name} {}", points.len()));
        let forced = self
            .reject_upserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let mut collections = self.collections.lock().unwrap();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| missing("upsert points", name))?;
        if forced || points.iter().any(|p| p.vector.len() != collection.dimension) {
            return Err(VectorError::Rejected {
                operation: "upsert points",
                status: 400,
                body: "Wrong input: Vector dimension error".to_string(),
            });
        }
        for point in points {
            collection.points.insert(point.id, point.vector.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        only: &[Uuid],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorError> {
        let collections = self.collections.lock().unwrap();
        let collection = collections.get(name).ok_or_else(|| missing("search", name))?;
        if vector.len() != collection.dimension {
            return Err(VectorError::Rejected {
                operation: "search",
                status: 400,
                body: "Wrong input: Vector dimension error".to_string(),
            });
        }
        let mut hits: Vec<ScoredPoint> = collection
            .points
            .iter()
            .filter(|(id, _)| only.contains(id))
            .map(|(id, v)| ScoredPoint {
                id: *id,
                score: cosine(vector, v),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

// ── AI assistant ────────────────────────────────────────────────────────────

/// Never answers within any reasonable timeout.
pub struct StalledAssistant;

#[async_trait]
impl FieldAssistant for StalledAssistant {
    async fn structure(&self, _text: &str) -> Result<ParsedFields, LlmError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(LlmError::EmptyContent)
    }
}

// ── Wiring ──────────────────────────────────────────────────────────────────

/// Every component wired over the in-memory services.
pub struct Harness {
    pub queue: Arc<MemoryQueue>,
    pub store: Arc<MemoryRecruit>,
    pub objects: Arc<MemoryObjects>,
    pub index: Arc<MemoryIndex>,
    pub embedder: Arc<HashEmbedder>,
}

impl Harness {
    pub fn new(dimension: usize) -> Self {
        Self::with_index(dimension, MemoryIndex::default())
    }

    pub fn with_index(dimension: usize, index: MemoryIndex) -> Self {
        Self {
            queue: Arc::new(MemoryQueue::default()),
            store: Arc::new(MemoryRecruit::default()),
            objects: Arc::new(MemoryObjects::default()),
            index: Arc::new(index),
            embedder: Arc::new(HashEmbedder::new(dimension)),
        }
    }

    pub fn embeddings(&self) -> EmbeddingService {
        EmbeddingService::new(self.embedder.clone())
    }

    pub fn ingestor(&self) -> ArchiveIngestor {
        ArchiveIngestor::new(
            self.store.clone(),
            self.queue.clone(),
            self.objects.clone(),
            PROCESSING_QUEUE.to_string(),
        )
    }

    /// Plain-text extraction only, with the given AI assistant.
    pub fn pipeline(&self, assistant: Option<Arc<dyn FieldAssistant>>) -> ResumePipeline {
        let extractor = DocumentExtractor::new(
            vec![Arc::new(PlainTextStrategy)],
            ExtractionConfig::default(),
        );
        ResumePipeline::new(
            self.store.clone(),
            self.objects.clone(),
            Arc::new(extractor),
            Arc::new(StructuredParser::new(assistant, Duration::from_secs(45))),
            self.embeddings(),
        )
    }

    pub fn ranking(&self) -> RankingEngine {
        RankingEngine::new(self.store.clone(), self.index.clone(), self.embeddings())
    }

    /// Uploads `text` as a plain-text résumé registered against `job_id`.
    pub async fn register_text_resume(&self, job_id: Uuid, name: &str, text: &str) -> Uuid {
        let key = format!("resumes/{name}.txt");
        self.objects.insert(&key, text.as_bytes().to_vec());
        self.store
            .register_resume(&NewResume {
                job_id,
                candidate_name: name.to_string(),
                candidate_source: "test".to_string(),
                storage_key: key,
                bucket: "test-bucket".to_string(),
                mime_type: "text/plain".to_string(),
                size_bytes: text.len() as i64,
                checksum: String::new(),
                uploaded_by: None,
                metadata: Value::Null,
            })
            .await
            .unwrap()
            .resume_id
    }
}
