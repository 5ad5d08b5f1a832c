use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoredFileRow {
    pub id: Uuid,
    pub storage_key: String,
    pub bucket: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub uploaded_by: Option<Uuid>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub job_id: Uuid,
    pub file_id: Uuid,
    pub status: String,
    pub extracted_text: Option<String>,
    pub extracted_fields: Option<Value>,
    pub parsed_json: Option<Value>,
    pub overall_score: Option<f64>,
    pub score_breakdown: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumeStatus {
    Uploaded,
    Embedding,
    Completed,
    Failed,
}

impl ResumeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeStatus::Uploaded => "uploaded",
            ResumeStatus::Embedding => "embedding",
            ResumeStatus::Completed => "completed",
            ResumeStatus::Failed => "failed",
        }
    }
}

/// One windowed slice of résumé text and its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkEmbedding {
    pub chunk_index: i32,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Everything needed to build a registered résumé inside one transaction.
#[derive(Debug, Clone)]
pub struct NewResume {
    pub job_id: Uuid,
    pub candidate_name: String,
    pub candidate_source: String,
    pub storage_key: String,
    pub bucket: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub uploaded_by: Option<Uuid>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredResume {
    pub candidate_id: Uuid,
    pub resume_id: Uuid,
    pub file_id: Uuid,
}

/// A résumé joined with the stored file it was registered from.
#[derive(Debug, Clone)]
pub struct ResumeSource {
    pub resume: ResumeRow,
    pub file: StoredFileRow,
}

/// A completed résumé with what the ranking engine needs.
#[derive(Debug, Clone)]
pub struct RankableResume {
    pub resume_id: Uuid,
    pub extracted_fields: Value,
    pub chunk_embeddings: Vec<Vec<f32>>,
}
