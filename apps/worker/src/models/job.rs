use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A job opening as written by the UI layer. The worker only reads the
/// profile fields and writes the embedding, sorting and reference columns.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: String,
    pub description_preview: Option<String>,
    pub required_skills: Vec<String>,
    pub min_education: Option<String>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub embedding: Option<Vec<f32>>,
    pub sorting_state: String,
    pub cv_sorted_count: i32,
    pub file_ids: Vec<Uuid>,
    pub resume_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortingState {
    NotStarted,
    Processing,
    Completed,
}

impl SortingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortingState::NotStarted => "NOT_STARTED",
            SortingState::Processing => "PROCESSING",
            SortingState::Completed => "COMPLETED",
        }
    }
}

impl JobRow {
    /// Text the job vector is computed from: title, description and preview.
    pub fn embedding_text(&self) -> String {
        [
            Some(self.title.as_str()),
            Some(self.description.as_str()),
            self.description_preview.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
    }

    pub fn cached_embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref().filter(|v| !v.is_empty())
    }
}
