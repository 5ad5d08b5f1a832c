use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::queue::{QueueItemRow, QueuePayload, QueueStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestBody {
    pub archive_key: String,
    pub job_id: Uuid,
    pub organization_id: Uuid,
    pub uploaded_by: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessBody {
    pub resume_id: Uuid,
    pub job_id: Uuid,
    pub organization_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortBody {
    pub job_id: Uuid,
    pub organization_id: Uuid,
    pub top_n: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueuedResponse {
    pub id: Uuid,
    pub queue_name: String,
    pub status: QueueStatus,
}

/// What a polling client sees of a queue item.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemView {
    pub id: Uuid,
    pub queue_name: String,
    pub status: String,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl From<QueueItemRow> for QueueItemView {
    fn from(row: QueueItemRow) -> Self {
        Self {
            id: row.id,
            queue_name: row.queue_name,
            status: row.status,
            attempts: row.attempts,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            failed_at: row.failed_at,
            result: row.result,
            error: row.error,
        }
    }
}

async fn enqueue(
    state: &AppState,
    queue_name: &str,
    payload: QueuePayload,
) -> Result<(StatusCode, Json<EnqueuedResponse>), AppError> {
    let kind = payload.kind();
    let value = serde_json::to_value(&payload)
        .map_err(|e| AppError::Validation(format!("Unencodable payload: {e}")))?;
    let id = state.queue.enqueue(queue_name, &value).await?;
    info!(%id, queue = queue_name, kind, "Enqueued");
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            id,
            queue_name: queue_name.to_string(),
            status: QueueStatus::Pending,
        }),
    ))
}

/// POST /api/v1/queue/ingest
pub async fn handle_enqueue_ingest(
    State(state): State<AppState>,
    Json(body): Json<IngestBody>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), AppError> {
    let archive_key = body.archive_key.trim();
    if archive_key.is_empty() {
        return Err(AppError::Validation("archiveKey must not be empty".to_string()));
    }
    let payload = QueuePayload::IngestArchive {
        archive_key: archive_key.to_string(),
        job_id: Some(body.job_id),
        organization_id: Some(body.organization_id),
        uploaded_by: body.uploaded_by,
    };
    enqueue(&state, &state.worker.queue_name, payload).await
}

/// POST /api/v1/queue/process
pub async fn handle_enqueue_process(
    State(state): State<AppState>,
    Json(body): Json<ProcessBody>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), AppError> {
    let payload = QueuePayload::ProcessResume {
        resume_id: body.resume_id,
        job_id: Some(body.job_id),
        organization_id: Some(body.organization_id),
    };
    enqueue(&state, &state.worker.queue_name, payload).await
}

/// POST /api/v1/queue/sort
pub async fn handle_enqueue_sort(
    State(state): State<AppState>,
    Json(body): Json<SortBody>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), AppError> {
    if body.top_n == Some(0) {
        return Err(AppError::Validation("topN must be at least 1".to_string()));
    }
    let payload = QueuePayload::SortJob {
        job_id: Some(body.job_id),
        organization_id: Some(body.organization_id),
        top_n: body.top_n,
    };
    enqueue(&state, &state.worker.sort_queue_name, payload).await
}

/// GET /api/v1/queue/:id
pub async fn handle_get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueItemView>, AppError> {
    let item = state
        .queue
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Queue item {id} not found")))?;
    Ok(Json(item.into()))
}
