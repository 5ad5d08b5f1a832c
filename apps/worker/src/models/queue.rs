use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueueItemRow {
    pub id: Uuid,
    pub queue_name: String,
    pub status: String,
    pub payload: Value,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    /// Legacy spelling of `Pending` written by older producers. Claimable.
    Queued,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    /// Statuses a claim may pick up.
    pub const CLAIMABLE: [QueueStatus; 2] = [QueueStatus::Pending, QueueStatus::Queued];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Queued => "queued",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn is_claimable(status: &str) -> bool {
        Self::CLAIMABLE.iter().any(|s| s.as_str() == status)
    }
}

/// Work carried by a queue item, tagged by `kind` in the stored JSON.
///
/// Correlation fields are optional at the wire level so that an incomplete
/// producer payload still decodes and can be failed with a precise message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueuePayload {
    IngestArchive {
        archive_key: String,
        job_id: Option<Uuid>,
        organization_id: Option<Uuid>,
        uploaded_by: Option<Uuid>,
    },
    ProcessResume {
        resume_id: Uuid,
        job_id: Option<Uuid>,
        organization_id: Option<Uuid>,
    },
    SortJob {
        job_id: Option<Uuid>,
        organization_id: Option<Uuid>,
        top_n: Option<u32>,
    },
}

impl QueuePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            QueuePayload::IngestArchive { .. } => "ingest_archive",
            QueuePayload::ProcessResume { .. } => "process_resume",
            QueuePayload::SortJob { .. } => "sort_job",
        }
    }

    /// `(job_id, organization_id)`, or the name of the first missing field.
    pub fn correlation(&self) -> Result<(Uuid, Uuid), &'static str> {
        let (job_id, organization_id) = match self {
            QueuePayload::IngestArchive {
                job_id,
                organization_id,
                ..
            }
            | QueuePayload::ProcessResume {
                job_id,
                organization_id,
                ..
            }
            | QueuePayload::SortJob {
                job_id,
                organization_id,
                ..
            } => (job_id, organization_id),
        };
        match (job_id, organization_id) {
            (None, _) => Err("job_id"),
            (_, None) => Err("organization_id"),
            (Some(job_id), Some(organization_id)) => Ok((*job_id, *organization_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_is_tagged_by_kind() {
        let payload = QueuePayload::SortJob {
            job_id: Some(Uuid::nil()),
            organization_id: Some(Uuid::nil()),
            top_n: Some(10),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "sort_job");
        assert_eq!(value["top_n"], 10);
    }

    #[test]
    fn test_payload_without_org_reports_missing_field() {
        let value = json!({
            "kind": "process_resume",
            "resume_id": Uuid::new_v4(),
            "job_id": Uuid::new_v4()
        });
        let payload: QueuePayload = serde_json::from_value(value).unwrap();
        assert_eq!(payload.correlation(), Err("organization_id"));
    }

    #[test]
    fn test_unknown_kind_does_not_decode() {
        let value = json!({"kind": "resize_image", "job_id": Uuid::new_v4()});
        assert!(serde_json::from_value::<QueuePayload>(value).is_err());
    }

    #[test]
    fn test_legacy_queued_status_is_claimable() {
        assert!(QueueStatus::is_claimable("pending"));
        assert!(QueueStatus::is_claimable("queued"));
        assert!(!QueueStatus::is_claimable("processing"));
        assert!(!QueueStatus::is_claimable("failed"));
    }
}
