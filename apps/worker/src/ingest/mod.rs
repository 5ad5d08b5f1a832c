//! One uploaded zip archive to many registered résumés.

pub mod archive;

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ingest::archive::{candidate_name, sanitize_filename, scan_archive, ArchiveEntry};
use crate::models::queue::QueuePayload;
use crate::models::resume::NewResume;
use crate::storage::sigv4::sha256_hex;
use crate::storage::{ObjectStore, StorageError};
use crate::store::{QueueStore, RecruitStore, StoreError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Could not download archive: {0}")]
    Download(#[from] StorageError),

    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("Archive task aborted: {0}")]
    Aborted(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("No entries ingested ({} failed, {} skipped)", .0.failed.len(), .0.skipped)]
    NothingIngested(IngestionReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryFailure {
    pub entry: String,
    pub reason: String,
}

/// Returned as the queue item result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: Vec<EntryFailure>,
    pub resume_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestRequest<'a> {
    pub archive_key: &'a str,
    pub job_id: Uuid,
    pub organization_id: Uuid,
    pub uploaded_by: Option<Uuid>,
}

#[derive(Clone)]
pub struct ArchiveIngestor {
    store: Arc<dyn RecruitStore>,
    queue: Arc<dyn QueueStore>,
    objects: Arc<dyn ObjectStore>,
    processing_queue: String,
}

impl ArchiveIngestor {
    pub fn new(
        store: Arc<dyn RecruitStore>,
        queue: Arc<dyn QueueStore>,
        objects: Arc<dyn ObjectStore>,
        processing_queue: String,
    ) -> Self {
        Self {
            store,
            queue,
            objects,
            processing_queue,
        }
    }

    /// Ingests the archive, then deletes it whatever the outcome.
    pub async fn ingest(&self, request: IngestRequest<'_>) -> Result<IngestionReport, IngestError> {
        let outcome = self.ingest_inner(request).await;
        if let Err(e) = self.objects.delete(request.archive_key).await {
            warn!(archive_key = request.archive_key, "Could not delete source archive: {e}");
        }
        outcome
    }

    async fn ingest_inner(
        &self,
        request: IngestRequest<'_>,
    ) -> Result<IngestionReport, IngestError> {
        let bytes = self.objects.get(request.archive_key).await?;
        let scan = tokio::task::spawn_blocking(move || scan_archive(&bytes))
            .await
            .map_err(|e| IngestError::Aborted(e.to_string()))??;

        let mut report = IngestionReport {
            total: scan.total(),
            skipped: scan.skipped,
            failed: scan.failed,
            ..Default::default()
        };
        let mut file_ids = Vec::new();

        for entry in scan.entries {
            let name = entry.name.clone();
            match self.register_entry(&request, entry).await {
                Ok((file_id, resume_id)) => {
                    file_ids.push(file_id);
                    report.resume_ids.push(resume_id);
                }
                Err(reason) => {
                    warn!(entry = %name, "Entry failed: {reason}");
                    report.failed.push(EntryFailure {
                        entry: name,
                        reason,
                    });
                }
            }
        }
        report.succeeded = report.resume_ids.len();

        if report.succeeded == 0 {
            return Err(IngestError::NothingIngested(report));
        }

        self.store
            .merge_job_references(request.job_id, &file_ids, &report.resume_ids)
            .await?;

        for resume_id in &report.resume_ids {
            let payload = QueuePayload::ProcessResume {
                resume_id: *resume_id,
                job_id: Some(request.job_id),
                organization_id: Some(request.organization_id),
            };
            let value = serde_json::to_value(&payload).unwrap_or_default();
            if let Err(e) = self.queue.enqueue(&self.processing_queue, &value).await {
                warn!(%resume_id, "Could not enqueue résumé processing: {e}");
            }
        }

        info!(
            job_id = %request.job_id,
            total = report.total,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed.len(),
            "Archive ingested"
        );
        Ok(report)
    }

    /// Uploads and registers one entry. Errors are per-entry reasons.
    async fn register_entry(
        &self,
        request: &IngestRequest<'_>,
        entry: ArchiveEntry,
    ) -> Result<(Uuid, Uuid), String> {
        let filename = sanitize_filename(&entry.name);
        let key = format!(
            "organizations/{}/jobs/{}/resumes/{}-{filename}",
            request.organization_id,
            request.job_id,
            Uuid::new_v4()
        );
        let mime_type = entry.kind.mime_type();
        let size_bytes = entry.bytes.len() as i64;
        let checksum = sha256_hex(&entry.bytes);

        self.objects
            .put(&key, entry.bytes, mime_type)
            .await
            .map_err(|e| format!("upload failed: {e}"))?;

        let registered = self
            .store
            .register_resume(&NewResume {
                job_id: request.job_id,
                candidate_name: candidate_name(&entry.name),
                candidate_source: "archive".to_string(),
                storage_key: key.clone(),
                bucket: self.objects.bucket().to_string(),
                mime_type: mime_type.to_string(),
                size_bytes,
                checksum,
                uploaded_by: request.uploaded_by,
                metadata: json!({
                    "originalName": entry.name,
                    "archiveKey": request.archive_key,
                }),
            })
            .await;
        let registered = match registered {
            Ok(registered) => registered,
            Err(e) => {
                // No row points at the object, so nothing would ever clean it up.
                if let Err(delete) = self.objects.delete(&key).await {
                    warn!(%key, "Could not delete orphaned upload: {delete}");
                }
                return Err(format!("registration failed: {e}"));
            }
        };

        Ok((registered.file_id, registered.resume_id))
    }
}
