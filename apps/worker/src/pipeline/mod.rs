//! Single-résumé processing: download, extract, parse, embed, persist.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::embedding::chunker::chunk_default;
use crate::embedding::{EmbeddingError, EmbeddingService};
use crate::extraction::{DocumentExtractor, TextSource};
use crate::ingest::archive::base_name;
use crate::models::resume::ChunkEmbedding;
use crate::parsing::StructuredParser;
use crate::storage::{ObjectStore, StorageError};
use crate::store::{RecruitStore, StoreError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Résumé {0} not found")]
    ResumeNotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("No embeddings produced for résumé {0}")]
    NoEmbeddings(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeOutcome {
    pub resume_id: Uuid,
    pub text_source: TextSource,
    pub text_chars: usize,
    pub skills: usize,
    pub chunks: usize,
}

#[derive(Clone)]
pub struct ResumePipeline {
    store: Arc<dyn RecruitStore>,
    objects: Arc<dyn ObjectStore>,
    extractor: Arc<DocumentExtractor>,
    parser: Arc<StructuredParser>,
    embeddings: EmbeddingService,
}

impl ResumePipeline {
    pub fn new(
        store: Arc<dyn RecruitStore>,
        objects: Arc<dyn ObjectStore>,
        extractor: Arc<DocumentExtractor>,
        parser: Arc<StructuredParser>,
        embeddings: EmbeddingService,
    ) -> Self {
        Self {
            store,
            objects,
            extractor,
            parser,
            embeddings,
        }
    }

    /// Runs every stage in order. On failure the résumé is marked `failed`
    /// with the error message before the error is returned.
    #[instrument(skip(self), fields(op = "process_resume"))]
    pub async fn process_resume(&self, resume_id: Uuid) -> Result<ResumeOutcome, PipelineError> {
        match self.run(resume_id).await {
            Ok(outcome) => Ok(outcome),
            Err(PipelineError::ResumeNotFound(id)) => Err(PipelineError::ResumeNotFound(id)),
            Err(e) => {
                if let Err(mark) = self.store.fail_resume(resume_id, &e.to_string()).await {
                    warn!(%resume_id, "Could not mark résumé failed: {mark}");
                }
                Err(e)
            }
        }
    }

    async fn run(&self, resume_id: Uuid) -> Result<ResumeOutcome, PipelineError> {
        let source = self
            .store
            .load_resume_source(resume_id)
            .await?
            .ok_or(PipelineError::ResumeNotFound(resume_id))?;
        let job_id = source.resume.job_id;
        let file = source.file;

        let bytes = self.objects.get(&file.storage_key).await?;
        let extracted = self
            .extractor
            .extract(bytes, &file.mime_type, base_name(&file.storage_key))
            .await;

        let fields = self.parser.parse(&extracted.text).await;
        let fields_json = serde_json::to_value(&fields).unwrap_or_default();
        self.store
            .mark_resume_embedding(resume_id, &extracted.text, &fields_json)
            .await?;

        let chunks = chunk_default(&extracted.text);
        let vectors = self.embeddings.embed_chunks(&chunks).await?;
        if vectors.is_empty() {
            return Err(PipelineError::NoEmbeddings(resume_id));
        }
        let chunk_rows: Vec<ChunkEmbedding> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (content, embedding))| ChunkEmbedding {
                chunk_index: i as i32,
                content,
                embedding,
            })
            .collect();
        self.store.complete_resume(resume_id, &chunk_rows).await?;

        info!(
            %resume_id,
            %job_id,
            source = ?extracted.source,
            chunks = chunk_rows.len(),
            "Résumé processed"
        );
        Ok(ResumeOutcome {
            resume_id,
            text_source: extracted.source,
            text_chars: extracted.text.chars().count(),
            skills: fields.skills.len(),
            chunks: chunk_rows.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{job, Harness, StalledAssistant};

    const CV: &str = "Jane Doe\njane@example.com\nSkills: Rust, Docker, PostgreSQL\n\
                      8+ years of backend work\nAcme Corp, Senior Engineer 2019 - Present";

    #[tokio::test(start_paused = true)]
    async fn test_ai_timeout_still_completes_with_baseline_fields() {
        let h = Harness::new(16);
        let job_id = h.store.insert_job(job(Uuid::new_v4(), "Backend", "Rust", &["rust"]));
        let resume_id = h.register_text_resume(job_id, "jane", CV).await;

        let outcome = h
            .pipeline(Some(Arc::new(StalledAssistant)))
            .process_resume(resume_id)
            .await
            .unwrap();

        assert_eq!(outcome.text_source, TextSource::Text);
        assert_eq!(outcome.chunks, 1);
        let resume = h.store.resume(resume_id).unwrap();
        assert_eq!(resume.status, "completed");
        assert!(resume.extracted_text.unwrap().contains("Jane Doe"));
        let fields = resume.extracted_fields.unwrap();
        assert_eq!(fields["name"], "Jane Doe");
        assert_eq!(fields["email"], "jane@example.com");
        assert_eq!(resume.parsed_json.unwrap(), fields);

        let chunks = h.store.chunks(resume_id);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].embedding.len(), 16);
    }

    #[tokio::test]
    async fn test_long_text_is_embedded_in_one_batch_of_windows() {
        let h = Harness::new(16);
        let job_id = h.store.insert_job(job(Uuid::new_v4(), "Backend", "Rust", &[]));
        let text = (0..2500).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let resume_id = h.register_text_resume(job_id, "long", &text).await;

        let outcome = h.pipeline(None).process_resume(resume_id).await.unwrap();

        // ceil((2500 - 120) / (1200 - 120)) windows
        assert_eq!(outcome.chunks, 3);
        assert_eq!(h.embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        let indexes: Vec<i32> = h.store.chunks(resume_id).iter().map(|c| c.chunk_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_empty_document_marks_resume_failed() {
        let h = Harness::new(16);
        let job_id = h.store.insert_job(job(Uuid::new_v4(), "Backend", "Rust", &[]));
        let resume_id = h.register_text_resume(job_id, "blank", "   \n  ").await;

        let err = h.pipeline(None).process_resume(resume_id).await.unwrap_err();

        assert!(matches!(err, PipelineError::NoEmbeddings(id) if id == resume_id));
        let resume = h.store.resume(resume_id).unwrap();
        assert_eq!(resume.status, "failed");
        assert!(resume.error_message.unwrap().contains("No embeddings"));
        assert!(h.store.chunks(resume_id).is_empty());
    }

    #[tokio::test]
    async fn test_missing_object_marks_resume_failed() {
        let h = Harness::new(16);
        let job_id = h.store.insert_job(job(Uuid::new_v4(), "Backend", "Rust", &[]));
        let resume_id = h.register_text_resume(job_id, "gone", CV).await;
        h.objects.delete("resumes/gone.txt").await.unwrap();

        let err = h.pipeline(None).process_resume(resume_id).await.unwrap_err();

        assert!(matches!(err, PipelineError::Storage(_)));
        assert_eq!(h.store.resume(resume_id).unwrap().status, "failed");
    }

    #[tokio::test]
    async fn test_unknown_resume_is_not_found() {
        let h = Harness::new(16);
        let missing = Uuid::new_v4();
        let err = h.pipeline(None).process_resume(missing).await.unwrap_err();
        assert!(matches!(err, PipelineError::ResumeNotFound(id) if id == missing));
    }
}
