//! Text and chunk lists to fixed-length vectors.

pub mod chunker;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

pub use openai::OpenAiEmbedder;

/// Longest input, in words, sent for a single-text embedding.
pub const MAX_EMBED_WORDS: usize = 1200;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding provider is not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed embedding response: {0}")]
    Malformed(String),

    #[error("Expected {expected} embeddings, got {got}")]
    CountMismatch { expected: usize, got: usize },
}

/// A remote or local embedding model. Output is in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[derive(Clone)]
pub struct EmbeddingService {
    provider: Arc<dyn Embedder>,
}

fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn Embedder>) -> Self {
        Self { provider }
    }

    /// Empty or whitespace-only text yields an empty vector without a call.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let input = [truncate_words(text, MAX_EMBED_WORDS)];
        let mut vectors = self.provider.embed(&input).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            got: 0,
        })
    }

    /// One vector per chunk, in chunk order. No chunks, or a provider that is
    /// not configured, yields an empty list.
    pub async fn embed_chunks(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        match self.provider.embed(chunks).await {
            Err(EmbeddingError::NotConfigured(reason)) => {
                warn!(model = self.provider.model(), "Embedding provider unavailable: {reason}");
                Ok(Vec::new())
            }
            other => other,
        }
    }
}
