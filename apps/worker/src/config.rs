use std::str::FromStr;

use anyhow::{Context, Result};

/// Worker configuration loaded from environment variables.
///
/// Only `DATABASE_URL` is required at startup. Storage, embedding and AI
/// credentials are optional: a missing credential fails the individual queue
/// item that needs it instead of the whole process.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub storage: StorageConfig,
    pub anthropic_api_key: Option<String>,
    pub ai_parse_timeout_secs: u64,
    pub embedding: EmbeddingConfig,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub worker: WorkerConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub presign_expires_secs: u64,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum queue items processed concurrently by this process.
    pub max_in_flight: usize,
    /// Sleep between polls when a queue is empty.
    pub poll_interval_ms: u64,
    pub queue_name: String,
    pub sort_queue_name: String,
}

/// Thresholds used to decide that extracted text is unusable and OCR should run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionConfig {
    pub min_chars: usize,
    pub max_symbol_ratio: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_chars: 200,
            max_symbol_ratio: 0.35,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            poll_interval_ms: 500,
            queue_name: "cv-processing".to_string(),
            sort_queue_name: "cv-sorting".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let worker_defaults = WorkerConfig::default();
        let extraction_defaults = ExtractionConfig::default();

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            storage: StorageConfig {
                endpoint: optional_env("S3_ENDPOINT"),
                bucket: optional_env("S3_BUCKET"),
                region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key_id: optional_env("AWS_ACCESS_KEY_ID"),
                secret_access_key: optional_env("AWS_SECRET_ACCESS_KEY"),
                presign_expires_secs: parse_env("S3_PRESIGN_EXPIRES_SECS", 900)?,
            },
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            ai_parse_timeout_secs: parse_env("AI_PARSE_TIMEOUT_SECS", 45)?,
            embedding: EmbeddingConfig {
                api_url: std::env::var("EMBEDDING_API_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                model: std::env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
                api_key: optional_env("EMBEDDING_API_KEY"),
            },
            qdrant_url: std::env::var("QDRANT_URL")
                .unwrap_or_else(|_| "http://localhost:6333".to_string()),
            qdrant_api_key: optional_env("QDRANT_API_KEY"),
            worker: WorkerConfig {
                max_in_flight: parse_env("WORKER_MAX_IN_FLIGHT", worker_defaults.max_in_flight)?
                    .max(1),
                poll_interval_ms: parse_env(
                    "WORKER_POLL_INTERVAL_MS",
                    worker_defaults.poll_interval_ms,
                )?,
                queue_name: std::env::var("WORKER_QUEUE").unwrap_or(worker_defaults.queue_name),
                sort_queue_name: std::env::var("SORT_QUEUE")
                    .unwrap_or(worker_defaults.sort_queue_name),
            },
            extraction: ExtractionConfig {
                min_chars: parse_env("EXTRACT_MIN_CHARS", extraction_defaults.min_chars)?,
                max_symbol_ratio: parse_env(
                    "EXTRACT_MAX_SYMBOL_RATIO",
                    extraction_defaults.max_symbol_ratio,
                )?,
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Treats unset and blank variables the same way.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}
