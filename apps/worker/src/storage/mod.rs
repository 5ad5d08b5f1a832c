//! Object storage: a small trait over signed PUT/GET/DELETE and the
//! S3-compatible implementation used in production.

pub mod s3;
pub mod sigv4;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use s3::S3Client;

/// Largest single object the worker will upload or accept from an archive.
pub const MAX_OBJECT_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object storage is not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid storage endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("Object is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("{method} {key} returned status {status}: {body}")]
    Status {
        method: &'static str,
        key: String,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket objects are written to.
    fn bucket(&self) -> &str;

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
