use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::{Client, Url};
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::storage::sigv4::{presign_url, Credentials, PresignRequest};
use crate::storage::{ObjectStore, StorageError, MAX_OBJECT_BYTES};

/// How much of an error response body is kept for diagnostics.
const BODY_SNAPSHOT_CHARS: usize = 512;

/// S3-compatible client (AWS, MinIO) using path-style addressing and
/// presigned URLs for every request.
#[derive(Clone)]
pub struct S3Client {
    http: Client,
    config: StorageConfig,
    bucket: String,
}

struct Endpoint {
    scheme: String,
    host: String,
}

impl S3Client {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            bucket: config.bucket.clone().unwrap_or_default(),
            config,
        }
    }

    /// A presigned URL for uploading `key`.
    pub fn presigned_put_url(&self, key: &str) -> Result<String, StorageError> {
        self.presign("PUT", key)
    }

    /// A presigned URL for downloading `key`.
    pub fn presigned_get_url(&self, key: &str) -> Result<String, StorageError> {
        self.presign("GET", key)
    }

    /// A presigned URL for deleting `key`.
    pub fn presigned_delete_url(&self, key: &str) -> Result<String, StorageError> {
        self.presign("DELETE", key)
    }

    fn presign(&self, method: &str, key: &str) -> Result<String, StorageError> {
        let (access_key_id, secret_access_key) = match (
            self.config.access_key_id.as_deref(),
            self.config.secret_access_key.as_deref(),
        ) {
            (Some(id), Some(secret)) => (id, secret),
            _ => {
                return Err(StorageError::NotConfigured(
                    "AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY are not set".to_string(),
                ))
            }
        };
        if self.bucket.is_empty() {
            return Err(StorageError::NotConfigured("S3_BUCKET is not set".to_string()));
        }
        let endpoint = self.endpoint()?;
        let path = format!("/{}/{}", self.bucket, key.trim_start_matches('/'));

        Ok(presign_url(
            &Credentials {
                access_key_id,
                secret_access_key,
            },
            &PresignRequest {
                method,
                scheme: &endpoint.scheme,
                host: &endpoint.host,
                path: &path,
                region: &self.config.region,
                service: "s3",
                expires_secs: self.config.presign_expires_secs,
                timestamp: Utc::now(),
            },
        ))
    }

    fn endpoint(&self) -> Result<Endpoint, StorageError> {
        let raw = self
            .config
            .endpoint
            .as_deref()
            .ok_or_else(|| StorageError::NotConfigured("S3_ENDPOINT is not set".to_string()))?;
        let url = Url::parse(raw).map_err(|_| StorageError::InvalidEndpoint(raw.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| StorageError::InvalidEndpoint(raw.to_string()))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Endpoint {
            scheme: url.scheme().to_string(),
            host,
        })
    }
}

async fn check_status(
    response: reqwest::Response,
    method: &'static str,
    key: &str,
) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(BODY_SNAPSHOT_CHARS)
        .collect();
    warn!(
        method,
        key,
        status = status.as_u16(),
        body = %body,
        "Object storage request rejected"
    );
    Err(StorageError::Status {
        method,
        key: key.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ObjectStore for S3Client {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError> {
        let size = body.len() as u64;
        if size > MAX_OBJECT_BYTES {
            return Err(StorageError::TooLarge {
                size,
                limit: MAX_OBJECT_BYTES,
            });
        }
        let url = self.presigned_put_url(key)?;
        let response = self
            .http
            .put(url)
            .header("content-type", content_type)
            .body(body)
            .send()
            .await?;
        check_status(response, "PUT", key).await?;
        debug!("Uploaded {size} bytes to s3://{}/{key}", self.bucket);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let url = self.presigned_get_url(key)?;
        let response = self.http.get(url).send().await?;
        let response = check_status(response, "GET", key).await?;
        Ok(response.bytes().await?)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let url = self.presigned_delete_url(key)?;
        let response = self.http.delete(url).send().await?;
        check_status(response, "DELETE", key).await?;
        debug!("Deleted s3://{}/{key}", self.bucket);
        Ok(())
    }
}
