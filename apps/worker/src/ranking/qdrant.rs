//! Vector index seam and its Qdrant REST implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

const BODY_SNAPSHOT_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum VectorError {
    /// The service refused the request shape (typically a dimension conflict).
    #[error("Vector service rejected {operation} ({status}): {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("Vector service {operation} failed ({status}): {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed vector service response: {0}")]
    Malformed(String),
}

impl VectorError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, VectorError::Rejected { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    /// `None` when the schema could not be read reliably.
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// `Ok(None)` when the collection does not exist.
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, VectorError>;

    /// Cosine-distance collection of `dimension`-length vectors.
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), VectorError>;

    /// Deleting a missing collection is not an error.
    async fn delete_collection(&self, name: &str) -> Result<(), VectorError>;

    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<(), VectorError>;

    /// Nearest neighbours among the points whose ids are in `only`.
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        only: &[Uuid],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorError>;
}

pub struct QdrantClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: Value,
    score: f32,
}

impl QdrantClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => req.header("api-key", key),
            None => req,
        }
    }

    async fn send(
        &self,
        req: RequestBuilder,
        operation: &'static str,
    ) -> Result<reqwest::Response, VectorError> {
        check(req.send().await?, operation).await
    }
}

/// Passes successful responses through; 400 and 422 become `Rejected`.
async fn check(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, VectorError> {
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
    warn!(operation, status = status.as_u16(), body = %body, "Vector service error");
    let status_code = status.as_u16();
    Err(match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => VectorError::Rejected {
            operation,
            status: status_code,
            body,
        },
        _ => VectorError::Status {
            operation,
            status: status_code,
            body,
        },
    })
}

/// Reads the single unnamed vector size; named-vector or unexpected layouts
/// report `None`.
fn dimension_from_info(info: &Value) -> Option<usize> {
    info.pointer("/result/config/params/vectors/size")
        .and_then(Value::as_u64)
        .map(|size| size as usize)
}

#[async_trait]
impl VectorIndex for QdrantClient {
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, VectorError> {
        let response = self
            .request(Method::GET, &format!("/collections/{name}"))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check(response, "get collection").await?;
        let info: Value = response
            .json()
            .await
            .map_err(|e| VectorError::Malformed(e.to_string()))?;
        Ok(Some(CollectionInfo {
            dimension: dimension_from_info(&info),
        }))
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), VectorError> {
        let body = json!({"vectors": {"size": dimension, "distance": "Cosine"}});
        self.send(
            self.request(Method::PUT, &format!("/collections/{name}"))
                .json(&body),
            "create collection",
        )
        .await?;
        debug!("Created collection {name} ({dimension} dims)");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), VectorError> {
        let response = self
            .request(Method::DELETE, &format!("/collections/{name}"))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response, "delete collection").await?;
        debug!("Deleted collection {name}");
        Ok(())
    }

    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<(), VectorError> {
        let points: Vec<Value> = points
            .iter()
            .map(|p| json!({"id": p.id, "vector": p.vector, "payload": p.payload}))
            .collect();
        self.send(
            self.request(
                Method::PUT,
                &format!("/collections/{name}/points?wait=true"),
            )
            .json(&json!({ "points": points })),
            "upsert points",
        )
        .await?;
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        only: &[Uuid],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, VectorError> {
        let body = json!({
            "vector": vector,
            "limit": limit,
            "filter": {"must": [{"has_id": only}]},
            "with_payload": false,
        });
        let response = self
            .send(
                self.request(Method::POST, &format!("/collections/{name}/points/search"))
                    .json(&body),
                "search",
            )
            .await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| VectorError::Malformed(e.to_string()))?;

        parsed
            .result
            .into_iter()
            .map(|hit| {
                let id = hit
                    .id
                    .as_str()
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| VectorError::Malformed(format!("unexpected point id {}", hit.id)))?;
                Ok(ScoredPoint {
                    id,
                    score: hit.score,
                })
            })
            .collect()
    }
}
