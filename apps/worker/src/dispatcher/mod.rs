//! Claims queue items and routes them to their handler.
//!
//! Each [`Dispatcher`] polls one queue. Claims are atomic in the store, so any
//! number of dispatchers (in this process or others) can share a queue. A
//! semaphore bounds the items in flight; when it is exhausted the loop stops
//! claiming until a permit frees up.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, info_span, warn, Instrument};

use crate::ingest::{ArchiveIngestor, IngestError, IngestRequest};
use crate::models::queue::{QueueItemRow, QueuePayload};
use crate::pipeline::{PipelineError, ResumePipeline};
use crate::ranking::{RankingEngine, RankingError};
use crate::store::{QueueStore, StoreError};

/// Upper bound on per-process concurrency, whatever the configuration says.
const MAX_PERMITS: usize = 1024;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Undecodable payload: {0}")]
    BadPayload(String),

    #[error("Payload is missing required field '{0}'")]
    MissingCorrelation(&'static str),

    #[error("Could not encode result: {0}")]
    Result(#[from] serde_json::Error),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Ranking(#[from] RankingError),
}

/// The three routed operations, shared by every dispatcher in the process.
pub struct Handlers {
    pub ingestor: ArchiveIngestor,
    pub pipeline: ResumePipeline,
    pub ranking: RankingEngine,
}

impl Handlers {
    /// Decodes and routes one payload. Payloads without a job and
    /// organization id fail before any handler runs.
    pub async fn handle(&self, payload: &Value) -> Result<Value, DispatchError> {
        let payload: QueuePayload = serde_json::from_value(payload.clone())
            .map_err(|e| DispatchError::BadPayload(e.to_string()))?;
        let (job_id, organization_id) = payload
            .correlation()
            .map_err(DispatchError::MissingCorrelation)?;
        info!(kind = payload.kind(), %job_id, "Dispatching");

        let result = match payload {
            QueuePayload::IngestArchive {
                archive_key,
                uploaded_by,
                ..
            } => {
                let report = self
                    .ingestor
                    .ingest(IngestRequest {
                        archive_key: &archive_key,
                        job_id,
                        organization_id,
                        uploaded_by,
                    })
                    .await?;
                serde_json::to_value(report)?
            }
            QueuePayload::ProcessResume { resume_id, .. } => {
                serde_json::to_value(self.pipeline.process_resume(resume_id).await?)?
            }
            QueuePayload::SortJob { top_n, .. } => {
                serde_json::to_value(self.ranking.run_sort(job_id, top_n).await?)?
            }
        };
        Ok(result)
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn QueueStore>,
    handlers: Arc<Handlers>,
    queue_name: String,
    poll_interval: Duration,
    max_in_flight: usize,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        handlers: Arc<Handlers>,
        queue_name: impl Into<String>,
        max_in_flight: usize,
        poll_interval: Duration,
    ) -> Self {
        let max_in_flight = max_in_flight.clamp(1, MAX_PERMITS);
        Self {
            queue,
            handlers,
            queue_name: queue_name.into(),
            poll_interval,
            max_in_flight,
            permits: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    /// Claims and processes items until `shutdown` flips (or its sender is
    /// dropped), then waits for in-flight items to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            queue = %self.queue_name,
            max_in_flight = self.max_in_flight,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Dispatcher started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            // At capacity the loop parks here instead of claiming.
            let permit = tokio::select! {
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            match self.queue.claim_next(&self.queue_name).await {
                Ok(Some(item)) => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        this.process(item).await;
                    });
                    // Keep draining without sleeping while there is work
                    continue;
                }
                Ok(None) => {}
                Err(StoreError::Unavailable(e)) => {
                    warn!(queue = %self.queue_name, "Store unavailable, backing off: {e}");
                }
                Err(e) => {
                    error!(queue = %self.queue_name, "Claim failed: {e}");
                }
            }
            drop(permit);

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(queue = %self.queue_name, "Dispatcher stopping, waiting for in-flight items");
        // Every permit back means every spawned item has finished.
        let _ = self.permits.acquire_many(self.max_in_flight as u32).await;
        info!(queue = %self.queue_name, "Dispatcher stopped");
    }

    /// Runs one claimed item and records its terminal status.
    pub async fn process(&self, item: QueueItemRow) {
        let span = info_span!(
            "queue_item",
            queue_item_id = %item.id,
            queue = %item.queue_name,
            attempt = item.attempts
        );

        async move {
            match self.handlers.handle(&item.payload).await {
                Ok(result) => match self.queue.mark_completed(item.id, &result).await {
                    Ok(()) => info!("Queue item completed"),
                    Err(e) => error!("Could not mark queue item completed: {e}"),
                },
                Err(e) => {
                    warn!("Queue item failed: {e}");
                    if let Err(mark) = self.queue.mark_failed(item.id, &e.to_string()).await {
                        error!("Could not mark queue item failed: {mark}");
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}
