use std::sync::Arc;

use crate::config::WorkerConfig;
use crate::store::QueueStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn QueueStore>,
    /// Queue names new items are written to.
    pub worker: WorkerConfig,
}
