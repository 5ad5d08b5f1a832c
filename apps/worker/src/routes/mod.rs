pub mod health;
pub mod queue;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/queue/ingest", post(queue::handle_enqueue_ingest))
        .route("/api/v1/queue/process", post(queue::handle_enqueue_process))
        .route("/api/v1/queue/sort", post(queue::handle_enqueue_sort))
        .route("/api/v1/queue/:id", get(queue::handle_get_item))
        .with_state(state)
}
