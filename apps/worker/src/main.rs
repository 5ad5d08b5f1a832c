mod config;
mod db;
mod dispatcher;
mod embedding;
mod errors;
mod extraction;
mod ingest;
mod llm_client;
mod models;
mod parsing;
mod pipeline;
mod ranking;
mod routes;
mod state;
mod storage;
mod store;
#[cfg(test)]
mod testing;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{create_pool, PgQueueStore, PgRecruitStore};
use crate::dispatcher::{Dispatcher, Handlers};
use crate::embedding::openai::OpenAiEmbedder;
use crate::embedding::EmbeddingService;
use crate::extraction::ocr::TesseractOcr;
use crate::extraction::DocumentExtractor;
use crate::ingest::ArchiveIngestor;
use crate::llm_client::LlmClient;
use crate::parsing::{FieldAssistant, LlmFieldAssistant, StructuredParser};
use crate::pipeline::ResumePipeline;
use crate::ranking::{QdrantClient, RankingEngine};
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::S3Client;
use crate::store::{QueueStore, RecruitStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CV worker v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let queue: Arc<dyn QueueStore> = Arc::new(PgQueueStore::new(db.clone()));
    let records: Arc<dyn RecruitStore> = Arc::new(PgRecruitStore::new(db));

    // Object storage; missing credentials fail individual items, not startup
    let objects = Arc::new(S3Client::new(config.storage.clone()));
    if config.storage.bucket.is_none() {
        info!("S3 bucket not configured, archive and résumé items will fail");
    }

    // Extraction chain with OCR fallback
    let extractor = Arc::new(DocumentExtractor::with_ocr(
        Arc::new(TesseractOcr::new()),
        config.extraction,
    ));

    // Initialize LLM client; without a key parsing is heuristic only
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    let assistant: Option<Arc<dyn FieldAssistant>> = if llm.is_configured() {
        info!("LLM client initialized (model: {})", llm_client::MODEL);
        Some(Arc::new(LlmFieldAssistant::new(llm)))
    } else {
        info!("ANTHROPIC_API_KEY not set, AI-assisted parsing disabled");
        None
    };
    let parser = Arc::new(StructuredParser::new(
        assistant,
        Duration::from_secs(config.ai_parse_timeout_secs),
    ));

    let embeddings = EmbeddingService::new(Arc::new(OpenAiEmbedder::new(&config.embedding)));
    info!("Embedding model: {}", config.embedding.model);

    let index = Arc::new(QdrantClient::new(
        &config.qdrant_url,
        config.qdrant_api_key.clone(),
    ));
    info!("Vector index: {}", config.qdrant_url);

    let handlers = Arc::new(Handlers {
        ingestor: ArchiveIngestor::new(
            records.clone(),
            queue.clone(),
            objects.clone(),
            config.worker.queue_name.clone(),
        ),
        pipeline: ResumePipeline::new(
            records.clone(),
            objects,
            extractor,
            parser,
            embeddings.clone(),
        ),
        ranking: RankingEngine::new(records, index, embeddings),
    });

    // Claim loops: résumé work, and a separate listener for sort requests
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_interval = Duration::from_millis(config.worker.poll_interval_ms);
    let processing = tokio::spawn(
        Dispatcher::new(
            queue.clone(),
            handlers.clone(),
            config.worker.queue_name.clone(),
            config.worker.max_in_flight,
            poll_interval,
        )
        .run(shutdown_rx.clone()),
    );
    let sorting = tokio::spawn(
        Dispatcher::new(
            queue.clone(),
            handlers,
            config.worker.sort_queue_name.clone(),
            1,
            poll_interval,
        )
        .run(shutdown_rx),
    );

    // Build app state
    let state = AppState {
        queue,
        worker: config.worker.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining queue workers");
    // Err only when both loops already exited
    let _ = shutdown_tx.send(true);
    processing.await?;
    sorting.await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Could not listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
    }
}
