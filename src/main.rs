//! Triage assistant
//!
//! Chat backend that interviews a patient about their symptoms, tracks
//! urgency, and closes the interview with diagnostic hypotheses.

mod api;
mod classifier;
mod config;
mod db;
mod hypothesis;
mod lexicon;
mod llm;
mod runtime;
mod state_machine;
mod urgency;

use api::{create_router, AppState};
use config::ServerConfig;
use db::Database;
use hypothesis::{LlmHypothesisGenerator, UnavailableGenerator};
use llm::{build_service, LlmConfig};
use runtime::{ConversationStore, DatabaseStore, HypothesisGenerator, RuntimeManager};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triage_assistant=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = ServerConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let store: Arc<dyn ConversationStore> =
        Arc::new(DatabaseStore::new(Database::open(&config.db_path)?));

    // Reasoning service; without one the interview still runs and
    // analysis reports itself unavailable
    let generator: Arc<dyn HypothesisGenerator> =
        match build_service(&LlmConfig::from_env(), config.hypothesis_timeout)? {
            Some(llm) => {
                tracing::info!(model = %llm.model_id(), "Reasoning service configured");
                Arc::new(LlmHypothesisGenerator::new(llm))
            }
            None => {
                tracing::warn!(
                    "No reasoning service configured. Set ANTHROPIC_API_KEY or LLM_GATEWAY."
                );
                Arc::new(UnavailableGenerator)
            }
        };

    let runtime = RuntimeManager::new(store, generator, config.hypothesis_timeout)
        .with_idle_timeout(config.runtime_idle_timeout);
    let state = AppState::new(runtime);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(compression),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Triage assistant listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
