//! Skilvyn - onboarding and tutoring chat service
//!
//! Walks a learner through a short onboarding dialogue and a five-unit
//! curriculum, with every reply produced by a configurable text-generation
//! backend.

mod api;
mod config;
mod curriculum;
mod llm;
mod marker;
mod prompts;
mod runtime;
mod state_machine;

use api::{create_router, AppState};
use config::AppConfig;
use llm::ModelRegistry;
use runtime::{LlmClient, RegistryLlmClient, SessionManager};
use std::net::SocketAddr;
use std::sync::Arc;
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
                .unwrap_or_else(|_| "skilvyn=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    // Initialize backend registry
    let llm_registry = Arc::new(ModelRegistry::new(&config.llm));
    let available = llm_registry.available_backends();
    if llm_registry.default().is_some() {
        tracing::info!(
            backends = ?available,
            default = %llm_registry.default_backend(),
            "Text generation backends initialized"
        );
    } else {
        tracing::warn!(
            backend = %llm_registry.default_backend(),
            backends = ?available,
            "Selected backend is not configured; generations will fail until it is"
        );
    }

    let llm_client: Arc<dyn LlmClient> =
        Arc::new(RegistryLlmClient::new(llm_registry, config.generation));
    tracing::info!(
        model = %llm_client.model_id(),
        temperature = config.generation.temperature,
        max_tokens = config.generation.max_tokens,
        max_free_messages = config.session.max_free_messages,
        curriculum = %config.session.curriculum_policy,
        idle_timeout_secs = config.session.idle_timeout.as_secs(),
        "Session settings"
    );

    // Create application state
    let sessions = Arc::new(SessionManager::new(llm_client, config.session));
    sessions.start_idle_cleanup();
    let state = AppState::new(sessions);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Skilvyn server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
