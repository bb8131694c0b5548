mod adapter;
mod client;
mod config;
mod error;
mod handlers;
mod logger;
mod metrics;
mod mock;
mod models;
mod process;
mod registry;

use std::sync::Arc;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use adapter::RuntimeAdapter;
use config::Settings;
use registry::ModelRegistry;

// one adapter for the whole process: the runtime has a single
// conversational context, so every handler must go through the same slot
#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<RuntimeAdapter>,
    pub registry: Arc<ModelRegistry>,
    pub settings: Arc<Settings>
}

pub fn app(state: AppState) -> Router {

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/models/load", post(handlers::load_model))
        .route("/v1/models/loaded", get(handlers::loaded_model))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/completions", post(handlers::chat_completions))
        .with_state(state)

}

#[tokio::main]
async fn main() -> anyhow::Result<()> {

    dotenvy::dotenv().ok();
    logger::init();

    let settings = Settings::from_env().context("invalid configuration")?;

    let adapter = RuntimeAdapter::from_settings(&settings)
        .await
        .context("failed to start runtime process")?;

    let state = AppState {
        adapter: Arc::new(adapter),
        registry: Arc::new(ModelRegistry::new(settings.model_base_path.clone())),
        settings: Arc::new(settings),
    };

    info!(models = %state.registry.base_path().display(), "model directory");

    let addr = state.settings.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    info!("listening on {}", listener.local_addr()?);

    let adapter = state.adapter.clone();
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    adapter.shutdown().await;
    info!("shutdown complete");

    Ok(())

}

async fn shutdown_signal() {

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");

}
