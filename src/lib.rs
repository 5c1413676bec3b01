// Declare the modules
pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

use crate::api::{GeminiProvider, GenerativeModel};
use crate::config::ServerConfig;
use crate::state::AppState;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Serves the router on an already bound listener until the process is stopped.
pub async fn serve(listener: TcpListener, state: AppState, max_upload_bytes: usize) -> Result<()> {
    let app = handlers::router(state, max_upload_bytes);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated with an error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}

pub async fn run() -> Result<()> {
    // Initialize logging
    env_logger::init();

    // Fails fast when the credential is absent
    let config = ServerConfig::from_env().context("Invalid startup configuration")?;

    // Create the API provider instance once; every request borrows it through AppState
    let api_provider: Arc<dyn GenerativeModel> = Arc::new(GeminiProvider::from_config(&config));
    let app_state = AppState::new(api_provider);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    log::info!(
        "Serving chat on http://{} using model {}",
        listener.local_addr()?,
        config.model
    );

    serve(listener, app_state, config.max_upload_bytes).await
}
