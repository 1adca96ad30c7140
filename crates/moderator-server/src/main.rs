//! Moderator
//!
//! Multilingual toxicity classification over HTTP.
//!
//! `POST /moderate` with `{"content": "..."}` returns a score in [0, 1] for
//! every toxicity class of the loaded checkpoint.

use anyhow::Result;
use clap::Parser;
use moderator_server::telemetry::{init_metrics, init_tracing};
use moderator_server::{create_router, AppState, Cli, ConfigOverrides, ServiceConfig};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = ServiceConfig::load(&cli.config, &ConfigOverrides::from(&cli))?;

    // Initialize tracing
    init_tracing(cli.verbose, &config.logging);

    info!("Starting Moderator");
    info!("Configuration loaded from {}", cli.config);
    info!("Checkpoint: {:?}", config.model.checkpoint);
    info!("Device: {}", config.model.inference.device);

    // Initialize metrics
    let metrics_handle = init_metrics()?;

    // The model is loaded once and shared by every request
    let addr: SocketAddr = format!("{}:{}", config.server.listen, config.server.port).parse()?;
    let state = AppState::load(config, metrics_handle).await?;
    info!("Application state initialized successfully");

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Moderator listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            warn!("Shutdown signal received, stopping server...");
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
