//! Hearth Telemetry Daemon
//!
//! Background service streaming host metrics to dashboard clients over
//! WebSocket, with JSON endpoints for process and host queries.

mod config;
mod web;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use hearth_monitor::Hub;

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => {
            let config = Config::load(&path).context("Failed to load configuration")?;
            info!("Loaded configuration from: {}", path);
            config
        }
        None => {
            info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    // Start the monitor hub and its tick loop
    let hub = Hub::new(config.monitor_config());
    {
        let hub = hub.clone();
        tokio::spawn(async move { hub.run().await });
    }

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    // Start web server
    let state = Arc::new(web::AppState {
        hub: hub.clone(),
        process_limit: config.monitor.process_limit,
    });
    let app = web::create_router(state);
    let addr: SocketAddr = config.listen.parse().context("Invalid listen address")?;
    let listener = TcpListener::bind(addr).await?;
    info!("Web server listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    hub.shutdown();
    Ok(())
}
