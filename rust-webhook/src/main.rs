//! Linehook Web Server - LINE Messaging API webhook receiver.
//!
//! This binary:
//! - Receives webhooks from the LINE platform on `POST /`
//! - Verifies the `X-Line-Signature` HMAC
//! - Downloads image, video, audio and file content referenced by events
//! - Acknowledges every authenticated, well-formed delivery with 200 OK

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use linehook::{router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` may set RUST_LOG, so load it before the subscriber
    let dotenv = dotenvy::dotenv();

    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    match dotenv {
        Ok(path) => info!(path = %path.display(), "dotenv_loaded"),
        Err(e) if e.not_found() => info!("dotenv_not_found"),
        Err(e) => warn!(error = %e, "dotenv_invalid"),
    }

    // Missing credentials are fatal here rather than on the first request
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        port = config.port,
        content_api_base = %config.content_api_base,
        content_dir = %config.content_dir.display(),
        fetch_timeout_ms = config.content_fetch_timeout_ms,
        write_timeout_ms = config.content_write_timeout_ms,
        "config_loaded"
    );

    tokio::fs::create_dir_all(&config.content_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.content_dir.display()))?;

    let port = config.port;
    let state = AppState::new(config).context("Failed to create HTTP client")?;

    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
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
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
