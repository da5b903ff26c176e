//! Airwave Server - Standalone headless radio playback daemon.
//!
//! Runs the playback engine with the built-in ICY stream backend and a
//! JSON-file state store, and exposes the session command API over HTTP.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use airwave_core::api::{router, ApiState};
use airwave_core::bootstrap::{bootstrap, EngineOptions};
use airwave_core::player::{IcyStreamBackend, RetryPolicy};
use airwave_core::runtime::TokioSpawner;
use airwave_core::storage::JsonFileStore;
use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use crate::config::ServerConfig;

/// Airwave Server - Headless internet radio playback daemon.
#[derive(Parser, Debug)]
#[command(name = "airwave-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "AIRWAVE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "AIRWAVE_BIND_PORT")]
    port: Option<u16>,

    /// Data directory for persistent state (collection, preferences).
    #[arg(short = 'd', long, env = "AIRWAVE_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Airwave Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    log::info!(
        "Configuration: bind={}:{}, data_dir={}",
        config.bind_address,
        config.bind_port,
        config.data_dir.display()
    );

    let store = Arc::new(JsonFileStore::new(&config.data_dir));
    let spawner = TokioSpawner::current();
    let retry_policy = RetryPolicy::new(
        config.engine.retry.max_reconnects,
        config.engine.retry.wait_interval(),
    );
    let local_backend = Arc::new(IcyStreamBackend::new(spawner).with_retry_policy(retry_policy));

    let engine = bootstrap(EngineOptions {
        config: config.engine.clone(),
        store,
        local_backend,
        remote_backend: None,
        remote_availability: None,
    })
    .await
    .context("Failed to bootstrap the playback engine")?;

    log::info!("Playback engine started");

    // Spawn the HTTP server on the main runtime
    let app = router(ApiState::new(engine.session.clone()));
    let listener = tokio::net::TcpListener::bind((config.bind_address, config.bind_port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.bind_address, config.bind_port
            )
        })?;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::error!("Server error: {}", e);
        }
    });

    log::info!("HTTP server listening on port {}", config.bind_port);

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    engine.shutdown();
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
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
