//! dutd - DUT control server
//!
//! A TCP command/response server exposing a hardware device under test to a
//! remote controller.

use dutd_server::{Config, DispatchTable, NullDriver, Server, ServerConfig};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if DUTD_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if std::env::var("DUTD_CONFIG").is_ok() {
                tracing::info!(
                    "Loaded config from {}",
                    std::env::var("DUTD_CONFIG").unwrap()
                );
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("DUTD_CONFIG").is_ok() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            // Otherwise fall back to defaults
            tracing::info!("Using default configuration");
            Config::default()
        }
    };

    tracing::info!("Starting dutd server, pid = {}", std::process::id());
    tracing::info!("  Bind address: {}", config.network.bind_addr);

    // Driver backend; a platform integration replaces NullDriver with its
    // driver control channel.
    let driver = Arc::new(NullDriver);
    let dispatch = DispatchTable::standard(driver);

    let server = Arc::new(Server::new(
        ServerConfig::new(config.network.bind_addr),
        dispatch,
    ));

    // Shut down gracefully on SIGINT or SIGTERM
    let mut sigterm = signal(SignalKind::terminate())?;
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
