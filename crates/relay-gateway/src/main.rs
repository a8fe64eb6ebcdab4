//! # relay-gateway
//!
//! Gateway server binary — loads settings, opens the bridge, starts the
//! fan-out worker, and serves until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relay_bridge::{Bridge, HttpBridgeClient};
use relay_server::config::ServerConfig;
use relay_server::server::RelayServer;
use relay_settings::{load_settings, load_settings_from_path};
use tracing::info;

/// Relay gateway server.
#[derive(Parser, Debug)]
#[command(name = "relay-gateway", about = "Shared-state sync and event fan-out gateway")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 auto-assigns).
    #[arg(long)]
    port: Option<u16>,

    /// Backend runtime address (overrides settings).
    #[arg(long)]
    bridge_address: Option<String>,

    /// Settings file to load instead of `~/.relay/settings.json`.
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => load_settings().context("failed to load settings")?,
    };
    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(address) = cli.bridge_address {
        settings.bridge.address = address;
    }

    relay_logging::init(settings.logging.level, settings.logging.json);

    let bridge: Arc<dyn Bridge> = Arc::new(HttpBridgeClient::new(
        settings.bridge.address.clone(),
        Duration::from_millis(settings.bridge.request_timeout_ms),
    ));
    let config = ServerConfig::from(&settings.server);
    let stream_backoff = settings.bridge.stream_backoff.clone();
    info!(
        runtime = %settings.bridge.address,
        "connecting gateway to backend runtime"
    );
    let _ = relay_settings::init_settings(settings);

    let server = RelayServer::new(config, bridge.clone(), stream_backoff);
    let _ = server.start_worker();
    let (addr, serve_handle) = server
        .listen()
        .await
        .context("failed to bind gateway listener")?;
    info!(%addr, "relay gateway ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    server.shutdown().drain(vec![serve_handle], None).await;
    bridge.close().await;
    Ok(())
}
