//! # parley
//!
//! Relay binary: loads settings, starts logging and metrics, serves the
//! WebSocket relay until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parley_core::logging::init_subscriber;
use parley_server::config::ServerConfig;
use parley_server::metrics::install_recorder;
use parley_server::server::ParleyServer;
use parley_settings::ParleySettings;

/// Parley chat relay.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Real-time chat relay over WebSocket")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.parley/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `parley_server=trace,info`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Load settings from the chosen file and apply flag overrides.
    fn resolve_settings(&self) -> Result<ParleySettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(parley_settings::settings_path);
        let mut settings = parley_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.resolve_settings()?;

    init_subscriber(&settings.logging.level, settings.logging.format);
    let metrics_handle = install_recorder().context("Failed to install metrics recorder")?;

    let server = ParleyServer::new(ServerConfig::from(&settings.server), metrics_handle);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        max_connections = settings.server.max_connections,
        "Parley relay listening on ws://{addr}/ws"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!(connections = server.registry().len(), "Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(Duration::from_secs(10)))
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}
