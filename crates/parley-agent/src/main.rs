//! # parley-agent
//!
//! Parley channel server binary. Loads settings, installs logging, and
//! serves one channel over WebSocket until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parley_logging::LogFormat;
use parley_server::{ParleyServer, ServerConfig};
use parley_settings::ParleySettings;

/// Parley channel server.
#[derive(Parser, Debug)]
#[command(name = "parley-agent", about = "Parley chat channel server")]
struct Cli {
    /// Host to bind (overrides settings if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings if specified).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.parley/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Seconds to wait for connections to drain on shutdown.
    #[arg(long, default_value = "10")]
    drain_secs: u64,
}

impl Cli {
    /// Layer CLI flags over loaded settings.
    fn server_config(&self, settings: &ParleySettings) -> ServerConfig {
        let mut config = ServerConfig::from_settings(settings);
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Settings come first so the log level is known before logging starts.
    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(parley_settings::settings_path);
    let settings = parley_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    let level = args.log_level.as_deref().unwrap_or(&settings.logging.level);
    let _ = parley_logging::init_subscriber(level, LogFormat::from_json_flag(settings.logging.json));

    let server = ParleyServer::new(args.server_config(&settings), &settings.channel);
    let config = server.config();
    tracing::info!(
        host = %config.host,
        port = config.port,
        max_history = settings.channel.max_history,
        idle_timeout_ms = config.idle_timeout_ms,
        "starting parley"
    );
    let (addr, handle) = server.listen().await.context("Failed to start server")?;
    tracing::info!(%addr, "ws://{addr}/ws ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .stop(vec![handle], Some(Duration::from_secs(args.drain_secs)))
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}
