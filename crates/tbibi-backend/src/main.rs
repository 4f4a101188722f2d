//! # tbibi-backend
//!
//! Chat backend binary: loads settings, opens the chat database and
//! serves the HTTP/WebSocket surface until ctrl-c.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tbibi_logging::{LogFormat, LogLevel};
use tbibi_server::config::ServerConfig;
use tbibi_server::server::ChatServer;
use tbibi_settings::TbibiSettings;
use tbibi_store::{ChatStore, ConnectionConfig};

/// tbibi chat backend.
#[derive(Parser, Debug)]
#[command(name = "tbibi-backend", about = "tbibi realtime chat backend")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` chat database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Settings file (defaults to `~/.tbibi/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Flags win over file and environment settings.
    fn apply(&self, settings: &mut TbibiSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }

    fn db_path(&self, settings: &TbibiSettings) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| tbibi_settings::resolve_db_path(settings))
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(tbibi_settings::settings_path);
    let mut settings = tbibi_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    tbibi_logging::init_subscriber(
        LogLevel::from_str_lossy(&settings.logging.level),
        LogFormat::from_json_flag(settings.logging.json),
    );

    let db_path = args.db_path(&settings);
    ensure_parent_dir(&db_path)?;
    let store_config = ConnectionConfig {
        pool_size: settings.database.pool_size,
        busy_timeout_ms: settings.database.busy_timeout_ms,
        ..ConnectionConfig::default()
    };
    let store = ChatStore::open_file(&db_path.to_string_lossy(), &store_config)
        .context("Failed to open chat database")?;
    tracing::info!(db_path = %db_path.display(), "chat database ready");

    let metrics = tbibi_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = ServerConfig::from_settings(&settings);
    let shutdown_timeout = config.shutdown_timeout();
    let server = ChatServer::new(config, store, Some(metrics));

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    tracing::info!("tbibi backend listening on http://{addr}");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!(
        sessions = server.registry().len(),
        "Shutting down..."
    );
    if !server
        .shutdown()
        .graceful_shutdown(Some(shutdown_timeout))
        .await
    {
        tracing::warn!("some sessions did not close before the shutdown timeout");
    }
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
