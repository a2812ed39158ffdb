//! # parley
//!
//! Parley server binary: loads settings, wires the in-memory collaborators
//! into the realtime engine and serves HTTP + WebSocket until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parley_realtime::{
    EventDistributor, HistoryLimits, InMemoryDirectory, InMemoryMessageStore, Poster, Seed,
    StaticTokenAuthenticator,
};
use parley_server::{ParleyServer, ServerConfig};
use parley_settings::ParleySettings;

/// Parley messaging server.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Parley messaging server")]
struct Cli {
    /// Settings file (defaults to `~/.parley/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// JSON fixture with tokens, sessions and panels to preload.
    #[arg(long)]
    seed: Option<PathBuf>,
}

impl Cli {
    fn apply_overrides(&self, settings: &mut ParleySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn load_seed(path: &std::path::Path) -> Result<Seed> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file: {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut settings = match &args.config {
        Some(path) => parley_settings::load_settings_from_path(path),
        None => parley_settings::load_settings(),
    }
    .context("Failed to load settings")?;
    args.apply_overrides(&mut settings);
    settings.validate().context("Invalid settings")?;

    parley_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    let prometheus = parley_server::metrics::install_recorder()?;

    let directory = Arc::new(InMemoryDirectory::new());
    let authenticator = Arc::new(StaticTokenAuthenticator::new());
    if let Some(path) = &args.seed {
        let seed = load_seed(path)?;
        seed.apply(&directory, &authenticator)
            .context("Failed to apply seed")?;
        tracing::info!(
            sessions = directory.session_count(),
            panels = directory.panel_count(),
            "seed loaded"
        );
    } else {
        tracing::warn!("no --seed given, every credential will be refused");
    }

    let engine = Arc::new(
        EventDistributor::new(authenticator.clone(), directory.clone())
            .with_connection_limit(settings.server.max_connections),
    );
    let poster = Arc::new(Poster::new(
        directory,
        Arc::new(InMemoryMessageStore::new()),
        Arc::clone(&engine),
        HistoryLimits {
            default_page_size: settings.history.default_page_size,
            max_page_size: settings.history.max_page_size,
        },
    ));

    let config = ServerConfig::from(&settings.server);
    let server = ParleyServer::new(config, authenticator, Arc::clone(&engine), poster)
        .with_metrics(prometheus);

    engine.start();
    let handle = server.listen().await?;
    tracing::info!("Parley listening on http://{}", handle.addr);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let report = server
        .shutdown()
        .graceful_shutdown(&engine, vec![handle.into_join_handle()], None)
        .await;
    tracing::info!(
        connections_closed = report.connections_closed,
        timed_out = report.timed_out,
        "shutdown complete"
    );
    Ok(())
}
