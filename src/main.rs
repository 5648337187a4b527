//! # nudge
//!
//! Push server binary: loads settings, starts logging and metrics, and serves
//! session streams until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nudge_logging::{LogFormat, LogLevel};
use nudge_server::shutdown::DEFAULT_DRAIN_TIMEOUT;
use nudge_server::{NudgeServer, ServerConfig};
use nudge_settings::NudgeSettings;

/// Session-addressed proactive push server.
#[derive(Parser, Debug)]
#[command(name = "nudge", about = "Session-addressed proactive push server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.nudge/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, settings: &mut NudgeSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Settings come first: they carry the log level.
    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(nudge_settings::settings_path);
    let loaded = nudge_settings::load_settings_from_path(&settings_path);
    let mut settings = match &loaded {
        Ok(settings) => settings.clone(),
        Err(_) => {
            let mut defaults = NudgeSettings::default();
            nudge_settings::loader::apply_overrides(&mut defaults, |name| std::env::var(name).ok());
            defaults
        }
    };
    args.apply(&mut settings);

    nudge_logging::init_subscriber(
        LogLevel::from_str_lossy(&settings.logging.level),
        LogFormat::from_str_lossy(&settings.logging.format),
    )
    .context("Failed to initialise logging")?;

    if let Err(error) = loaded {
        tracing::warn!(path = %settings_path.display(), %error, "invalid settings, using defaults");
    }

    let metrics = nudge_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = ServerConfig::from_settings(&settings);
    tracing::info!(
        delivery = ?config.delivery,
        channel_capacity = config.channel_capacity,
        idle_timeout_secs = ?config.session_idle_timeout_secs,
        "starting nudge server"
    );
    let server = NudgeServer::new(config, metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("nudge listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let outcome = server
        .shutdown()
        .drain(handle, server.dispatcher().registry(), DEFAULT_DRAIN_TIMEOUT)
        .await;
    tracing::info!(?outcome, "Shutdown complete");
    Ok(())
}
