//! # stimmung
//!
//! Stimmung room server binary: loads settings, sets up logging and
//! metrics, and serves the room until interrupted.

#![deny(unsafe_code)]

mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use stimmung_server::config::ServerConfig;
use stimmung_server::server::StimmungServer;
use stimmung_settings::StimmungSettings;

/// How long open sessions get to close after ctrl-c.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Stimmung room server.
#[derive(Parser, Debug)]
#[command(name = "stimmung", about = "Shared room for raising and lowering mood cards")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.stimmung/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(stimmung_settings::settings_path)
    }

    /// Build the server configuration; CLI flags win over settings.
    fn server_config(&self, settings: &StimmungSettings) -> ServerConfig {
        let mut config = ServerConfig::from(settings);
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

    let settings_path = args.settings_path();
    let settings = stimmung_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let metrics = stimmung_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = args.server_config(&settings);
    let server = StimmungServer::new(config, metrics).context("Failed to create server")?;
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("Stimmung listening on http://{addr} (websocket at /ws)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(SHUTDOWN_TIMEOUT))
        .await;
    Ok(())
}
