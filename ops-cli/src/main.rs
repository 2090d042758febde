//! `pasteforge-ops`: schema bootstrap, background maintenance and admin
//! queries for PasteForge's rate limiter and audit trail.
//!
//! ```bash
//! pasteforge-ops init-db
//! pasteforge-ops maintain
//! pasteforge-ops cleanup-logs --days 30
//! pasteforge-ops audit-logs --user 42 --severity warning --limit 20
//! pasteforge-ops security-events --risk high
//! pasteforge-ops rate-limit status --action login --identifier 203.0.113.9
//! pasteforge-ops rate-limit reset --action login --identifier 203.0.113.9
//! pasteforge-ops check --action paste_create --identifier 42
//! ```

mod cli;
mod commands;
mod logging;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use commands::Services;
use settings::PasteForgeConfig;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_tracing(cli.verbose)?;

    let mut config = PasteForgeConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    debug!(config = ?config, "Configuration loaded");

    let services = Services::connect(config).await?;

    // Everything except init-db expects the tables to exist already
    if cli.command != Command::InitDb {
        services
            .db
            .initialize_schema()
            .await
            .context("Failed to initialize schema")?;
    }

    info!(version = env!("CARGO_PKG_VERSION"), command = ?cli.command, "Running command");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = commands::execute(cli.command, &services, &mut out).await;

    services.db.close().await;
    result
}
