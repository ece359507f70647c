mod bootstrap_helpers;
mod cli_args;
mod startup;

use anyhow::{Context, Result};
use clap::Parser;

use crate::bootstrap_helpers::{init_tracing, load_dotenv_from};
use crate::cli_args::Cli;
use crate::startup::{run_bridge, BridgeConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = std::env::current_dir()
        .context("failed to resolve working directory")
        .and_then(|dir| load_dotenv_from(&dir));
    init_tracing();
    match dotenv {
        Ok(Some(path)) => tracing::info!(path = %path.display(), "loaded environment file"),
        Ok(None) => tracing::debug!("no .env file in working directory"),
        Err(error) => tracing::warn!(error = %format!("{error:#}"), "ignoring unreadable .env file"),
    }

    let cli = Cli::parse();
    let config = BridgeConfig::from_cli(&cli)?;
    run_bridge(config).await
}
