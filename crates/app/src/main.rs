//! `PostWhale` - Main Entry Point
//!
//! Starts the worker, runs one subcommand against it and exits.

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so results on stdout stay machine readable.
    let fallback = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Starting PostWhale v{}", env!("CARGO_PKG_VERSION"));

    commands::run(cli).await?;
    Ok(())
}
