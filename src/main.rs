//! KeepKey / Trezor One CLI
//!
//! A command-line interface for hardware wallets attached over USB HID.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use keepkey_client::ClientConfig;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    debug!("Config: {:?}", config);

    let ctx = commands::Context::new(config, cli.timeout);

    match cli.command {
        Commands::List => commands::utility::list().await,
        Commands::Watch => commands::utility::watch(&ctx).await,
        Commands::Wipe => commands::device::wipe(&ctx).await,
        Commands::Features => commands::device::features(&ctx).await,
        Commands::Ping { text } => commands::device::ping(&ctx, &text).await,
        Commands::Firmware { file, no_erase } => {
            commands::device::firmware(&ctx, &file, !no_erase).await
        }
    }
}
