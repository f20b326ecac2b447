//! B2 Relay - stateless upload relay for Backblaze B2
//!
//! Accepts whole files or large-file chunks over HTTP and forwards them to B2.

use b2_relay::{config::Config, logging, server::Server};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// B2 Relay - forwards uploads to Backblaze B2
#[derive(Parser, Debug)]
#[command(name = "b2-relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file; without it, configuration comes from
    /// B2_ACCOUNT_ID, B2_APPLICATION_KEY, API_TOKEN, B2_BUCKET_ID and B2_BUCKET_NAME
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    logging::init(&config.logging)?;

    info!("Starting B2 Relay v{}", b2_relay::VERSION);
    match &args.config {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("Loaded configuration from environment"),
    }

    let server = Server::bind(config).await?;
    server.run().await?;

    Ok(())
}
