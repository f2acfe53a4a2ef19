//! tus-mockd - mock tus resumable-upload server
//!
//! Serves the tus creation/status/append protocol over an in-memory store,
//! for test environments that need a real HTTP upload endpoint.

use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use tus_mockd::{config::Config, server::Server};

/// tus-mockd - mock tus upload endpoint for tests
#[derive(Parser, Debug)]
#[command(name = "tus-mockd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address override, e.g. 127.0.0.1:1080
    #[arg(short, long)]
    address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tus-mockd v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    if let Some(address) = args.address {
        config.server.address = address;
    }

    let server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
