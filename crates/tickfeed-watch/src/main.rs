//! Live ticker feed watcher - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Live ticker feed watcher
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TICKFEED_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    tickfeed_ws::init_crypto();

    let args = Args::parse();

    tickfeed_watch::init_logging();

    info!("Starting tickfeed-watch v{}", env!("CARGO_PKG_VERSION"));

    // Determine config path: CLI arg > TICKFEED_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("TICKFEED_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = tickfeed_watch::AppConfig::from_file(&config_path)?;
    info!(
        symbols = config.symbols.len(),
        feed_url = %config.feed_url,
        "Configuration loaded"
    );

    let app = tickfeed_watch::Application::new(config);
    app.run().await?;

    Ok(())
}
