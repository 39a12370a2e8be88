//! perpsvc backend - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Custodial perps trading backend
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PERPSVC_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS provider must be installed before the first wss:// connect
    perpsvc_ws::init_crypto();

    let args = Args::parse();
    perpsvc_telemetry::init_logging()?;

    info!("Starting perpsvc v{}", env!("CARGO_PKG_VERSION"));

    let config_path = perpsvc_app::AppConfig::resolve_path(args.config);
    info!(config_path = %config_path, "Loading configuration");

    let config = perpsvc_app::AppConfig::load(&config_path)?;
    info!(
        addr = %config.server.addr(),
        database = !config.database.url.is_empty(),
        "Configuration loaded"
    );

    let app = perpsvc_app::Application::new(config).await?;
    app.run().await?;

    Ok(())
}
