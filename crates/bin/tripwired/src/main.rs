use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tripwire_app::clock::SystemClock;
use tripwired::config::Config;
use tripwired::daemon::Daemon;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.logging.filter)
                .context("invalid logging filter")?,
        )
        .init();

    info!(zone = %config.scheduler.timezone, "tripwired starting");
    let daemon =
        Daemon::start(&config, Arc::new(SystemClock)).context("failed to register triggers")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    daemon.shutdown().await;
    Ok(())
}
