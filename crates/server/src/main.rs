mod bootstrap;
mod health;

use anyhow::Result;
use mendflow_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use mendflow_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    // Now bootstrap using the same config we already loaded
    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.push_transport_mode",
        transport_mode = if app.config.push.enabled { "webhook" } else { "noop" },
        "push relay transport mode initialized"
    );

    // The service stays wired for the application's lifetime even though
    // collaborators reach it through the engine crate rather than this
    // binary.
    let _ = &app.service;

    let relay = app.relay;
    tokio::spawn(async move { relay.run().await });

    tracing::info!(event_name = "system.server.started", "mendflow-server started");
    wait_for_shutdown().await?;
    tracing::info!(event_name = "system.server.stopping", "mendflow-server stopping");

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
