//! taskrelay - Queue Orchestrator Entry Point
//!
//! Loads configuration, prepares the task directories, and runs the
//! scanner loop until interrupted.

use std::sync::Arc;

use taskrelay::{Config, Engine, HttpInferenceClient, Scheduler};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskrelay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    info!(
        "Loaded configuration: api_url={}, model={}, scan_interval={}s",
        config.api_url,
        config.default_model,
        config.scan_interval.as_secs()
    );

    for dir in [&config.pending_dir, &config.completed_dir, &config.failed_dir] {
        tokio::fs::create_dir_all(dir).await?;
    }

    let client = Arc::new(HttpInferenceClient::new(
        config.api_url.clone(),
        config.api_key.clone(),
        config.request_timeout,
    )?);
    let engine = Arc::new(Engine::new(config.clone(), client));

    info!(
        "Watching {} every {}s",
        config.pending_dir.display(),
        config.scan_interval.as_secs()
    );
    let scheduler = Scheduler::spawn(engine, config.pending_dir.clone(), config.scan_interval);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, stopping at the next pass boundary");
    scheduler.shutdown().await;

    Ok(())
}
