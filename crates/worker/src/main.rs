use std::sync::Arc;

use anyhow::{Context, Result};
use camunda_client::{Client, FetchAndLockTopic};
use camunda_processor::Processor;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod handlers;

use config::WorkerConfig;
use handlers::{greet, WORK_DELAY};

#[tokio::main]
async fn main() -> Result<()> {
    // Optional .env file; real environment variables take precedence
    dotenvy::dotenv().ok();

    // RUST_LOG wins over LOG_LEVEL (default: "info")
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("camunda_worker={log_level},camunda_processor={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("camunda-worker starting...");

    let config = WorkerConfig::from_env();
    tracing::info!(
        endpoint = %config.client.endpoint_url,
        max_tasks = config.processor.max_tasks,
        max_parallel = config.processor.max_parallel_task_per_handler,
        "Configuration loaded"
    );

    let client = Client::new(config.client).context("Failed to create engine client")?;
    let processor = Processor::new(Arc::new(client.external_task()), config.processor)
        .context("Invalid processor options")?;

    processor.add_handler(vec![FetchAndLockTopic::new("PrintHello")], |ctx| {
        greet(ctx, "Hello", WORK_DELAY)
    })?;
    processor.add_handler(vec![FetchAndLockTopic::new("PrintWorld")], |ctx| {
        greet(ctx, "World", WORK_DELAY)
    })?;

    tracing::info!(worker_id = %processor.worker_id(), "Processor is started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Received shutdown signal");

    processor.shutdown().await;

    tracing::info!("Worker shutdown complete");
    Ok(())
}
