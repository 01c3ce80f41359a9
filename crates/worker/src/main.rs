//! `modelforge-worker`: consumes photogrammetry jobs from the queue and runs
//! them one at a time.
//!
//! Configuration comes from the environment (a `.env` file is honoured).
//! See `DbConfig`, `StorageConfig`, `TelegramConfig`, `PipelineConfig` and
//! `QueueConfig` for the individual variables. `RUST_LOG` sets the filter and
//! `LOG_FORMAT=json` switches to JSON lines.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modelforge_cloud::{ObjectFetcher, S3ObjectStore, StorageConfig};
use modelforge_db::{DbConfig, PgProjectStore};
use modelforge_events::{Notifier, TelegramConfig, TelegramNotifier};
use modelforge_pipeline::{JobPipeline, PipelineConfig};
use modelforge_worker::config::{LogFormat, QueueConfig};
use modelforge_worker::consumer;

const DEFAULT_LOG_FILTER: &str =
    "modelforge_worker=info,modelforge_pipeline=info,modelforge_cloud=info,modelforge_db=info,modelforge_events=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_format = LogFormat::from_env()?;
    init_tracing(log_format);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    if let Err(e) = run(shutdown).await {
        tracing::error!(error = %format!("{e:#}"), "Worker stopped with an error");
        return Err(e);
    }

    tracing::info!("Worker shut down cleanly");
    Ok(())
}

async fn run(shutdown: CancellationToken) -> anyhow::Result<()> {
    // --- Configuration ---
    let db_config = DbConfig::from_env().context("database configuration")?;
    let storage_config = StorageConfig::from_env().context("storage configuration")?;
    let pipeline_config = PipelineConfig::from_env().context("pipeline configuration")?;
    let queue_config = QueueConfig::from_env().context("queue configuration")?;
    tracing::info!(
        queue = %queue_config.queue_name,
        projects_root = %pipeline_config.projects_root.display(),
        tools_dir = %pipeline_config.tools_dir.display(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = modelforge_db::create_pool(&db_config)
        .await
        .context("connecting to database")?;
    modelforge_db::health_check(&pool)
        .await
        .context("database health check")?;
    if db_config.run_migrations {
        modelforge_db::run_migrations(&pool)
            .await
            .context("applying migrations")?;
        tracing::info!("Database migrations applied");
    }
    let store = Arc::new(PgProjectStore::new(pool));

    // --- Content store ---
    let objects = Arc::new(S3ObjectStore::connect(&storage_config).await);
    let bucket = objects.bucket().to_string();
    let fetcher = ObjectFetcher::new(objects);
    tracing::info!(
        bucket = %bucket,
        download_attempts = fetcher.retry_policy().max_attempts,
        "Content store ready",
    );

    // --- Notifications ---
    let notifier: Option<Arc<dyn Notifier>> = match TelegramConfig::from_env() {
        Some(config) => Some(Arc::new(
            TelegramNotifier::new(config).context("building Telegram client")?,
        )),
        None => {
            tracing::warn!("BOT_TOKEN not set, completion notifications are disabled");
            None
        }
    };

    let http = reqwest::Client::builder()
        .build()
        .context("building HTTP client")?;
    let pipeline = JobPipeline::new(store, fetcher, http, notifier, pipeline_config);

    // --- Consume ---
    consumer::run(&queue_config, &pipeline, shutdown)
        .await
        .context("queue consumer")?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, finishing up"),
        () = terminate => tracing::info!("Received SIGTERM, finishing up"),
    }
}
