use actix_web::{web, App, HttpServer};
use anyhow::Context;
use pictor::config::Config;
use pictor::db::{Database, ImageRepo, SettingsRepo, TaskRepo};
use pictor::handlers::{self, AppState};
use pictor::services::ingest::{HttpFetcher, IngestOptions};
use pictor::services::{AdapterRegistry, Dispatcher, IngestService, ModerationQueue, RetryScheduler};
use pictor::storage::ImageStorage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pictor=info,actix_web=info".into()),
        )
        .init();

    let config = Config::from_env();
    info!(
        service = %config.service_name,
        environment = %config.environment,
        host = %config.host,
        port = config.port,
        "configuration loaded"
    );

    let db = Database::open(&config.data_dir)
        .await
        .context("failed to open data directory")?;
    let storage = Arc::new(ImageStorage::new(config.uploads_dir.clone()));
    storage
        .ensure_root()
        .await
        .context("failed to prepare uploads directory")?;

    let tasks = TaskRepo::new(&db);
    let images = ImageRepo::new(&db);
    let settings = SettingsRepo::new(&db);

    let dispatcher = Dispatcher::new(settings.clone());
    let detector = Arc::new(AdapterRegistry::new());
    let queue = ModerationQueue::new(
        tasks.clone(),
        images.clone(),
        settings.clone(),
        storage.clone(),
        detector,
        dispatcher.clone(),
        Duration::from_secs(config.queue_poll_secs),
        config.public_base_url.clone(),
    );
    let retry = RetryScheduler::new(
        tasks.clone(),
        Duration::from_secs(config.retry_interval_secs),
        config.retry_max_attempts,
    );

    // Anything a previous run left mid-flight will never advance on its
    // own; requeue before the worker starts.
    let recovered = queue.recover().await.context("startup recovery failed")?;
    if recovered > 0 {
        info!(recovered, "recovered interrupted moderation tasks");
    }

    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(
        config.download_timeout_secs,
    )));
    let ingest = IngestService::new(
        images,
        storage,
        settings.clone(),
        queue.clone(),
        dispatcher.clone(),
        fetcher,
        IngestOptions::from_config(&config),
    );

    // Graceful shutdown for the background workers.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let queue_handle = tokio::spawn(queue.clone().run(shutdown_rx.clone()));
    let retry_handle = tokio::spawn(retry.run(shutdown_rx));

    let state = AppState {
        ingest,
        settings,
        dispatcher,
        tasks,
    };

    let bind_address = format!("{}:{}", config.host, config.port);
    info!(%bind_address, "pictor is running");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(actix_web::middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("failed to bind {bind_address}"))?
    .run();

    let result = server.await;

    info!("HTTP server stopped, shutting down workers");
    let _ = shutdown_tx.send(true);
    let _ = queue_handle.await;
    let _ = retry_handle.await;

    result.context("HTTP server error")
}
