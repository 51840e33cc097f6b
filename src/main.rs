mod backend;
mod config;
mod db;
mod downloader;
mod manager;
mod queue;

use backend::router::create_router;
use downloader::DownloadWorker;
use manager::QueueManager;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    let config = config::config();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // create download directory
    let download_dir = &config.downloader.download_dir;
    if !download_dir.exists() {
        tokio::fs::create_dir_all(download_dir).await?;
        tracing::info!("Directory '{}' does not exist, creating...", download_dir.display());
    }

    let db = db::connect(&config.db_config).await?;
    let manager = Arc::new(QueueManager::new(db, config.downloader.clone()));
    manager.startup().await?;

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(DownloadWorker::new(manager.clone()).run(shutdown.clone()));

    let app = create_router(manager);
    let listener = tokio::net::TcpListener::bind(&config.host).await?;
    tracing::info!("Listening on: {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    if let Err(e) = worker.await {
        tracing::error!("Download worker ended abnormally: {}", e);
    }

    Ok(())
}
