//! The single background download loop

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::cancel::CancellationGuard;
use super::{CANCELLED_MESSAGE, DownloadError};
use crate::manager::QueueManager;
use crate::queue::{ItemStatus, QueueError, QueueItem};

/// Processes the active list one item at a time, first pending item first.
#[derive(Debug, Clone)]
pub struct DownloadWorker {
    manager: Arc<QueueManager>,
}

impl DownloadWorker {
    pub fn new(manager: Arc<QueueManager>) -> Self {
        Self { manager }
    }

    /// Loops until `shutdown` fires. An in-flight download is aborted on shutdown.
    ///
    /// Each iteration runs in its own task so a panic is logged and survived like
    /// any other iteration error.
    pub async fn run(self, shutdown: CancellationToken) {
        let config = self.manager.config().clone();
        info!("Download worker started");

        loop {
            let task = tokio::spawn({
                let worker = self.clone();
                async move { worker.process_next().await }
            });
            let abort = task.abort_handle();

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    abort.abort();
                    break;
                }
                outcome = task => outcome,
            };

            let pause = match outcome {
                Ok(Ok(Some(item))) => {
                    debug!(id = %item.id, cooldown = ?config.cooldown(), "Cooling down");
                    config.cooldown()
                }
                Ok(Ok(None)) => config.idle(),
                Ok(Err(e)) => {
                    error!(error = %e, "Error in download worker");
                    config.error_backoff()
                }
                Err(e) => {
                    error!(error = %e, "Download worker iteration panicked");
                    config.error_backoff()
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Download worker stopped");
    }

    /// Downloads the first pending item, if there is one, and returns it.
    #[instrument(skip(self))]
    pub async fn process_next(&self) -> Result<Option<QueueItem>, QueueError> {
        let store = self.manager.store();
        let next = store
            .active()
            .await?
            .into_iter()
            .find(|item| item.status == ItemStatus::Pending);
        let Some(item) = next else {
            return Ok(None);
        };

        info!(id = %item.id, title = %item.title, "Processing item");
        let Some(guard) = self.begin(&item).await? else {
            return Ok(None);
        };

        self.download(&item, guard).await?;
        Ok(Some(item))
    }

    /// Registers the item's cancellation signal, then marks it downloading.
    ///
    /// Anyone who sees the item as downloading can reach its signal.
    async fn begin(&self, item: &QueueItem) -> Result<Option<CancellationGuard<'_>>, QueueError> {
        let guard = self.manager.cancellations().register(&item.id);
        if !self.manager.store().mark_downloading(&item.id).await? {
            warn!(id = %item.id, "Item changed before it could start, skipping");
            return Ok(None);
        }
        self.manager.progress().reset(&item.id);
        Ok(Some(guard))
    }

    async fn download(
        &self,
        item: &QueueItem,
        guard: CancellationGuard<'_>,
    ) -> Result<(), QueueError> {
        let store = self.manager.store();
        let progress = self.manager.progress();

        let result = if guard.is_cancelled() {
            Err(DownloadError::Cancelled)
        } else {
            self.manager
                .protocol()
                .download(item, guard.token(), progress)
                .await
        };

        match result {
            Ok(path) if !guard.is_cancelled() => {
                info!(id = %item.id, path = ?path, "Download finished");
                progress.complete(&item.id);
                store.mark_completed(&item.id).await?;
            }
            Ok(_) | Err(DownloadError::Cancelled) => {
                info!(id = %item.id, "Download cancelled");
                progress.reset(&item.id);
                store.mark_failed(&item.id, CANCELLED_MESSAGE).await?;
            }
            Err(e) if guard.is_cancelled() => {
                debug!(id = %item.id, error = %e, "Error after cancellation");
                progress.reset(&item.id);
                store.mark_failed(&item.id, CANCELLED_MESSAGE).await?;
            }
            Err(e) => {
                error!(id = %item.id, error = %e, "Download failed");
                store.mark_failed(&item.id, &e.to_string()).await?;
            }
        }
        Ok(())
    }
}
