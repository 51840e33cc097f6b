//! Queue coordinator
//!
//! [`QueueManager`] owns the persisted queue together with the in-memory progress
//! and cancellation maps. It is built once in `main`, shared by `Arc` with the
//! download worker and the HTTP handlers, and is the only entry point request
//! handlers use.

use serde::Serialize;
use surrealdb::{Surreal, engine::any::Any};
use tracing::{info, instrument};
use url::Url;

use crate::config::DownloaderConfig;
use crate::downloader::{CANCELLED_MESSAGE, CancellationRegistry, DownloadProtocol, ProgressTracker};
use crate::queue::{Direction, ItemStatus, ProgressInfo, QueueError, QueueItem, QueueStore};

/// Checks that `raw` is an http(s) link on `allowed_domain` or one of its subdomains.
pub fn validate_url(raw: &str, allowed_domain: &str) -> Result<Url, QueueError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(QueueError::Validation("URL is required".to_string()));
    }
    let url = Url::parse(raw).map_err(|e| QueueError::Validation(format!("Invalid URL: {e}")))?;

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let domain = allowed_domain.to_ascii_lowercase();
    let on_domain = host == domain || host.ends_with(&format!(".{domain}"));
    if !matches!(url.scheme(), "http" | "https") || !on_domain {
        return Err(QueueError::Validation(format!(
            "Only {allowed_domain} links are allowed"
        )));
    }
    Ok(url)
}

fn require_id(id: &str) -> Result<&str, QueueError> {
    let id = id.trim();
    if id.is_empty() {
        Err(QueueError::Validation("Item ID is required".to_string()))
    } else {
        Ok(id)
    }
}

/// A queue item merged with its live progress
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueueEntry {
    #[serde(flatten)]
    pub item: QueueItem,
    #[serde(flatten)]
    pub progress: ProgressInfo,
}

/// Everything the UI shows
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub downloaded: Vec<QueueEntry>,
    pub active: Vec<QueueEntry>,
    pub failed: Vec<QueueEntry>,
    pub completed: Vec<QueueEntry>,
}

#[derive(Debug)]
pub struct QueueManager {
    store: QueueStore,
    progress: ProgressTracker,
    cancellations: CancellationRegistry,
    protocol: DownloadProtocol,
}

impl QueueManager {
    pub fn new(db: Surreal<Any>, config: DownloaderConfig) -> Self {
        Self {
            store: QueueStore::new(db),
            progress: ProgressTracker::new(),
            cancellations: CancellationRegistry::new(),
            protocol: DownloadProtocol::new(config),
        }
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn cancellations(&self) -> &CancellationRegistry {
        &self.cancellations
    }

    pub fn protocol(&self) -> &DownloadProtocol {
        &self.protocol
    }

    pub fn config(&self) -> &DownloaderConfig {
        self.protocol.config()
    }

    /// Recovers from the previous run. Must finish before the worker starts.
    #[instrument(skip(self))]
    pub async fn startup(&self) -> Result<(), QueueError> {
        let reset = self.store.reset_stuck_downloads().await?;
        let active = self.store.active().await?;
        info!(
            reset = reset.len(),
            active = active.len(),
            "Resetting progress for active items"
        );
        for item in active.iter().filter(|i| i.status == ItemStatus::Pending) {
            self.progress.reset(&item.id);
        }
        Ok(())
    }

    /// Validates a link, scrapes its display metadata and appends it to the queue.
    #[instrument(skip(self))]
    pub async fn enqueue(&self, url: &str) -> Result<QueueItem, QueueError> {
        let url = validate_url(url, &self.config().allowed_domain)?;
        let meta = self.protocol.file_metadata(url.as_str()).await;
        info!(title = %meta.title, size = %meta.size, "Adding to queue");

        let item = QueueItem::new(url.as_str(), meta.title, meta.size);
        self.store.add(item.clone()).await?;
        self.progress.reset(&item.id);
        Ok(item)
    }

    pub async fn list_all(&self) -> Result<QueueSnapshot, QueueError> {
        let lists = self.store.all().await?;
        let progress = self.progress.snapshot();
        let merge = |items: Vec<QueueItem>| {
            items
                .into_iter()
                .map(|item| QueueEntry {
                    progress: progress.get(&item.id).cloned().unwrap_or_default(),
                    item,
                })
                .collect()
        };
        Ok(QueueSnapshot {
            downloaded: merge(lists.downloaded),
            active: merge(lists.active),
            failed: merge(lists.failed),
            completed: merge(lists.completed),
        })
    }

    /// One item from any list, merged with its progress.
    pub async fn find(&self, id: &str) -> Result<Option<QueueEntry>, QueueError> {
        let id = require_id(id)?;
        Ok(self.store.find(id).await?.map(|item| QueueEntry {
            progress: self.progress.get(&item.id),
            item,
        }))
    }

    pub async fn remove(&self, id: &str) -> Result<bool, QueueError> {
        self.store.remove(require_id(id)?).await
    }

    pub async fn move_item(&self, id: &str, direction: Direction) -> Result<bool, QueueError> {
        self.store.move_item(require_id(id)?, direction).await
    }

    pub async fn retry(&self, id: &str) -> Result<bool, QueueError> {
        let id = require_id(id)?;
        let retried = self.store.retry_failed(id).await?;
        if retried {
            self.progress.reset(id);
        }
        Ok(retried)
    }

    pub async fn mark_downloaded(&self, id: &str) -> Result<bool, QueueError> {
        self.store.mark_downloaded(require_id(id)?).await
    }

    /// Signals the in-flight download, if any, and fails the item right away.
    ///
    /// The worker may not poll the signal until its next chunk; failing here keeps
    /// the queue view accurate in the meantime.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: &str) -> Result<bool, QueueError> {
        let id = require_id(id)?;
        let signalled = self.cancellations.cancel(id);
        let failed = self.store.mark_failed(id, CANCELLED_MESSAGE).await?;
        let cancelled = signalled || failed;
        if cancelled {
            self.progress.reset(id);
        }
        Ok(cancelled)
    }

    pub async fn clear_failed(&self) -> Result<(), QueueError> {
        self.store.clear_failed().await
    }

    pub async fn clear_completed(&self) -> Result<(), QueueError> {
        self.store.clear_completed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_memory;
    use crate::downloader::ProgressUpdate;
    use crate::downloader::fake_host::FakeHost;

    async fn manager_for(host: &FakeHost) -> QueueManager {
        let config = DownloaderConfig {
            allowed_domain: host.host(),
            ..DownloaderConfig::default()
        };
        QueueManager::new(connect_memory().await, config)
    }

    #[test]
    fn accepts_hosting_domain_links() {
        assert!(validate_url("https://fastshare.cloud/x", "fastshare.cloud").is_ok());
        assert!(validate_url("  https://www.fastshare.cloud/x ", "fastshare.cloud").is_ok());
        assert!(validate_url("http://FastShare.Cloud/abc", "fastshare.cloud").is_ok());
    }

    #[test]
    fn rejects_other_links() {
        for url in [
            "",
            "not a url",
            "https://example.com/fastshare.cloud",
            "https://evilfastshare.cloud/x",
            "https://fastshare.cloud.evil.com/x",
            "ftp://fastshare.cloud/x",
        ] {
            let err = validate_url(url, "fastshare.cloud").unwrap_err();
            assert!(matches!(err, QueueError::Validation(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn enqueue_adds_pending_item_with_metadata() {
        let host = FakeHost::start(vec![]).await;
        let manager = manager_for(&host).await;

        let item = manager.enqueue(&host.page_url()).await.unwrap();

        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.title, "Sample File.mkv");
        assert_eq!(item.size, "1.2 GB");
        let active = manager.store().active().await.unwrap();
        assert_eq!(active, vec![item.clone()]);
        assert_eq!(manager.progress().get(&item.id), ProgressInfo::default());
    }

    #[tokio::test]
    async fn enqueue_degrades_when_page_is_unreachable() {
        let host = FakeHost::start(vec![]).await;
        let manager = manager_for(&host).await;

        let item = manager.enqueue(&host.missing_url()).await.unwrap();

        assert_eq!(item.title, "Unknown");
        assert_eq!(item.size, "Unknown size");
        assert_eq!(manager.store().active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn enqueue_rejects_foreign_domain_without_mutation() {
        let manager = QueueManager::new(connect_memory().await, DownloaderConfig::default());

        let err = manager.enqueue("https://example.com/x").await.unwrap_err();

        assert_eq!(err.to_string(), "Only fastshare.cloud links are allowed");
        assert!(manager.store().active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_ids_are_rejected() {
        let manager = QueueManager::new(connect_memory().await, DownloaderConfig::default());
        for result in [
            manager.remove(" ").await,
            manager.retry("").await,
            manager.cancel("").await,
            manager.move_item("", Direction::Up).await,
            manager.mark_downloaded("").await,
        ] {
            assert!(matches!(result, Err(QueueError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn list_all_merges_progress() {
        let host = FakeHost::start(vec![]).await;
        let manager = manager_for(&host).await;
        let item = manager.enqueue(&host.page_url()).await.unwrap();
        manager.progress().apply(
            &item.id,
            ProgressUpdate::Full {
                progress: Some(40),
                speed: "1.0 MB/s".to_string(),
            },
        );

        let snapshot = manager.list_all().await.unwrap();

        assert_eq!(snapshot.active.len(), 1);
        assert_eq!(snapshot.active[0].progress.progress, Some(40));
        assert_eq!(snapshot.active[0].progress.speed, "1.0 MB/s");
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["active"][0]["progress"], 40);
        assert_eq!(json["active"][0]["id"], item.id.as_str());
    }

    #[tokio::test]
    async fn cancel_fails_downloading_item_without_worker() {
        let host = FakeHost::start(vec![]).await;
        let manager = manager_for(&host).await;
        let item = manager.enqueue(&host.page_url()).await.unwrap();
        manager.store().mark_downloading(&item.id).await.unwrap();
        manager.progress().apply(&item.id, ProgressUpdate::Percent(70));

        assert!(manager.cancel(&item.id).await.unwrap());

        let failed = manager.store().failed().await.unwrap();
        assert_eq!(failed[0].error.as_deref(), Some(CANCELLED_MESSAGE));
        assert_eq!(manager.progress().get(&item.id).progress, Some(0));
    }

    #[tokio::test]
    async fn cancel_leaves_pending_item_queued() {
        let host = FakeHost::start(vec![]).await;
        let manager = manager_for(&host).await;
        let item = manager.enqueue(&host.page_url()).await.unwrap();

        assert!(!manager.cancel(&item.id).await.unwrap());
        assert_eq!(manager.store().active().await.unwrap()[0].status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn retry_resets_progress() {
        let host = FakeHost::start(vec![]).await;
        let manager = manager_for(&host).await;
        let item = manager.enqueue(&host.page_url()).await.unwrap();
        manager.store().mark_downloading(&item.id).await.unwrap();
        manager.store().mark_failed(&item.id, "boom").await.unwrap();
        manager.progress().apply(&item.id, ProgressUpdate::Percent(55));

        assert!(manager.retry(&item.id).await.unwrap());

        let active = manager.store().active().await.unwrap();
        assert_eq!(active[0].status, ItemStatus::Pending);
        assert_eq!(active[0].error, None);
        assert_eq!(manager.progress().get(&item.id).progress, Some(0));
    }

    #[tokio::test]
    async fn startup_recovers_interrupted_downloads() {
        let host = FakeHost::start(vec![]).await;
        let manager = manager_for(&host).await;
        let stuck = manager.enqueue(&host.page_url()).await.unwrap();
        let waiting = manager.enqueue(&host.page_url()).await.unwrap();
        manager.store().mark_downloading(&stuck.id).await.unwrap();
        manager.progress().apply(&stuck.id, ProgressUpdate::Percent(90));

        manager.startup().await.unwrap();

        let active = manager.store().active().await.unwrap();
        assert!(active.iter().all(|i| i.status == ItemStatus::Pending));
        assert!(active[0].error.is_some());
        assert_eq!(active[1], waiting);
        assert_eq!(manager.progress().get(&stuck.id).progress, Some(0));
    }

    #[tokio::test]
    async fn cancel_keeps_progress_of_completed_item() {
        let host = FakeHost::start(vec![]).await;
        let manager = manager_for(&host).await;
        let item = manager.enqueue(&host.page_url()).await.unwrap();
        manager.store().mark_downloading(&item.id).await.unwrap();
        manager.store().mark_completed(&item.id).await.unwrap();
        manager.progress().complete(&item.id);

        assert!(!manager.cancel(&item.id).await.unwrap());

        assert_eq!(manager.store().completed().await.unwrap().len(), 1);
        assert_eq!(manager.progress().get(&item.id).progress, Some(100));
    }

    #[tokio::test]
    async fn find_merges_progress_from_any_list() {
        let host = FakeHost::start(vec![]).await;
        let manager = manager_for(&host).await;
        let item = manager.enqueue(&host.page_url()).await.unwrap();
        manager.store().mark_downloading(&item.id).await.unwrap();
        manager.store().mark_failed(&item.id, "boom").await.unwrap();
        manager.progress().apply(&item.id, ProgressUpdate::Percent(12));

        let entry = manager.find(&item.id).await.unwrap().unwrap();

        assert_eq!(entry.item.status, ItemStatus::Failed);
        assert_eq!(entry.item.error.as_deref(), Some("boom"));
        assert_eq!(entry.progress.progress, Some(12));
        assert!(manager.find("missing").await.unwrap().is_none());
        assert!(matches!(manager.find("").await, Err(QueueError::Validation(_))));
    }
}
