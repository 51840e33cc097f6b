//! Persistent queue storage
//!
//! Every operation loads the lists it touches from the KV store, applies a pure
//! transition from [`super::transitions`], and writes the full lists back.
//! There is no locking across operations: concurrent edits are last-writer-wins.

use serde_json::Value;
use surrealdb::{Surreal, engine::any::Any};
use tracing::{debug, info, instrument, warn};

use super::QueueError;
use super::models::{Direction, ItemStatus, QueueItem, QueueList};
use super::transitions::{self, TransitionError};
use crate::backend::kv_config::KvStore;

/// Error stamped on items found mid-download at startup
pub const INTERRUPTED_MESSAGE: &str = "Download interrupted - please retry";

/// All four lists at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueLists {
    pub active: Vec<QueueItem>,
    pub failed: Vec<QueueItem>,
    pub completed: Vec<QueueItem>,
    pub downloaded: Vec<QueueItem>,
}

#[derive(Debug, Clone)]
pub struct QueueStore {
    kv: KvStore,
}

/// Logs a transition that did not apply and turns it into `false`.
fn applied(op: &str, result: Result<(), TransitionError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(op, error = %e, "Queue transition skipped");
            false
        }
    }
}

impl QueueStore {
    pub fn new(db: Surreal<Any>) -> Self {
        Self {
            kv: KvStore::new(db),
        }
    }

    async fn load(&self, list: QueueList) -> Result<Vec<QueueItem>, QueueError> {
        let key = list.key();
        let items = match self.kv.get(key).await? {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(other) => {
                warn!(key, value = ?other, "Invalid data under queue key, treating as empty");
                return Ok(Vec::new());
            }
        };

        Ok(items
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<QueueItem>(raw) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(key, error = %e, "Skipping undecodable queue record");
                    None
                }
            })
            .collect())
    }

    async fn save(&self, list: QueueList, items: &[QueueItem]) -> Result<(), QueueError> {
        let value = serde_json::to_value(items)?;
        self.kv.set(list.key(), value).await?;
        debug!(key = list.key(), len = items.len(), "Saved queue list");
        Ok(())
    }

    pub async fn active(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.load(QueueList::Active).await
    }

    pub async fn failed(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.load(QueueList::Failed).await
    }

    pub async fn completed(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.load(QueueList::Completed).await
    }

    pub async fn downloaded(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.load(QueueList::Downloaded).await
    }

    pub async fn all(&self) -> Result<QueueLists, QueueError> {
        Ok(QueueLists {
            active: self.active().await?,
            failed: self.failed().await?,
            completed: self.completed().await?,
            downloaded: self.downloaded().await?,
        })
    }

    /// Looks an item up in every list.
    pub async fn find(&self, id: &str) -> Result<Option<QueueItem>, QueueError> {
        for list in QueueList::ALL {
            if let Some(item) = self.load(list).await?.into_iter().find(|i| i.id == id) {
                return Ok(Some(item));
            }
        }
        warn!(id, "Could not find item in any list");
        Ok(None)
    }

    #[instrument(level = "debug", skip(self, item), fields(id = %item.id))]
    pub async fn add(&self, item: QueueItem) -> Result<(), QueueError> {
        info!(id = %item.id, "Adding item to active queue");
        let mut active = self.active().await?;
        active.push(item);
        self.save(QueueList::Active, &active).await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn remove(&self, id: &str) -> Result<bool, QueueError> {
        let mut active = self.active().await?;
        match transitions::remove(&mut active, id) {
            Ok(_) => {
                info!(id, "Removed item from active queue");
                self.save(QueueList::Active, &active).await?;
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "Item not in active queue for removal");
                Ok(false)
            }
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn move_item(&self, id: &str, direction: Direction) -> Result<bool, QueueError> {
        let mut active = self.active().await?;
        match transitions::swap_neighbour(&mut active, id, direction) {
            Ok(true) => {
                self.save(QueueList::Active, &active).await?;
                Ok(true)
            }
            Ok(false) => {
                debug!("Item already at the boundary, nothing to move");
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Item not in active queue for move");
                Ok(false)
            }
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn mark_downloading(&self, id: &str) -> Result<bool, QueueError> {
        let mut active = self.active().await?;
        let ok = applied(
            "mark_downloading",
            transitions::restamp(&mut active, id, ItemStatus::Downloading),
        );
        if ok {
            info!(id, "Item marked as downloading");
            self.save(QueueList::Active, &active).await?;
        }
        Ok(ok)
    }

    /// Applies a cross-list transition and writes the source list before the target.
    async fn transfer(
        &self,
        op: &str,
        from_list: QueueList,
        to_list: QueueList,
        id: &str,
        next: ItemStatus,
        error: Option<String>,
    ) -> Result<bool, QueueError> {
        let mut from = self.load(from_list).await?;
        let mut to = self.load(to_list).await?;
        if !applied(op, transitions::transfer(&mut from, &mut to, id, next, error)) {
            return Ok(false);
        }
        self.save(from_list, &from).await?;
        self.save(to_list, &to).await?;
        Ok(true)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn mark_completed(&self, id: &str) -> Result<bool, QueueError> {
        info!(id, "Marking item as completed");
        self.transfer(
            "mark_completed",
            QueueList::Active,
            QueueList::Completed,
            id,
            ItemStatus::Completed,
            None,
        )
        .await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<bool, QueueError> {
        tracing::error!(id, error, "Marking item as failed");
        self.transfer(
            "mark_failed",
            QueueList::Active,
            QueueList::Failed,
            id,
            ItemStatus::Failed,
            Some(error.to_string()),
        )
        .await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn mark_downloaded(&self, id: &str) -> Result<bool, QueueError> {
        info!(id, "Marking item as downloaded");
        self.transfer(
            "mark_downloaded",
            QueueList::Completed,
            QueueList::Downloaded,
            id,
            ItemStatus::Downloaded,
            None,
        )
        .await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn retry_failed(&self, id: &str) -> Result<bool, QueueError> {
        info!(id, "Retrying failed item");
        self.transfer(
            "retry_failed",
            QueueList::Failed,
            QueueList::Active,
            id,
            ItemStatus::Pending,
            None,
        )
        .await
    }

    pub async fn clear_failed(&self) -> Result<(), QueueError> {
        info!("Clearing all failed items");
        self.save(QueueList::Failed, &[]).await
    }

    pub async fn clear_completed(&self) -> Result<(), QueueError> {
        info!("Clearing all completed items");
        self.save(QueueList::Completed, &[]).await
    }

    /// Puts items left in `downloading` by a previous run back to pending.
    ///
    /// Returns the ids that were reset.
    #[instrument(level = "debug", skip(self))]
    pub async fn reset_stuck_downloads(&self) -> Result<Vec<String>, QueueError> {
        info!("Resetting stuck downloads");
        let mut active = self.active().await?;
        let reset = transitions::interrupt_downloading(&mut active, INTERRUPTED_MESSAGE);
        for id in &reset {
            warn!(id, "Reset stuck download");
        }
        if !reset.is_empty() {
            self.save(QueueList::Active, &active).await?;
        }
        Ok(reset)
    }
}
