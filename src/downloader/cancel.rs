//! Cancellation signals for in-flight downloads

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a fresh signal for `id`.
    ///
    /// The entry lives exactly as long as the returned guard.
    pub fn register(&self, id: &str) -> CancellationGuard<'_> {
        let token = CancellationToken::new();
        self.lock().insert(id.to_string(), token.clone());
        debug!(id, "Registered cancellation token");
        CancellationGuard {
            registry: self,
            id: id.to_string(),
            token,
        }
    }

    /// Signals the download for `id`. Returns `false` when nothing is in flight for it.
    pub fn cancel(&self, id: &str) -> bool {
        match self.lock().get(id) {
            Some(token) => {
                info!(id, "Signalling cancellation");
                token.cancel();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Keeps a registry entry alive; removes it on drop, including on panic or task abort.
#[derive(Debug)]
pub struct CancellationGuard<'a> {
    registry: &'a CancellationRegistry,
    id: String,
    token: CancellationToken,
}

impl CancellationGuard<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for CancellationGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
        debug!(id = %self.id, "Removed cancellation token");
    }
}
