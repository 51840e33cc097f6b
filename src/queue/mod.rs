//! Download queue state
//!
//! Four persisted, ordered lists of items and the state machine that moves items
//! between them.

mod models;
mod store;
pub mod transitions;

use thiserror::Error;

pub use models::{Direction, ItemStatus, ProgressInfo, QueueItem};
pub use store::QueueStore;

#[derive(Error, Debug)]
pub enum QueueError {
    /// Bad input from a caller, nothing was changed
    #[error("{0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] surrealdb::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
