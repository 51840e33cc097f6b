//! Data structures for the download queue
//!
//! Queue items, their status machine, and the names of the persisted lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use ulid::Ulid;

/// Status of a queue item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Waiting in the active list for the worker
    #[default]
    Pending,
    /// Currently being transferred
    Downloading,
    /// File fully written to the download directory
    Completed,
    /// Transfer failed or was cancelled
    Failed,
    /// User confirmed they fetched the completed file
    Downloaded,
}

impl ItemStatus {
    /// The list an item with this status lives in
    #[cfg(test)]
    pub fn list(self) -> QueueList {
        match self {
            Self::Pending | Self::Downloading => QueueList::Active,
            Self::Completed => QueueList::Completed,
            Self::Failed => QueueList::Failed,
            Self::Downloaded => QueueList::Downloaded,
        }
    }

    /// Whether `self -> next` is one of the legal transitions.
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Downloading)
                | (Self::Downloading, Self::Completed)
                | (Self::Downloading, Self::Failed)
                | (Self::Completed, Self::Downloaded)
                | (Self::Failed, Self::Pending)
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Downloading => write!(f, "downloading"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Downloaded => write!(f, "downloaded"),
        }
    }
}

/// One of the four persisted lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueList {
    Active,
    Failed,
    Completed,
    Downloaded,
}

impl QueueList {
    pub const ALL: [QueueList; 4] = [
        QueueList::Active,
        QueueList::Failed,
        QueueList::Completed,
        QueueList::Downloaded,
    ];

    /// Storage key of the list
    pub fn key(self) -> &'static str {
        match self {
            Self::Active => "queue_active",
            Self::Failed => "queue_failed",
            Self::Completed => "queue_completed",
            Self::Downloaded => "queue_downloaded",
        }
    }
}

/// Direction for reordering the active list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(format!("Invalid direction: {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub id: String,
    pub url: String,
    pub title: String,
    pub size: String,
    #[serde(default)]
    pub status: ItemStatus,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
}

impl QueueItem {
    /// Creates a new pending item with a fresh ULID and the current time.
    pub fn new(url: impl Into<String>, title: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            id: Ulid::new().to_string(),
            url: url.into(),
            title: title.into(),
            size: size.into(),
            status: ItemStatus::Pending,
            added_at: Utc::now(),
            error: None,
        }
    }
}

/// Completion estimate of one item, held in memory only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressInfo {
    /// Percent complete, `None` while the total size is unknown
    pub progress: Option<u8>,
    /// Human readable throughput, empty when idle
    pub speed: String,
}

impl Default for ProgressInfo {
    fn default() -> Self {
        Self {
            progress: Some(0),
            speed: String::new(),
        }
    }
}
