//! In-memory progress tracking
//!
//! [`ProgressTracker`] is the shared map the UI reads from, [`ProgressMeter`] decides
//! when a streaming download should publish to it.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crate::queue::ProgressInfo;

/// Formats a byte rate as `B/s`, `KB/s` or `MB/s` with one decimal.
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= 1024.0 * 1024.0 {
        format!("{:.1} MB/s", bytes_per_sec / (1024.0 * 1024.0))
    } else if bytes_per_sec >= 1024.0 {
        format!("{:.1} KB/s", bytes_per_sec / 1024.0)
    } else {
        format!("{:.1} B/s", bytes_per_sec)
    }
}

/// An update a meter wants published
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressUpdate {
    /// Interval elapsed: percent (if known) and a fresh throughput estimate
    Full { progress: Option<u8>, speed: String },
    /// Percent moved before the interval elapsed
    Percent(u8),
}

/// Turns a stream of chunk sizes into throttled progress updates.
#[derive(Debug)]
pub struct ProgressMeter {
    total_size: Option<u64>,
    downloaded: u64,
    since_last_update: u64,
    last_update: Instant,
    last_progress: Option<u8>,
    interval: Duration,
}

impl ProgressMeter {
    pub fn new(total_size: Option<u64>, interval: Duration, now: Instant) -> Self {
        Self {
            total_size: total_size.filter(|&t| t > 0),
            downloaded: 0,
            since_last_update: 0,
            last_update: now,
            last_progress: None,
            interval,
        }
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    fn progress(&self) -> Option<u8> {
        self.total_size
            .map(|total| (self.downloaded.saturating_mul(100) / total).min(100) as u8)
    }

    /// Accounts for `bytes` more bytes written at `now`.
    pub fn record(&mut self, bytes: u64, now: Instant) -> Option<ProgressUpdate> {
        self.downloaded += bytes;
        self.since_last_update += bytes;

        let elapsed = now.saturating_duration_since(self.last_update);
        if elapsed >= self.interval {
            let secs = elapsed.as_secs_f64();
            let speed = if secs > 0.0 {
                format_speed(self.since_last_update as f64 / secs)
            } else {
                format_speed(0.0)
            };
            let progress = self.progress();

            self.last_update = now;
            self.since_last_update = 0;
            if progress.is_some() {
                self.last_progress = progress;
            }
            return Some(ProgressUpdate::Full { progress, speed });
        }

        let progress = self.progress()?;
        if self.last_progress.is_none_or(|last| progress > last) {
            self.last_progress = Some(progress);
            return Some(ProgressUpdate::Percent(progress));
        }
        None
    }
}

/// Shared map from item id to its current progress
#[derive(Debug, Default)]
pub struct ProgressTracker {
    entries: Mutex<HashMap<String, ProgressInfo>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProgressInfo>> {
        // a panic while holding the lock cannot leave a half-written entry behind
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Zeroes the entry, creating it if needed.
    pub fn reset(&self, id: &str) {
        self.lock().insert(id.to_string(), ProgressInfo::default());
    }

    pub fn apply(&self, id: &str, update: ProgressUpdate) {
        let mut entries = self.lock();
        let entry = entries.entry(id.to_string()).or_default();
        match update {
            ProgressUpdate::Full { progress, speed } => {
                entry.progress = progress;
                entry.speed = speed;
            }
            ProgressUpdate::Percent(progress) => entry.progress = Some(progress),
        }
    }

    /// Marks the entry as finished.
    pub fn complete(&self, id: &str) {
        self.lock().insert(
            id.to_string(),
            ProgressInfo {
                progress: Some(100),
                speed: String::new(),
            },
        );
    }

    /// Current value, zeroed for unknown ids.
    pub fn get(&self, id: &str) -> ProgressInfo {
        self.lock().get(id).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self) -> HashMap<String, ProgressInfo> {
        self.lock().clone()
    }
}
