//! Module for downloading files from the hosting site
//!
//! This module provides the scrape-then-stream download protocol, the single
//! background worker that drives it, and the in-memory progress and cancellation
//! state shared with request handlers.

mod cancel;
mod http;
mod metadata;
mod progress;
mod worker;

#[cfg(test)]
pub(crate) mod fake_host;

use thiserror::Error;

// Re-export the public API
pub use cancel::CancellationRegistry;
pub use self::http::DownloadProtocol;
pub use progress::ProgressTracker;
#[cfg(test)]
pub use progress::ProgressUpdate;
pub use worker::DownloadWorker;

/// Error stamped on items the user cancelled
pub const CANCELLED_MESSAGE: &str = "Download cancelled by user";

#[derive(Error, Debug)]
pub enum DownloadError {
    /// The page had no form whose action points at the download path
    #[error("Could not get download form")]
    FormNotFound,

    #[error("Download request failed: {0}")]
    Status(u16),

    #[error("Invalid content type: {0}")]
    ContentType(String),

    /// The host kept answering with a holding page
    #[error("Max retries reached for HTML response")]
    HoldingPage,

    #[error("{}", CANCELLED_MESSAGE)]
    Cancelled,

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}
