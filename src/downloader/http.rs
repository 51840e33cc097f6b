//! HTTP download implementation
//!
//! Scrapes the hosting page for its hidden download form, submits it, and streams
//! the answer to disk. Holding pages (`text/html` answers to the submit) are retried
//! with exponential backoff in a bounded loop.

use futures_util::StreamExt;
use reqwest::{
    Client, Response, StatusCode, Url,
    header::{self, HeaderValue},
};
use scraper::{Html, Selector};
use std::{io, path::PathBuf, time::Instant};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tokio_util::{io::StreamReader, sync::CancellationToken};
use tracing::{debug, info, instrument, trace, warn};

use super::DownloadError;
use super::metadata::{self, FileMetadata};
use super::progress::{ProgressMeter, ProgressTracker, ProgressUpdate};
use crate::config::DownloaderConfig;
use crate::queue::QueueItem;

const ALLOWED_CONTENT_TYPES: [&str; 2] =
    ["application/octet-stream", "application/force-download"];
const ALLOWED_CONTENT_PREFIXES: [&str; 2] = ["video/", "audio/"];

/// Whether a submit response carries the file itself
pub fn is_allowed_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    ALLOWED_CONTENT_TYPES
        .iter()
        .any(|allowed| content_type.contains(allowed))
        || ALLOWED_CONTENT_PREFIXES
            .iter()
            .any(|prefix| content_type.starts_with(prefix))
}

/// Keeps alphanumerics, space, dash, underscore and dot.
pub fn sanitize_filename(title: &str) -> String {
    let name: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
        .collect();
    let name = name.trim_end();
    if name.is_empty() || name.chars().all(|c| c == '.') {
        "download".to_string()
    } else {
        name.to_string()
    }
}

/// Picks the download form's action out of a page.
///
/// The first form wins if its action starts with `prefix`, otherwise the first form
/// in document order that does.
pub fn select_form_action(html: &str, prefix: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("form").ok()?;
    let mut forms = document.select(&selector);

    let first = forms.next()?;
    let matches = |action: &&str| action.starts_with(prefix);

    if let Some(action) = first.value().attr("action").filter(matches) {
        return Some(action.to_string());
    }
    forms
        .filter_map(|form| form.value().attr("action"))
        .find(matches)
        .map(str::to_string)
}

fn content_type(response: &Response) -> String {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[derive(Debug, Clone)]
pub struct DownloadProtocol {
    config: DownloaderConfig,
}

impl DownloadProtocol {
    pub fn new(config: DownloaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// A client with its own cookie jar; the site ties the form to the first visit.
    fn client(&self) -> Result<Client, DownloadError> {
        Ok(Client::builder()
            .cookie_store(true)
            .user_agent(self.config.user_agent.as_str())
            .build()?)
    }

    /// Best-effort title and size for display, placeholders on any failure.
    pub async fn file_metadata(&self, url: &str) -> FileMetadata {
        let result = match self.client() {
            Ok(client) => metadata::scrape(&client, url).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            warn!(url, error = %e, "Could not scrape file info, using placeholders");
            FileMetadata::default()
        })
    }

    /// Visits the page twice and resolves the download form's action.
    #[instrument(level = "debug", skip(self, client))]
    pub async fn find_form_action(
        &self,
        client: &Client,
        page_url: &str,
    ) -> Result<Url, DownloadError> {
        // priming visit, the form only shows up on the second load
        let priming = client.get(page_url).send().await?;
        trace!(status = %priming.status(), "Priming visit done");
        drop(priming);

        let html = client.get(page_url).send().await?.text().await?;
        let action = select_form_action(&html, &self.config.form_prefix).ok_or_else(|| {
            warn!(url = page_url, "No download form on page");
            DownloadError::FormNotFound
        })?;

        let resolved = Url::parse(page_url)?.join(&action)?;
        debug!(action = %resolved, "Resolved download form");
        Ok(resolved)
    }

    /// Fetches the form and submits it until the host answers with a file.
    ///
    /// At most `html_attempts` submits are made; a holding page before the last
    /// attempt waits `2^(retry-1)` backoff units before trying again.
    #[instrument(level = "debug", skip(self, item, token), fields(id = %item.id))]
    pub async fn submit(
        &self,
        item: &QueueItem,
        token: &CancellationToken,
    ) -> Result<Response, DownloadError> {
        let attempts = self.config.html_attempts.max(1);

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.config.backoff_for(attempt);
                info!(
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Holding page received, waiting before retry"
                );
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Download cancelled during retry wait");
                        return Err(DownloadError::Cancelled);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let client = self.client()?;
            let action = self.find_form_action(&client, &item.url).await?;

            // empty form post, no request timeout
            let response = client
                .post(action)
                .header(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                )
                .body("")
                .send()
                .await?;

            if response.status() != StatusCode::OK {
                warn!(status = %response.status(), "Download request failed");
                return Err(DownloadError::Status(response.status().as_u16()));
            }

            let content_type = content_type(&response);
            if is_allowed_content_type(&content_type) {
                return Ok(response);
            }
            if content_type.contains("text/html") {
                warn!(attempt = attempt + 1, "Unexpected content type: {}", content_type);
                continue;
            }
            return Err(DownloadError::ContentType(content_type));
        }

        Err(DownloadError::HoldingPage)
    }

    /// Runs the whole protocol for one item and returns where the file was written.
    ///
    /// Status transitions are left to the caller.
    #[instrument(
        name = "download_file",
        level = "debug",
        skip(self, item, token, progress),
        fields(id = %item.id, url = %item.url)
    )]
    pub async fn download(
        &self,
        item: &QueueItem,
        token: &CancellationToken,
        progress: &ProgressTracker,
    ) -> Result<PathBuf, DownloadError> {
        let response = self.submit(item, token).await?;
        self.stream_to_file(response, item, token, progress).await
    }

    async fn stream_to_file(
        &self,
        response: Response,
        item: &QueueItem,
        token: &CancellationToken,
        progress: &ProgressTracker,
    ) -> Result<PathBuf, DownloadError> {
        tokio::fs::create_dir_all(&self.config.download_dir).await?;
        let path = self.config.download_dir.join(sanitize_filename(&item.title));

        let total_size = response.content_length();
        match total_size {
            Some(size) => info!(bytes = size, path = ?path, "Starting download"),
            None => info!(path = ?path, "Starting download of unknown size"),
        }

        let mut file = File::create(&path).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other));
        let reader = StreamReader::new(stream);
        tokio::pin!(reader);

        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        let mut meter =
            ProgressMeter::new(total_size, self.config.progress_interval(), Instant::now());
        let mut next_milestone = 25u8;

        loop {
            let read = reader.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            file.write_all(&buf[..read]).await?;
            trace!(bytes = meter.downloaded() + read as u64, chunk_size = read, "Wrote chunk");

            if token.is_cancelled() {
                info!(downloaded = meter.downloaded(), "Download cancelled during transfer");
                // the partial file stays where it is
                file.flush().await?;
                return Err(DownloadError::Cancelled);
            }

            if let Some(update) = meter.record(read as u64, Instant::now()) {
                let percent = match &update {
                    ProgressUpdate::Full { progress, .. } => *progress,
                    ProgressUpdate::Percent(p) => Some(*p),
                };
                if let Some(percent) = percent.filter(|p| *p >= next_milestone && *p < 100) {
                    info!(
                        percentage = percent,
                        bytes = meter.downloaded(),
                        total = meter.total_size(),
                        "Download milestone"
                    );
                    next_milestone = (percent / 25 + 1) * 25;
                }
                progress.apply(&item.id, update);
            }
        }

        file.flush().await?;
        file.shutdown().await?;
        info!(bytes = meter.downloaded(), "Download completed");
        Ok(path)
    }
}
