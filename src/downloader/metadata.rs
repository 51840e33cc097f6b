//! Display metadata scraped from a file's landing page

use reqwest::Client;
use scraper::{Html, Selector};

use super::DownloadError;

pub const UNKNOWN_TITLE: &str = "Unknown";
pub const UNKNOWN_SIZE: &str = "Unknown size";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub title: String,
    pub size: String,
}

impl Default for FileMetadata {
    fn default() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            size: UNKNOWN_SIZE.to_string(),
        }
    }
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let element = document.select(&selector).next()?;
    let text = element.text().collect::<String>().trim().to_string();
    if text.is_empty() {
        element.value().attr("title").map(|t| t.trim().to_string())
    } else {
        Some(text)
    }
}

/// Reads the title heading and size cell, with placeholders for whatever is missing.
pub fn parse_metadata(html: &str) -> FileMetadata {
    let document = Html::parse_document(html);
    let defaults = FileMetadata::default();
    FileMetadata {
        title: first_text(&document, "h1.section_title").unwrap_or(defaults.title),
        size: first_text(&document, "td.footer-video-size").unwrap_or(defaults.size),
    }
}

#[tracing::instrument(level = "debug", skip(client))]
pub async fn scrape(client: &Client, url: &str) -> Result<FileMetadata, DownloadError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        tracing::warn!(status = %response.status(), "Landing page returned an error");
        return Err(DownloadError::Status(response.status().as_u16()));
    }
    let body = response.text().await?;
    Ok(parse_metadata(&body))
}
