//! Config module for shareq

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

pub const DEFAULT_ALLOWED_DOMAIN: &str = "fastshare.cloud";
pub const DEFAULT_FORM_PREFIX: &str = "/free/";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(ValueEnum, Debug, Clone, Default)]
#[clap(rename_all = "lowercase")]
pub enum DatabaseAuthMethod {
    #[default]
    None,
    Root,
}

#[derive(Parser, Debug, Clone)]
pub struct DatabaseConfig {
    #[clap(long, env = "SHAREQ_DATABASE_URL", default_value = "surrealkv://./database")]
    pub database_url: String,

    #[clap(long, env = "SHAREQ_DATABASE_AUTH_METHOD", value_enum, default_value = "none")]
    pub db_auth_method: DatabaseAuthMethod,

    #[clap(long, env = "SHAREQ_SURREAL_ROOT_USERNAME", default_value = "root")]
    #[clap(required_if_eq("db_auth_method", "root"))]
    pub root_username: Option<String>,

    #[clap(long, env = "SHAREQ_SURREAL_ROOT_PASSWORD", default_value = "root")]
    #[clap(required_if_eq("db_auth_method", "root"))]
    pub root_password: Option<String>,

    #[clap(long, env = "SHAREQ_SURREAL_NAMESPACE", default_value = "shareq")]
    pub db_namespace: String,

    #[clap(long, env = "SHAREQ_SURREAL_DATABASE", default_value = "shareq")]
    pub db_database: String,
}

/// Tunables for the download worker and the scrape-then-stream protocol
#[derive(Parser, Debug, Clone)]
pub struct DownloaderConfig {
    /// Directory finished (and partial) downloads are written to
    #[clap(long, env = "SHAREQ_DOWNLOAD_DIR", default_value = "downloads")]
    pub download_dir: PathBuf,

    /// Only links on this host (or its subdomains) are accepted
    #[clap(long, env = "SHAREQ_ALLOWED_DOMAIN", default_value = DEFAULT_ALLOWED_DOMAIN)]
    pub allowed_domain: String,

    /// Path prefix identifying the hidden download form's action
    #[clap(long, env = "SHAREQ_FORM_PREFIX", default_value = DEFAULT_FORM_PREFIX)]
    pub form_prefix: String,

    #[clap(long, env = "SHAREQ_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Size of each streamed chunk, in bytes
    #[clap(long, env = "SHAREQ_CHUNK_SIZE", default_value_t = 8192)]
    pub chunk_size: usize,

    /// Minimum interval between throughput updates, in milliseconds
    #[clap(long, env = "SHAREQ_PROGRESS_INTERVAL_MS", default_value_t = 1000)]
    pub progress_interval_ms: u64,

    /// Pause after each processed item, in seconds
    #[clap(long, env = "SHAREQ_COOLDOWN_SECS", default_value_t = 30)]
    pub cooldown_secs: u64,

    /// Pause when nothing is pending, in seconds
    #[clap(long, env = "SHAREQ_IDLE_SECS", default_value_t = 2)]
    pub idle_secs: u64,

    /// Pause after a failed worker iteration, in seconds
    #[clap(long, env = "SHAREQ_ERROR_BACKOFF_SECS", default_value_t = 5)]
    pub error_backoff_secs: u64,

    /// Total submit attempts when the host answers with a holding page
    #[clap(long, env = "SHAREQ_HTML_ATTEMPTS", default_value_t = 3)]
    pub html_attempts: u32,

    /// Base unit of the holding-page backoff, in milliseconds
    #[clap(long, env = "SHAREQ_BACKOFF_UNIT_MS", default_value_t = 1000)]
    pub backoff_unit_ms: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            allowed_domain: DEFAULT_ALLOWED_DOMAIN.to_string(),
            form_prefix: DEFAULT_FORM_PREFIX.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            chunk_size: 8192,
            progress_interval_ms: 1000,
            cooldown_secs: 30,
            idle_secs: 2,
            error_backoff_secs: 5,
            html_attempts: 3,
            backoff_unit_ms: 1000,
        }
    }
}

impl DownloaderConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    /// Wait before the given holding-page retry (1-based): 2^(retry-1) units
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.backoff_unit_ms.saturating_mul(factor))
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct Config {
    #[clap(long, env = "SHAREQ_HOST", default_value = "0.0.0.0:8080")]
    pub host: String,

    /// Tracing filter used when RUST_LOG is not set
    #[clap(long, env = "SHAREQ_LOG", default_value = "info")]
    pub log_filter: String,

    #[clap(flatten)]
    pub db_config: DatabaseConfig,

    #[clap(flatten)]
    pub downloader: DownloaderConfig,
}

pub fn config() -> Config {
    Config::parse()
}
