use std::time::Duration;

use crate::error::{AppError, Result};

pub const MARKETS_API_URL: &str = "http://localhost:8080/api";

/// Seconds between snapshot fetches from the source.
pub const POLL_INTERVAL_SECS: u64 = 30;

/// A snapshot younger than this is served without re-fetching on refresh requests.
pub const STALE_AFTER_SECS: u64 = 10;

/// Cache lifetime of per-symbol detail and chart responses.
pub const DETAIL_STALE_SECS: u64 = 60;

/// Price history older than this is pruned by the history writer.
pub const HISTORY_RETENTION_HOURS: i64 = 720;

/// Delays between fetch attempts within one poll, in milliseconds.
/// A poll makes `len() + 1` attempts before recording the failure.
pub const POLL_RETRY_BACKOFF_MS: &[u64] = &[250, 500, 1000];

/// Timeout applied to every upstream HTTP request.
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// Channel capacity for snapshot fan-out and refresh requests.
pub const CHANNEL_CAPACITY: usize = 64;

/// Result limits of the dashboard panels.
pub mod panel_limits {
    pub const SEARCH_HITS: usize = 10;
    pub const TRENDING: usize = 3;
    pub const RELATED: usize = 4;
}

/// Which market source backs the snapshot store. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Fixture,
    Http,
}

impl std::str::FromStr for SourceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fixture" | "mock" => Ok(SourceKind::Fixture),
            "http" | "remote" => Ok(SourceKind::Http),
            other => Err(AppError::Config(format!(
                "DATA_SOURCE must be `fixture` or `http`, got `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// DATA_SOURCE: `fixture` (default) or `http`
    pub source: SourceKind,
    /// Base URL of the remote markets API (MARKETS_API_URL)
    pub markets_api_url: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// POLL_INTERVAL_SECS
    pub poll_interval: Duration,
    /// STALE_AFTER_SECS
    pub stale_after: Duration,
    /// DETAIL_STALE_SECS
    pub detail_stale_after: Duration,
    /// HISTORY_RETENTION_HOURS
    pub history_retention_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let poll_secs = env_parse("POLL_INTERVAL_SECS", POLL_INTERVAL_SECS);
        if poll_secs == 0 {
            return Err(AppError::Config("POLL_INTERVAL_SECS must be at least 1".to_string()));
        }

        Ok(Self {
            source: std::env::var("DATA_SOURCE")
                .unwrap_or_else(|_| "fixture".to_string())
                .parse()?,
            markets_api_url: std::env::var("MARKETS_API_URL")
                .unwrap_or_else(|_| MARKETS_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "dashboard.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            poll_interval: Duration::from_secs(poll_secs),
            stale_after: Duration::from_secs(env_parse("STALE_AFTER_SECS", STALE_AFTER_SECS)),
            detail_stale_after: Duration::from_secs(env_parse(
                "DETAIL_STALE_SECS",
                DETAIL_STALE_SECS,
            )),
            history_retention_hours: env_parse("HISTORY_RETENTION_HOURS", HISTORY_RETENTION_HOURS),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
