//! Configuration management for epgcrawl
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network fetcher configuration
    pub crawler: CrawlerConfig,

    /// Single-flight coordinator configuration
    pub coordinator: CoordinatorConfig,

    /// Fan-out aggregator configuration
    pub fanout: FanoutConfig,

    /// Program store configuration
    pub storage: StorageConfig,

    /// Station directory configuration
    pub stations: StationsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Network fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Root URL of the guide endpoint
    pub base_url: String,

    /// Rate limit (requests per second)
    pub rate_limit: f64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Retries for recoverable failures
    pub max_retries: u32,

    /// User agent string
    pub user_agent: String,
}

/// Single-flight coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// How long a follower waits for the leader's fetch, in seconds
    ///
    /// Must cover the leader's worst case, see [`CrawlerConfig::max_fetch_duration`].
    pub follower_timeout_secs: u64,
}

/// Fan-out aggregator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Stations crawled concurrently, shared by all fan-out calls
    pub pool_size: usize,

    /// Delay between successive task submissions in milliseconds (0 disables pacing)
    pub submit_interval_ms: u64,
}

/// Program store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path; unset or empty keeps tables in memory
    pub sqlite_path: Option<PathBuf>,
}

/// Station directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationsConfig {
    /// TOML file listing stations
    pub path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("http://localhost:8080/epg"),
            rate_limit: 2.0,
            request_timeout_secs: 30,
            max_retries: 3,
            user_agent: format!("epgcrawl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl CrawlerConfig {
    /// Per-request timeout
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff policy for recoverable failures
    #[must_use]
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
    }

    /// Longest a single fetch can take when every attempt times out
    ///
    /// Rate limiter waits come on top of this.
    #[must_use]
    pub fn max_fetch_duration(&self) -> Duration {
        let retry = self.retry();
        self.request_timeout()
            .saturating_mul(retry.attempts())
            .saturating_add(retry.total_backoff())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            follower_timeout_secs: 180,
        }
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            submit_interval_ms: 100,
        }
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stations.toml"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `EPGCRAWL_*` environment variables
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("EPGCRAWL_BASE_URL") {
            self.crawler.base_url = v;
        }
        if let Some(v) = env_parse("EPGCRAWL_RATE_LIMIT") {
            self.crawler.rate_limit = v;
        }
        if let Some(v) = env_parse("EPGCRAWL_REQUEST_TIMEOUT") {
            self.crawler.request_timeout_secs = v;
        }
        if let Some(v) = env_parse("EPGCRAWL_MAX_RETRIES") {
            self.crawler.max_retries = v;
        }
        if let Ok(v) = std::env::var("EPGCRAWL_USER_AGENT") {
            self.crawler.user_agent = v;
        }
        if let Some(v) = env_parse("EPGCRAWL_FOLLOWER_TIMEOUT") {
            self.coordinator.follower_timeout_secs = v;
        }
        if let Some(v) = env_parse("EPGCRAWL_POOL_SIZE") {
            self.fanout.pool_size = v;
        }
        if let Some(v) = env_parse("EPGCRAWL_SUBMIT_INTERVAL_MS") {
            self.fanout.submit_interval_ms = v;
        }
        if let Ok(v) = std::env::var("EPGCRAWL_SQLITE_PATH") {
            self.storage.sqlite_path = Some(PathBuf::from(v));
        }
        // An empty path means "no database" wherever it came from.
        self.storage.sqlite_path = self
            .storage
            .sqlite_path
            .take()
            .filter(|p| !p.as_os_str().is_empty());
        if let Ok(v) = std::env::var("EPGCRAWL_STATIONS") {
            self.stations.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("EPGCRAWL_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("EPGCRAWL_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.fanout.pool_size == 0 {
            anyhow::bail!("fanout.pool_size must be greater than 0");
        }

        if self.crawler.rate_limit <= 0.0 {
            anyhow::bail!("crawler.rate_limit must be positive");
        }

        if self.coordinator.follower_timeout_secs == 0 {
            anyhow::bail!("coordinator.follower_timeout_secs must be greater than 0");
        }

        let worst_case = self.crawler.max_fetch_duration();
        if self.follower_timeout() < worst_case {
            anyhow::bail!(
                "coordinator.follower_timeout_secs ({}s) is shorter than a leader's worst-case fetch \
                 ({}s = {} attempts x {}s request timeout + {}s backoff)",
                self.coordinator.follower_timeout_secs,
                worst_case.as_secs_f64().ceil(),
                self.crawler.retry().attempts(),
                self.crawler.request_timeout_secs,
                self.crawler.retry().total_backoff().as_secs_f64()
            );
        }

        if self.crawler.base_url.trim().is_empty() {
            anyhow::bail!("crawler.base_url must not be empty");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!(
                "logging.format must be 'text' or 'json', got '{}'",
                self.logging.format
            );
        }

        Ok(())
    }

    /// Get follower wait deadline as Duration
    #[must_use]
    pub fn follower_timeout(&self) -> Duration {
        Duration::from_secs(self.coordinator.follower_timeout_secs)
    }

    /// Get fan-out submission interval as Duration
    #[must_use]
    pub fn submit_interval(&self) -> Duration {
        Duration::from_millis(self.fanout.submit_interval_ms)
    }
}
