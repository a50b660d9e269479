//! Network collaborator: turns a station and date into program entries
//!
//! [`ProgramFetcher`] is the seam the coordinator drives. [`HttpProgramFetcher`]
//! is the shipped implementation, reading a JSON guide endpoint laid out as
//! `{base_url}/{station}/{yyyy-MM-dd}` with:
//! - Rate limiting with governor
//! - Automatic retry with exponential backoff on 429/5xx/timeouts
//! - Percent-encoded station path segments

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    Client, StatusCode,
};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use url::Url;

use crate::config::CrawlerConfig;
use crate::models::ProgramEntry;
use crate::utils::error::FetchError;
use crate::utils::format_date;
use crate::utils::retry::{retry_fetch, RetryConfig};

/// Source of program tables
#[async_trait]
pub trait ProgramFetcher: Send + Sync {
    /// Crawl the program table of `station_name` on `date`
    async fn fetch(&self, station_name: &str, date: NaiveDate)
        -> Result<Vec<ProgramEntry>, FetchError>;
}

/// One slot as published by the guide endpoint
#[derive(Debug, Deserialize)]
struct GuideSlot {
    air_time: String,
    program: String,
}

/// HTTP guide fetcher
pub struct HttpProgramFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Backoff policy for recoverable failures
    retry: RetryConfig,

    /// Guide endpoint root
    base_url: Url,
}

impl std::fmt::Debug for HttpProgramFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProgramFetcher")
            .field("base_url", &self.base_url.as_str())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HttpProgramFetcher {
    /// Create a fetcher with default retry and timeout settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidUrl` for an unparsable base URL and
    /// `FetchError::Http` if the HTTP client cannot be created
    pub fn new(base_url: &str, requests_per_second: u32) -> Result<Self, FetchError> {
        Self::with_config(
            base_url,
            requests_per_second,
            RetryConfig::default(),
            Duration::from_secs(30),
            &format!("epgcrawl/{}", env!("CARGO_PKG_VERSION")),
        )
    }

    /// Create a fetcher with custom configuration
    ///
    /// # Arguments
    ///
    /// * `base_url` - Root of the guide endpoint
    /// * `requests_per_second` - Maximum number of requests per second (0 is treated as 1)
    /// * `retry` - Backoff policy for recoverable failures
    /// * `timeout` - Request timeout duration
    /// * `user_agent` - User-Agent header value
    pub fn with_config(
        base_url: &str,
        requests_per_second: u32,
        retry: RetryConfig,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, FetchError> {
        let base_url =
            Url::parse(base_url).map_err(|e| FetchError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(base_url.to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .user_agent(user_agent)
            .default_headers(headers)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            retry,
            base_url,
        })
    }

    /// Create a fetcher from the `[crawler]` configuration section
    pub fn from_config(config: &CrawlerConfig) -> Result<Self, FetchError> {
        let rps = config.rate_limit.ceil().max(1.0) as u32;
        Self::with_config(
            &config.base_url,
            rps,
            config.retry(),
            config.request_timeout(),
            &config.user_agent,
        )
    }

    /// Guide URL for a station and date
    pub fn guide_url(&self, station_name: &str, date: NaiveDate) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(station_name)
            .push(&format_date(date));
        Ok(url)
    }

    /// One rate-limited GET; no retry
    async fn fetch_once(&self, url: &Url) -> Result<Vec<GuideSlot>, FetchError> {
        self.rate_limiter.until_ready().await;

        tracing::debug!(url = %url, "Fetching guide");

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(FetchError::Timeout),
            Err(e) => return Err(FetchError::Http(e)),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Http(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ProgramFetcher for HttpProgramFetcher {
    async fn fetch(
        &self,
        station_name: &str,
        date: NaiveDate,
    ) -> Result<Vec<ProgramEntry>, FetchError> {
        let url = self.guide_url(station_name, date)?;

        let slots = retry_fetch(&self.retry, || self.fetch_once(&url))
            .await
            .map_err(|e| match e {
                FetchError::ServerError(status) if status == StatusCode::NOT_FOUND.as_u16() => {
                    FetchError::NoGuide {
                        station: station_name.to_string(),
                        date: format_date(date),
                    }
                }
                other => other,
            })?;

        tracing::debug!(station = %station_name, date = %date, count = slots.len(), "Guide fetched");

        Ok(slots
            .into_iter()
            .map(|slot| ProgramEntry::new(station_name, date, slot.air_time, slot.program))
            .collect())
    }
}
