//! Retry with exponential backoff for network fetches

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::utils::error::FetchError;

/// Backoff policy for guide requests
///
/// Attempt `n` (1-based retry count) waits `base_delay_ms * backoff_multiplier^(n-1)`,
/// capped at `max_delay_ms`. The first attempt never waits.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Wait before the first retry, in milliseconds
    pub base_delay_ms: u64,

    /// Ceiling for any single wait, in milliseconds
    pub max_delay_ms: u64,

    /// Growth factor between consecutive waits
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::with_delays(3, 1000, 30_000)
    }
}

impl RetryConfig {
    /// `max_retries` retries with the default 1 s doubling backoff
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Doubling backoff starting at `base_delay_ms`, capped at `max_delay_ms`
    pub fn with_delays(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier: 2.0,
        }
    }

    /// Total attempts, the first one included
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let grown = self.base_delay_ms as f64 * self.backoff_multiplier.powi(retry as i32 - 1);
        Duration::from_millis((grown as u64).min(self.max_delay_ms))
    }

    /// Sum of every wait a fully failing fetch sleeps through
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_retries).map(|retry| self.backoff(retry)).sum()
    }
}

/// Run a fetch, retrying recoverable [`FetchError`]s with exponential backoff
///
/// Non-recoverable errors are returned as-is on the first occurrence. When
/// every attempt failed with a recoverable error the result is
/// [`FetchError::MaxRetriesExceeded`].
pub async fn retry_fetch<T, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, FetchError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = config.backoff(attempt);
            debug!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying fetch after delay"
            );
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt, "Fetch succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    attempt = attempt,
                    max_retries = config.max_retries,
                    error = %e,
                    "Fetch failed, will retry"
                );
            }
            Err(e) => {
                warn!(error = %e, "Non-retryable fetch error");
                return Err(e);
            }
        }
    }

    Err(FetchError::MaxRetriesExceeded {
        attempts: config.attempts(),
    })
}
