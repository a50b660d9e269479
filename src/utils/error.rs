//! Error types for the network collaborator
//!
//! [`FetchError`] is what a [`ProgramFetcher`](crate::crawler::fetcher::ProgramFetcher)
//! reports when a guide page cannot be retrieved or decoded.

use thiserror::Error;

/// Errors that can occur while fetching a program table from the network
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts exceeded after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },

    /// Response body could not be decoded into program entries
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Station is known to the directory but the source has no guide for it
    #[error("No program guide published for {station} on {date}")]
    NoGuide { station: String, date: String },
}

impl FetchError {
    /// Whether another attempt against the same source could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::RateLimit | Self::Timeout => true,
            Self::ServerError(status) => matches!(status, 500 | 502 | 503 | 504),
            Self::MaxRetriesExceeded { .. }
            | Self::Decode(_)
            | Self::InvalidUrl(_)
            | Self::NoGuide { .. } => false,
        }
    }

    /// Map a non-success HTTP status to the matching variant
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimit,
            other => Self::ServerError(other),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
