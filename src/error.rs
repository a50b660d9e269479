//! Unified error handling for the epgcrawl crate
//!
//! - [`Error`] - request-level error returned by the coordinator and façade
//! - [`ErrorCategory`] - classification of errors for handling strategies
//! - [`FetchError`] - network collaborator failures, wrapped by [`Error`]
//!
//! A leader's fetch failure reaches its own caller as [`Error::Fetch`] and
//! every follower of the same key as [`Error::LeaderFailed`]; all of them share
//! one [`FetchError`] behind an `Arc`.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::CrawlKey;
pub use crate::utils::error::FetchError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network fetch failures (HTTP, timeout, rate limit, decoding)
    Network,
    /// Waiting on another caller's fetch went wrong
    Coordination,
    /// Program store and I/O errors
    Storage,
    /// The request itself is invalid (unknown station, malformed date)
    Request,
    /// Configuration and validation errors
    Config,
}

/// Unified error type for the epgcrawl crate
#[derive(Error, Debug)]
pub enum Error {
    /// Station name or display name is not in the directory
    #[error("station '{name}' does not exist")]
    NotFound { name: String },

    /// Date string is not `yyyy-MM-dd`
    #[error("invalid date '{0}', expected yyyy-MM-dd")]
    InvalidDate(String),

    /// This caller's own fetch failed
    #[error("error occurred while crawling program table of {key}")]
    Fetch {
        key: CrawlKey,
        #[source]
        source: Arc<FetchError>,
    },

    /// The leader this caller waited on failed its fetch
    #[error("program table fetch of {key} failed in another request")]
    LeaderFailed {
        key: CrawlKey,
        #[source]
        source: Arc<FetchError>,
    },

    /// Waiting for another request's fetch was cancelled or abandoned
    #[error("interrupted while waiting for program table of {key}: {reason}")]
    Interrupted { key: CrawlKey, reason: String },

    /// Waiting for another request's fetch exceeded the follower deadline
    #[error("timed out after {waited:?} waiting for program table of {key}")]
    WaitTimedOut { key: CrawlKey, waited: Duration },

    /// Program store failure
    #[error("storage error: {0}")]
    Storage(String),

    /// SQLite errors
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch { .. } | Self::LeaderFailed { .. } => ErrorCategory::Network,
            Self::Interrupted { .. } | Self::WaitTimedOut { .. } => ErrorCategory::Coordination,
            Self::Storage(_) | Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::NotFound { .. } | Self::InvalidDate(_) => ErrorCategory::Request,
            Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// Check if a later identical request could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch { source, .. } => source.is_recoverable(),
            Self::LeaderFailed { source, .. } => source.is_recoverable(),
            Self::Interrupted { .. } | Self::WaitTimedOut { .. } => true,
            Self::Io(_) => true,
            Self::NotFound { .. }
            | Self::InvalidDate(_)
            | Self::Storage(_)
            | Self::Database(_)
            | Self::Config(_) => false,
        }
    }

    /// Crawl key the error is about, if it arose inside the coordinator
    pub fn key(&self) -> Option<&CrawlKey> {
        match self {
            Self::Fetch { key, .. }
            | Self::LeaderFailed { key, .. }
            | Self::Interrupted { key, .. }
            | Self::WaitTimedOut { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
