//! epgcrawl - TV program guide crawler
//!
//! Fetches daily program tables for many broadcast stations, using a local
//! store as a cache in front of a slow, rate-sensitive network source.
//!
//! # Architecture
//!
//! - [`crawler`] - single-flight coordination, paced fan-out, HTTP fetcher
//! - [`storage`] - program table persistence (memory, SQLite)
//! - [`directory`] - station name and alias lookup
//! - [`service`] - request façade tying the pieces together
//! - [`config`] - configuration management and settings
//! - [`models`] - core data structures and types
//! - [`error`] - unified error type
//!
//! # Example
//!
//! ```no_run
//! use epgcrawl::config::Config;
//! use epgcrawl::service::ProgramGuide;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let guide = ProgramGuide::from_config(&config, CancellationToken::new())?;
//!     let table = guide.query_program_table("CCTV-1", None, "2015-03-27").await?;
//!     println!("{} programs", table.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod directory;
pub mod error;
pub mod models;
pub mod service;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{FanoutAggregator, FanoutReport, ProgramFetcher, SingleFlight};
    pub use crate::directory::{StaticDirectory, StationDirectory};
    pub use crate::error::{Error, ErrorCategory, FetchError, Result};
    pub use crate::models::{CrawlKey, ProgramEntry, Station};
    pub use crate::service::ProgramGuide;
    pub use crate::storage::{MemoryProgramStore, ProgramStore, SqliteProgramStore};
}

// Direct re-exports for convenience
pub use models::{CrawlKey, ProgramEntry, Station};
