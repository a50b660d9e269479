//! Program table persistence
//!
//! The store is the crawl cache: a (station, date) pair present here is never
//! fetched from the network again.
//!
//! - [`MemoryProgramStore`] - process-local map, used by tests and as fallback
//! - [`SqliteProgramStore`] - on-disk table backed by SQLite

mod sqlite;

pub use sqlite::SqliteProgramStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::Result;
use crate::models::{CrawlKey, ProgramEntry};

/// Storage of crawled program tables
#[async_trait]
pub trait ProgramStore: Send + Sync {
    /// Whether a table for the station and date has been stored
    async fn exists(&self, station_name: &str, date: NaiveDate) -> Result<bool>;

    /// Stored entries for the station and date; empty if none
    async fn get(&self, station_name: &str, date: NaiveDate) -> Result<Vec<ProgramEntry>>;

    /// Replace the stored table for the station and date
    async fn save(&self, station_name: &str, date: NaiveDate, entries: &[ProgramEntry])
        -> Result<()>;
}

/// In-memory program store
#[derive(Debug, Default)]
pub struct MemoryProgramStore {
    tables: RwLock<HashMap<CrawlKey, Vec<ProgramEntry>>>,
}

impl MemoryProgramStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored (station, date) tables
    pub fn len(&self) -> usize {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProgramStore for MemoryProgramStore {
    async fn exists(&self, station_name: &str, date: NaiveDate) -> Result<bool> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.contains_key(&CrawlKey::new(station_name, date)))
    }

    async fn get(&self, station_name: &str, date: NaiveDate) -> Result<Vec<ProgramEntry>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .get(&CrawlKey::new(station_name, date))
            .cloned()
            .unwrap_or_default())
    }

    async fn save(
        &self,
        station_name: &str,
        date: NaiveDate,
        entries: &[ProgramEntry],
    ) -> Result<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        tables.insert(CrawlKey::new(station_name, date), entries.to_vec());
        Ok(())
    }
}
