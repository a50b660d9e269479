//! Core data structures and types
//!
//! - [`CrawlKey`] identifies one unit of crawl work: a station on a date
//! - [`Station`] is a directory entry
//! - [`ProgramEntry`] is one row of a station's daily program table

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::format_date;

/// One (station, date) unit of crawl work
///
/// Two keys name the same work iff both fields match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CrawlKey {
    station_name: String,
    date: NaiveDate,
}

impl CrawlKey {
    /// Create a key for a station name and date
    pub fn new(station_name: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            station_name: station_name.into(),
            date,
        }
    }

    /// Station name (the directory's canonical name, not the display name)
    pub fn station_name(&self) -> &str {
        &self.station_name
    }

    /// Guide date
    pub fn date(&self) -> NaiveDate {
        self.date
    }
}

impl fmt::Display for CrawlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.station_name, format_date(self.date))
    }
}

/// TV station as known to the station directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    /// Canonical station name, used as the crawl key
    pub name: String,

    /// Name shown to users; several classifies may share one display name
    #[serde(default)]
    pub display_name: Option<String>,

    /// Station category (e.g. "cctv", "satellite", "local")
    #[serde(default)]
    pub classify: Option<String>,

    /// Whether the guide source publishes a crawlable table for this station
    #[serde(default = "default_crawlable")]
    pub crawlable: bool,
}

fn default_crawlable() -> bool {
    true
}

impl Station {
    /// Create a crawlable station with no display name or classify
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            classify: None,
            crawlable: true,
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Set the classify
    pub fn with_classify(mut self, classify: impl Into<String>) -> Self {
        self.classify = Some(classify.into());
        self
    }

    /// Mark the station as not crawlable
    pub fn not_crawlable(mut self) -> Self {
        self.crawlable = false;
        self
    }

    /// Crawl key for this station on a date
    pub fn key(&self, date: NaiveDate) -> CrawlKey {
        CrawlKey::new(self.name.clone(), date)
    }
}

/// One program slot in a station's daily table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    /// Canonical station name
    pub station_name: String,

    /// Air date
    pub air_date: NaiveDate,

    /// Air time, `HH:MM`
    pub air_time: String,

    /// Program title
    pub program: String,

    /// ISO weekday of the air date (Monday = 1)
    pub week: u8,
}

impl ProgramEntry {
    /// Create an entry; the weekday is derived from the air date
    pub fn new(
        station_name: impl Into<String>,
        air_date: NaiveDate,
        air_time: impl Into<String>,
        program: impl Into<String>,
    ) -> Self {
        Self {
            station_name: station_name.into(),
            air_date,
            air_time: air_time.into(),
            program: program.into(),
            week: air_date.weekday().number_from_monday() as u8,
        }
    }
}
