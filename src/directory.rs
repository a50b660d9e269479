//! Station directory
//!
//! Resolves user-supplied station names to [`Station`]s. Lookup tries the
//! canonical name first, then the display name (narrowed by classify when one
//! is given).

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::Station;

/// Name and alias lookup for stations
#[async_trait]
pub trait StationDirectory: Send + Sync {
    /// Find a station by canonical name or display name
    async fn lookup(&self, name_or_display_name: &str, classify: Option<&str>)
        -> Result<Option<Station>>;

    /// Every station whose guide can be crawled
    async fn crawlable_stations(&self) -> Result<Vec<Station>>;
}

/// Station directory file layout
#[derive(Debug, Deserialize)]
struct StationFile {
    #[serde(default, rename = "station")]
    stations: Vec<Station>,
}

/// Directory held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    stations: Vec<Station>,
}

impl StaticDirectory {
    /// Create a directory from a station list
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    /// Parse a TOML station list (`[[station]]` tables)
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: StationFile = toml::from_str(content)
            .map_err(|e| Error::config(format!("invalid station list: {e}")))?;

        let mut seen = std::collections::HashSet::new();
        for station in &file.stations {
            if station.name.trim().is_empty() {
                return Err(Error::config("station with empty name"));
            }
            if !seen.insert(station.name.as_str()) {
                return Err(Error::config(format!(
                    "duplicate station name '{}'",
                    station.name
                )));
            }
        }

        Ok(Self::new(file.stations))
    }

    /// Load a TOML station list from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let directory = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            stations = directory.len(),
            "Loaded station directory"
        );
        Ok(directory)
    }

    /// Number of stations
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    /// Whether the directory has no stations
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    fn find(&self, name: &str, classify: Option<&str>) -> Option<&Station> {
        if let Some(station) = self.stations.iter().find(|s| s.name == name) {
            return Some(station);
        }

        self.stations.iter().find(|s| {
            s.display_name.as_deref() == Some(name)
                && classify.map_or(true, |c| s.classify.as_deref() == Some(c))
        })
    }
}

#[async_trait]
impl StationDirectory for StaticDirectory {
    async fn lookup(
        &self,
        name_or_display_name: &str,
        classify: Option<&str>,
    ) -> Result<Option<Station>> {
        Ok(self.find(name_or_display_name, classify).cloned())
    }

    async fn crawlable_stations(&self) -> Result<Vec<Station>> {
        Ok(self.stations.iter().filter(|s| s.crawlable).cloned().collect())
    }
}
