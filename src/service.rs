//! Program guide request façade
//!
//! [`ProgramGuide`] is what the CLI (or any other front end) talks to. It
//! resolves station names through the directory and hands the resulting keys
//! to the coordinator or the fan-out aggregator. Unknown stations are rejected
//! here and never reach the coordinator.

use anyhow::Context;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::crawler::fanout::{FanoutAggregator, FanoutReport};
use crate::crawler::fetcher::{HttpProgramFetcher, ProgramFetcher};
use crate::crawler::single_flight::SingleFlight;
use crate::crawler::window::{Clock, SystemClock};
use crate::directory::{StaticDirectory, StationDirectory};
use crate::error::{Error, Result};
use crate::models::{ProgramEntry, Station};
use crate::storage::{MemoryProgramStore, ProgramStore, SqliteProgramStore};
use crate::utils::parse_date;

/// Program guide service
pub struct ProgramGuide {
    directory: Arc<dyn StationDirectory>,
    fanout: FanoutAggregator,
}

impl std::fmt::Debug for ProgramGuide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramGuide")
            .field("fanout", &self.fanout)
            .finish_non_exhaustive()
    }
}

/// Builder wiring collaborators into a [`ProgramGuide`]
pub struct ProgramGuideBuilder {
    directory: Arc<dyn StationDirectory>,
    store: Arc<dyn ProgramStore>,
    fetcher: Arc<dyn ProgramFetcher>,
    clock: Arc<dyn Clock>,
    pool_size: usize,
    submit_interval: Duration,
    follower_timeout: Duration,
    shutdown: CancellationToken,
}

impl ProgramGuideBuilder {
    /// Start from the required collaborators; everything else takes defaults
    pub fn new(
        directory: Arc<dyn StationDirectory>,
        store: Arc<dyn ProgramStore>,
        fetcher: Arc<dyn ProgramFetcher>,
    ) -> Self {
        let config = Config::default();
        Self {
            directory,
            store,
            fetcher,
            clock: Arc::new(SystemClock),
            pool_size: config.fanout.pool_size,
            submit_interval: config.submit_interval(),
            follower_timeout: config.follower_timeout(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the clock used for the date window
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the fan-out pool size
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the delay between fan-out submissions
    pub fn submit_interval(mut self, interval: Duration) -> Self {
        self.submit_interval = interval;
        self
    }

    /// Set how long followers wait for a leader
    pub fn follower_timeout(mut self, timeout: Duration) -> Self {
        self.follower_timeout = timeout;
        self
    }

    /// Set the shutdown token interrupting waiting followers
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Build the service
    pub fn build(self) -> ProgramGuide {
        let coordinator = SingleFlight::new(self.store, self.fetcher)
            .with_clock(self.clock)
            .with_follower_timeout(self.follower_timeout)
            .with_shutdown(self.shutdown);
        let fanout = FanoutAggregator::new(
            Arc::new(coordinator),
            self.pool_size,
            self.submit_interval,
        );
        ProgramGuide {
            directory: self.directory,
            fanout,
        }
    }
}

impl ProgramGuide {
    /// Start building a service from its collaborators
    pub fn builder(
        directory: Arc<dyn StationDirectory>,
        store: Arc<dyn ProgramStore>,
        fetcher: Arc<dyn ProgramFetcher>,
    ) -> ProgramGuideBuilder {
        ProgramGuideBuilder::new(directory, store, fetcher)
    }

    /// Wire the production collaborators described by `config`
    ///
    /// Loads the station file, opens SQLite when a path is configured (memory
    /// otherwise) and builds the HTTP fetcher.
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let directory = StaticDirectory::from_file(&config.stations.path).with_context(|| {
            format!(
                "Failed to load station list: {}",
                config.stations.path.display()
            )
        })?;

        let store: Arc<dyn ProgramStore> = match &config.storage.sqlite_path {
            Some(path) => Arc::new(
                SqliteProgramStore::open(path)
                    .with_context(|| format!("Failed to open database: {}", path.display()))?,
            ),
            None => Arc::new(MemoryProgramStore::new()),
        };

        let fetcher =
            HttpProgramFetcher::from_config(&config.crawler).context("Failed to create fetcher")?;

        Ok(Self::builder(Arc::new(directory), store, Arc::new(fetcher))
            .pool_size(config.fanout.pool_size)
            .submit_interval(config.submit_interval())
            .follower_timeout(config.follower_timeout())
            .shutdown(shutdown)
            .build())
    }

    /// Coordinator shared by direct queries and fan-out
    pub fn coordinator(&self) -> &Arc<SingleFlight> {
        self.fanout.coordinator()
    }

    /// Program table of one station on `date` (`yyyy-MM-dd`)
    ///
    /// The station is looked up by canonical name first, then by display
    /// name within `classify` if given.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidDate`] for a malformed date, [`Error::NotFound`] for an
    /// unknown station, otherwise whatever the coordinator reports.
    pub async fn query_program_table(
        &self,
        name_or_display_name: &str,
        classify: Option<&str>,
        date: &str,
    ) -> Result<Vec<ProgramEntry>> {
        let date = parse_date(date).ok_or_else(|| Error::InvalidDate(date.to_string()))?;

        let Some(station) = self.directory.lookup(name_or_display_name, classify).await? else {
            tracing::error!(station = %name_or_display_name, classify = ?classify, "Station does not exist");
            return Err(Error::NotFound {
                name: name_or_display_name.to_string(),
            });
        };

        self.query_station_table(&station, date).await
    }

    /// Program table of an already resolved station
    pub async fn query_station_table(
        &self,
        station: &Station,
        date: NaiveDate,
    ) -> Result<Vec<ProgramEntry>> {
        self.coordinator().resolve(&station.key(date)).await
    }

    /// Program tables of every crawlable station on `date` (`yyyy-MM-dd`)
    pub async fn crawl_all_program_tables(&self, date: &str) -> Result<FanoutReport> {
        let date = parse_date(date).ok_or_else(|| Error::InvalidDate(date.to_string()))?;
        let stations = self.directory.crawlable_stations().await?;
        Ok(self.fanout.crawl_all(&stations, date).await)
    }
}
