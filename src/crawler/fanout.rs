//! Bounded, paced fan-out over many stations
//!
//! [`FanoutAggregator::crawl_all`] runs one [`SingleFlight::resolve`] per
//! station for a single date.
//!
//! - Concurrency is capped by a semaphore shared by every call on the same
//!   aggregator, so parallel fan-outs together never exceed the pool size
//! - Submissions are spaced by a fixed interval (one governor cell per
//!   interval, also shared)
//! - Results are gathered in completion order; a failing station is logged
//!   and skipped, never aborting its siblings
//! - Coordinator shutdown stops further submissions

use chrono::NaiveDate;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::crawler::single_flight::SingleFlight;
use crate::models::{CrawlKey, ProgramEntry, Station};

type Pacer = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// A station that contributed nothing to a fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationFailure {
    /// Station name
    pub station: String,
    /// Rendered error
    pub error: String,
}

/// Outcome of one fan-out call
#[derive(Debug, Default)]
pub struct FanoutReport {
    /// Entries of every station that succeeded, in no particular order
    pub entries: Vec<ProgramEntry>,

    /// Stations that resolved, in completion order
    pub succeeded: Vec<String>,

    /// Stations that failed
    pub failed: Vec<StationFailure>,
}

impl FanoutReport {
    /// Stations submitted
    pub fn requested(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Whether every submitted station resolved
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// Success rate (0.0 - 1.0); an empty fan-out counts as fully successful
    pub fn success_rate(&self) -> f64 {
        let total = self.requested();
        if total == 0 {
            return 1.0;
        }
        self.succeeded.len() as f64 / total as f64
    }
}

/// Runs coordinated crawls for many stations through a bounded pool
pub struct FanoutAggregator {
    coordinator: Arc<SingleFlight>,
    pool: Arc<Semaphore>,
    pool_size: usize,
    pacer: Option<Arc<Pacer>>,
}

impl std::fmt::Debug for FanoutAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutAggregator")
            .field("pool_size", &self.pool_size)
            .field("available", &self.pool.available_permits())
            .field("paced", &self.pacer.is_some())
            .finish()
    }
}

impl FanoutAggregator {
    /// Create an aggregator
    ///
    /// A `pool_size` of zero is raised to one. A zero `submit_interval`
    /// disables pacing.
    pub fn new(coordinator: Arc<SingleFlight>, pool_size: usize, submit_interval: Duration) -> Self {
        let pool_size = pool_size.max(1);
        let pacer = Quota::with_period(submit_interval).map(|q| Arc::new(RateLimiter::direct(q)));

        Self {
            coordinator,
            pool: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            pacer,
        }
    }

    /// Create an aggregator from the `[fanout]` configuration section
    pub fn from_config(coordinator: Arc<SingleFlight>, config: &Config) -> Self {
        Self::new(coordinator, config.fanout.pool_size, config.submit_interval())
    }

    /// Maximum stations crawled at once
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Coordinator the tasks resolve through
    pub fn coordinator(&self) -> &Arc<SingleFlight> {
        &self.coordinator
    }

    /// Wait for the pacer, then for a pool permit
    async fn next_slot(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        if let Some(pacer) = &self.pacer {
            pacer.until_ready().await;
        }
        Arc::clone(&self.pool).acquire_owned().await
    }

    /// Crawl the program tables of `stations` on `date`
    ///
    /// Returns once every submitted station has finished. Per-station errors
    /// land in [`FanoutReport::failed`]; the call itself does not fail.
    ///
    /// Once the coordinator's shutdown token fires, no further station is
    /// submitted; the unsubmitted ones are reported as failed. Stations
    /// already running are left to finish.
    pub async fn crawl_all(&self, stations: &[Station], date: NaiveDate) -> FanoutReport {
        let mut report = FanoutReport::default();
        if stations.is_empty() {
            return report;
        }

        info!(
            stations = stations.len(),
            date = %date,
            pool_size = self.pool_size,
            "Starting fan-out crawl"
        );

        let shutdown = self.coordinator.shutdown_token();
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<task::Id, CrawlKey> = HashMap::with_capacity(stations.len());

        for (index, station) in stations.iter().enumerate() {
            let slot = tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                slot = self.next_slot() => Some(slot),
            };

            let permit = match slot {
                Some(Ok(permit)) => permit,
                Some(Err(e)) => {
                    error!(station = %station.name, error = %e, "Worker pool closed");
                    report.failed.push(StationFailure {
                        station: station.name.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
                None => {
                    let skipped = &stations[index..];
                    warn!(
                        date = %date,
                        skipped = skipped.len(),
                        "Shutdown requested, remaining stations not submitted"
                    );
                    report.failed.extend(skipped.iter().map(|s| StationFailure {
                        station: s.name.clone(),
                        error: String::from("crawl cancelled before submission"),
                    }));
                    break;
                }
            };

            let key = station.key(date);
            let coordinator = Arc::clone(&self.coordinator);

            debug!(key = %key, "Submitting station crawl");
            let task_key = key.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                coordinator.resolve(&task_key).await
            });
            pending.insert(handle.id(), key);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, Ok(entries))) => {
                    let Some(key) = pending.remove(&id) else { continue };
                    debug!(key = %key, count = entries.len(), "Station crawl completed");
                    report.succeeded.push(key.station_name().to_string());
                    report.entries.extend(entries);
                }
                Ok((id, Err(e))) => {
                    let Some(key) = pending.remove(&id) else { continue };
                    warn!(key = %key, error = %e, "Station crawl failed, skipping");
                    report.failed.push(StationFailure {
                        station: key.station_name().to_string(),
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    let Some(key) = pending.remove(&e.id()) else { continue };
                    error!(key = %key, error = %e, "Station crawl task aborted");
                    let reason = if e.is_panic() {
                        "crawl task panicked"
                    } else {
                        "crawl task cancelled"
                    };
                    report.failed.push(StationFailure {
                        station: key.station_name().to_string(),
                        error: String::from(reason),
                    });
                }
            }
        }

        info!(
            date = %date,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            entries = report.entries.len(),
            "Fan-out crawl completed"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::ProgramFetcher;
    use crate::crawler::window::FixedClock;
    use crate::storage::MemoryProgramStore;
    use crate::utils::error::FetchError;
    use async_trait::async_trait;

    struct PanicsOn(&'static str);

    #[async_trait]
    impl ProgramFetcher for PanicsOn {
        async fn fetch(
            &self,
            station_name: &str,
            date: NaiveDate,
        ) -> Result<Vec<ProgramEntry>, FetchError> {
            if station_name == self.0 {
                panic!("parser blew up on {station_name}");
            }
            Ok(vec![ProgramEntry::new(station_name, date, "09:00", "Cartoons")])
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2015, 3, 27).unwrap()
    }

    fn aggregator(fetcher: Arc<dyn ProgramFetcher>) -> FanoutAggregator {
        let sf = SingleFlight::new(Arc::new(MemoryProgramStore::new()), fetcher)
            .with_clock(Arc::new(FixedClock::new(today())));
        FanoutAggregator::new(Arc::new(sf), 2, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_empty_station_list() {
        let fanout = aggregator(Arc::new(PanicsOn("")));
        let report = fanout.crawl_all(&[], today()).await;
        assert_eq!(report.requested(), 0);
        assert!(report.entries.is_empty());
        assert_eq!(fanout.coordinator().registry().stats().leaders, 0);
    }

    #[tokio::test]
    async fn test_panicking_station_is_reported() {
        let fanout = aggregator(Arc::new(PanicsOn("B")));
        let stations = [Station::new("A"), Station::new("B"), Station::new("C")];

        let report = fanout.crawl_all(&stations, today()).await;

        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].station, "B");
        // The panicking leader's guard released the key
        assert!(fanout.coordinator().registry().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_panicking_station_reported_per_submission() {
        let fanout = aggregator(Arc::new(PanicsOn("B")));
        let stations = [Station::new("A"), Station::new("B"), Station::new("B")];

        let report = fanout.crawl_all(&stations, today()).await;

        assert_eq!(report.requested(), 3);
        assert_eq!(report.succeeded, vec!["A".to_string()]);
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed.iter().all(|f| f.station == "B"));
    }

    #[tokio::test]
    async fn test_shutdown_before_crawl_submits_nothing() {
        let fanout = aggregator(Arc::new(PanicsOn("")));
        fanout.coordinator().shutdown();
        let stations = [Station::new("A"), Station::new("B")];

        let report = fanout.crawl_all(&stations, today()).await;

        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].error, "crawl cancelled before submission");
        assert_eq!(fanout.coordinator().registry().stats().leaders, 0);
    }

    #[test]
    fn test_zero_pool_size_is_raised() {
        let sf = SingleFlight::new(
            Arc::new(MemoryProgramStore::new()),
            Arc::new(PanicsOn("")),
        );
        let fanout = FanoutAggregator::new(Arc::new(sf), 0, Duration::from_millis(100));
        assert_eq!(fanout.pool_size(), 1);
    }

    #[test]
    fn test_report_success_rate() {
        let report = FanoutReport {
            entries: Vec::new(),
            succeeded: vec!["A".into(), "C".into()],
            failed: vec![StationFailure {
                station: "B".into(),
                error: "boom".into(),
            }],
        };
        assert_eq!(report.requested(), 3);
        assert!(!report.all_succeeded());
        assert!((report.success_rate() - 0.666).abs() < 0.01);
    }
}
