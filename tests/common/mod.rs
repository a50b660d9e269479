//! Common test utilities

use async_trait::async_trait;
use chrono::NaiveDate;
use epgcrawl::crawler::{FixedClock, ProgramFetcher, SingleFlight};
use epgcrawl::error::FetchError;
use epgcrawl::storage::MemoryProgramStore;
use epgcrawl::ProgramEntry;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Fixed "today" used across integration tests
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 3, 27).unwrap()
}

/// Fetcher that records every call and can be told to fail per station
#[derive(Default)]
pub struct MockFetcher {
    delay: Duration,
    failing: HashSet<String>,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<(String, Instant)>>,
}

#[allow(dead_code)]
impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fetches for this station fail with a server error
    pub fn failing(mut self, station: &str) -> Self {
        self.failing.insert(station.to_string());
        self
    }

    /// Total fetch calls
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Station names in the order their fetches started
    pub fn started(&self) -> Vec<(String, Instant)> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgramFetcher for MockFetcher {
    async fn fetch(
        &self,
        station_name: &str,
        date: NaiveDate,
    ) -> Result<Vec<ProgramEntry>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started
            .lock()
            .unwrap()
            .push((station_name.to_string(), Instant::now()));

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(station_name) {
            return Err(FetchError::ServerError(503));
        }

        Ok(vec![
            ProgramEntry::new(station_name, date, "08:00", "Morning News"),
            ProgramEntry::new(station_name, date, "19:00", "Evening News"),
        ])
    }
}

/// Coordinator over a fresh memory store, with the clock pinned to [`today`]
#[allow(dead_code)]
pub fn coordinator(fetcher: Arc<MockFetcher>) -> (Arc<SingleFlight>, Arc<MemoryProgramStore>) {
    let store = Arc::new(MemoryProgramStore::new());
    let sf = SingleFlight::new(store.clone(), fetcher).with_clock(Arc::new(FixedClock::new(today())));
    (Arc::new(sf), store)
}
