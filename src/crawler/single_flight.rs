//! Single-flight program table resolution
//!
//! [`SingleFlight::resolve`] guarantees at most one in-progress network fetch
//! per [`CrawlKey`]. Concurrent callers for the same key become followers and
//! receive the leader's outcome directly through the [`InFlightRegistry`].
//!
//! Resolution order:
//!
//! 1. date outside the acceptance window → empty table, nothing touched
//! 2. table already stored → stored table, no locking
//! 3. fetch in flight → follow it (bounded by the follower deadline)
//! 4. otherwise lead: re-check the store, fetch, save, publish

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::crawler::fetcher::ProgramFetcher;
use crate::crawler::registry::{Abandoned, Flight, Follower, InFlightRegistry, LeaderGuard};
use crate::crawler::window::{Clock, DateWindow, SystemClock};
use crate::error::{Error, Result};
use crate::models::{CrawlKey, ProgramEntry};
use crate::storage::ProgramStore;

/// Default deadline for a follower waiting on a leader
///
/// Longer than a default-configured HTTP fetch that exhausts every retry.
pub const DEFAULT_FOLLOWER_TIMEOUT: Duration = Duration::from_secs(180);

/// Coordinator collapsing concurrent identical crawls into one fetch
pub struct SingleFlight {
    registry: InFlightRegistry,
    store: Arc<dyn ProgramStore>,
    fetcher: Arc<dyn ProgramFetcher>,
    clock: Arc<dyn Clock>,
    follower_timeout: Duration,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for SingleFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.registry.len())
            .field("follower_timeout", &self.follower_timeout)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SingleFlight {
    /// Create a coordinator over a store and a fetcher, using the wall clock
    pub fn new(store: Arc<dyn ProgramStore>, fetcher: Arc<dyn ProgramFetcher>) -> Self {
        Self {
            registry: InFlightRegistry::new(),
            store,
            fetcher,
            clock: Arc::new(SystemClock),
            follower_timeout: DEFAULT_FOLLOWER_TIMEOUT,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use another clock for the date window
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set how long followers wait for a leader
    pub fn with_follower_timeout(mut self, timeout: Duration) -> Self {
        self.follower_timeout = timeout;
        self
    }

    /// Tie waiting followers to an external shutdown token
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// In-flight registry, for inspection
    pub fn registry(&self) -> &InFlightRegistry {
        &self.registry
    }

    /// Token whose cancellation interrupts every waiting follower
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Interrupt every follower currently waiting; leaders keep fetching
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Current acceptance window
    pub fn window(&self) -> DateWindow {
        DateWindow::current(self.clock.as_ref())
    }

    /// Resolve the program table for `key`
    ///
    /// # Errors
    ///
    /// - [`Error::Fetch`] when this caller led the crawl and it failed
    /// - [`Error::LeaderFailed`] when the crawl this caller followed failed
    /// - [`Error::Interrupted`] when the coordinator shut down while waiting,
    ///   or the leader was dropped without finishing
    /// - [`Error::WaitTimedOut`] when the follower deadline elapsed
    /// - store errors from the initial cache lookup
    pub async fn resolve(&self, key: &CrawlKey) -> Result<Vec<ProgramEntry>> {
        self.resolve_until(key, &self.shutdown).await
    }

    /// Like [`resolve`](Self::resolve), but a follower also stops waiting when
    /// `cancel` fires
    ///
    /// Pass a child of [`shutdown_token`](Self::shutdown_token) to keep
    /// coordinator-wide shutdown in effect.
    pub async fn resolve_until(
        &self,
        key: &CrawlKey,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProgramEntry>> {
        let window = self.window();
        if !window.contains(key.date()) {
            debug!(
                key = %key,
                first = %window.first(),
                last = %window.last(),
                "Date outside query window, returning empty table"
            );
            return Ok(Vec::new());
        }

        info!(station = %key.station_name(), date = %key.date(), "Querying program table");

        if self.store.exists(key.station_name(), key.date()).await? {
            return self.store.get(key.station_name(), key.date()).await;
        }

        match self.registry.try_begin(key) {
            Flight::Leader(guard) => self.lead(guard).await,
            Flight::Follower(follower) => self.follow(follower, cancel).await,
        }
    }

    async fn lead(&self, guard: LeaderGuard<'_>) -> Result<Vec<ProgramEntry>> {
        let key = guard.key().clone();
        let (station, date) = (key.station_name(), key.date());

        // A previous leader may have stored the table between our first
        // lookup and taking the key.
        match self.store.exists(station, date).await {
            Ok(true) => match self.store.get(station, date).await {
                Ok(entries) => {
                    debug!(key = %key, "Table stored by a previous crawl");
                    guard.complete(Ok(Arc::new(entries.clone())));
                    return Ok(entries);
                }
                Err(e) => warn!(key = %key, error = %e, "Store read failed, crawling instead"),
            },
            Ok(false) => {}
            Err(e) => warn!(key = %key, error = %e, "Store lookup failed, crawling instead"),
        }

        debug!(key = %key, "Crawling program table from network");

        match self.fetcher.fetch(station, date).await {
            Ok(entries) => {
                if entries.is_empty() {
                    debug!(key = %key, "Crawl returned no entries, nothing stored");
                } else if let Err(e) = self.store.save(station, date, &entries).await {
                    warn!(key = %key, error = %e, "Failed to store crawled table");
                }
                info!(key = %key, count = entries.len(), "Program table crawled");
                guard.complete(Ok(Arc::new(entries.clone())));
                Ok(entries)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Program table crawl failed");
                let source = Arc::new(e);
                guard.complete(Err(Arc::clone(&source)));
                Err(Error::Fetch { key, source })
            }
        }
    }

    async fn follow(
        &self,
        follower: Follower,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProgramEntry>> {
        let key = follower.key().clone();
        debug!(key = %key, "Waiting for the in-flight crawl of the same table");

        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::Interrupted {
                    key,
                    reason: String::from("request cancelled"),
                });
            }
            outcome = tokio::time::timeout(self.follower_timeout, follower.outcome()) => outcome,
        };

        match waited {
            Err(_elapsed) => {
                warn!(key = %key, timeout = ?self.follower_timeout, "Gave up waiting for in-flight crawl");
                Err(Error::WaitTimedOut {
                    key,
                    waited: self.follower_timeout,
                })
            }
            Ok(Err(Abandoned)) => Err(Error::Interrupted {
                key,
                reason: String::from("the leading request stopped before finishing"),
            }),
            Ok(Ok(Ok(entries))) => {
                debug!(key = %key, count = entries.len(), "Received table from leader");
                Ok(entries.as_ref().clone())
            }
            Ok(Ok(Err(source))) => Err(Error::LeaderFailed { key, source }),
        }
    }
}
