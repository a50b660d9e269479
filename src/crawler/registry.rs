//! In-flight crawl registry
//!
//! Tracks which [`CrawlKey`]s currently have an active fetch. Membership is the
//! only signal separating the leader (must fetch) from followers (must wait).
//!
//! Each in-flight key owns a `watch` channel. The leader publishes its outcome
//! on that channel, so followers get the fetched table (or the shared error)
//! directly instead of re-reading the store after a wake-up.
//!
//! ```text
//!   caller ──try_begin(key)──▶ [map: key → watch::Sender]
//!      │                            │
//!      ├── absent  → Leader(guard) ─┴─ complete(outcome): remove key, publish
//!      └── present → Follower(rx)  ◀── outcome / channel closed
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::models::{CrawlKey, ProgramEntry};
use crate::utils::error::FetchError;

/// Result of one leader fetch, shareable between every waiter of the key
pub type FlightOutcome = Result<Arc<Vec<ProgramEntry>>, Arc<FetchError>>;

type Slot = Option<FlightOutcome>;

/// Set of keys with a fetch in progress
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    flights: Mutex<HashMap<CrawlKey, watch::Sender<Slot>>>,
    leaders: AtomicU64,
    followers: AtomicU64,
}

/// Role assigned to a caller by [`InFlightRegistry::try_begin`]
#[derive(Debug)]
pub enum Flight<'a> {
    /// No fetch was running; the caller must fetch and then complete the guard
    Leader(LeaderGuard<'a>),
    /// A fetch is already running; the caller waits on this handle
    Follower(Follower),
}

impl InFlightRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CrawlKey, watch::Sender<Slot>>> {
        // The map holds no invariant a panicking holder could break halfway.
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `key` or join the fetch already running for it
    pub fn try_begin(&self, key: &CrawlKey) -> Flight<'_> {
        let mut flights = self.lock();

        if let Some(sender) = flights.get(key) {
            let rx = sender.subscribe();
            drop(flights);
            let followers = self.followers.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(key = %key, followers, "Waiting on in-flight crawl");
            return Flight::Follower(Follower {
                key: key.clone(),
                rx,
            });
        }

        let (tx, _rx) = watch::channel(None);
        flights.insert(key.clone(), tx);
        drop(flights);

        let leaders = self.leaders.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(key = %key, leaders, "Leading crawl");
        Flight::Leader(LeaderGuard {
            registry: self,
            key: key.clone(),
            finished: false,
        })
    }

    /// Whether a fetch is running for `key`
    pub fn contains(&self, key: &CrawlKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of followers currently waiting on `key`
    pub fn waiting(&self, key: &CrawlKey) -> usize {
        self.lock().get(key).map_or(0, |tx| tx.receiver_count())
    }

    /// Number of keys in flight
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no key is in flight
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Leader/follower counters since creation
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            leaders: self.leaders.load(Ordering::Relaxed),
            followers: self.followers.load(Ordering::Relaxed),
        }
    }

    /// Remove `key` and hand `outcome` to its followers, under the lock
    fn finish(&self, key: &CrawlKey, outcome: Option<FlightOutcome>) {
        let mut flights = self.lock();
        let Some(sender) = flights.remove(key) else {
            return;
        };
        let waiting = sender.receiver_count();
        match outcome {
            Some(outcome) => {
                sender.send_replace(Some(outcome));
                tracing::debug!(key = %key, waiting, "Crawl finished, followers notified");
            }
            None => {
                tracing::debug!(key = %key, waiting, "Crawl abandoned by its leader");
            }
        }
        // Dropping the sender here closes the channel for late receivers.
        drop(sender);
        drop(flights);
    }
}

/// Counters of roles handed out by a registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Callers that became leader
    pub leaders: u64,
    /// Callers that joined an in-flight fetch
    pub followers: u64,
}

/// Leader's claim on a key
///
/// The key stays in the registry until [`complete`](Self::complete) is called
/// or the guard is dropped, whichever happens first. Dropping without
/// completing (the leader's future was cancelled or panicked) frees the key
/// and closes the channel so followers stop waiting.
#[derive(Debug)]
pub struct LeaderGuard<'a> {
    registry: &'a InFlightRegistry,
    key: CrawlKey,
    finished: bool,
}

impl LeaderGuard<'_> {
    /// Key this guard holds
    pub fn key(&self) -> &CrawlKey {
        &self.key
    }

    /// Remove the key and publish `outcome` to every follower
    pub fn complete(mut self, outcome: FlightOutcome) {
        self.finished = true;
        self.registry.finish(&self.key, Some(outcome));
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.registry.finish(&self.key, None);
        }
    }
}

/// Follower's view of someone else's fetch
#[derive(Debug)]
pub struct Follower {
    key: CrawlKey,
    rx: watch::Receiver<Slot>,
}

/// The leader went away without publishing an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abandoned;

impl Follower {
    /// Key being waited on
    pub fn key(&self) -> &CrawlKey {
        &self.key
    }

    /// Wait for the leader's outcome
    ///
    /// Cancel-safe: dropping the future only stops this follower.
    pub async fn outcome(mut self) -> Result<FlightOutcome, Abandoned> {
        let slot = self.rx.wait_for(Option::is_some).await.map_err(|_| Abandoned)?;
        (*slot).clone().ok_or(Abandoned)
    }
}
