//! Date acceptance window
//!
//! Guides are only queried for the current day and the six following days.
//! Requests outside that window resolve to an empty table without touching the
//! in-flight registry, the store, or the network.

use chrono::{Days, Local, NaiveDate};
use std::sync::{Mutex, PoisonError};

/// Number of days in the acceptance window, today included
pub const WINDOW_DAYS: u64 = 7;

/// Source of the current calendar day
pub trait Clock: Send + Sync {
    /// Today's date
    fn today(&self) -> NaiveDate;
}

/// Wall clock in the local timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock pinned to a settable date
#[derive(Debug)]
pub struct FixedClock {
    today: Mutex<NaiveDate>,
}

impl FixedClock {
    /// Create a clock that always reports `today`
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    /// Move the clock to another day
    pub fn set(&self, today: NaiveDate) {
        *self.today.lock().unwrap_or_else(PoisonError::into_inner) = today;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Inclusive range of accepted guide dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    first: NaiveDate,
    last: NaiveDate,
}

impl DateWindow {
    /// Window of [`WINDOW_DAYS`] days starting at `today`
    pub fn starting(today: NaiveDate) -> Self {
        let last = today
            .checked_add_days(Days::new(WINDOW_DAYS - 1))
            .unwrap_or(NaiveDate::MAX);
        Self { first: today, last }
    }

    /// Window anchored at the clock's current day
    pub fn current(clock: &dyn Clock) -> Self {
        Self::starting(clock.today())
    }

    /// First accepted date
    pub fn first(&self) -> NaiveDate {
        self.first
    }

    /// Last accepted date
    pub fn last(&self) -> NaiveDate {
        self.last
    }

    /// Whether `date` falls inside the window
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.first <= date && date <= self.last
    }
}
