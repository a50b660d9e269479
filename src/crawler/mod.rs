//! Program table crawling with request coordination
//!
//! - [`registry`] - in-flight key set and leader-to-follower handoff
//! - [`single_flight`] - at most one fetch per (station, date) at a time
//! - [`fanout`] - bounded, paced parallel crawl over many stations
//! - [`fetcher`] - network collaborator trait and its HTTP implementation
//! - [`window`] - seven-day date acceptance window

pub mod fanout;
pub mod fetcher;
pub mod registry;
pub mod single_flight;
pub mod window;

pub use fanout::{FanoutAggregator, FanoutReport, StationFailure};
pub use fetcher::{HttpProgramFetcher, ProgramFetcher};
pub use registry::{Flight, FlightOutcome, InFlightRegistry, RegistryStats};
pub use single_flight::SingleFlight;
pub use window::{Clock, DateWindow, FixedClock, SystemClock};
