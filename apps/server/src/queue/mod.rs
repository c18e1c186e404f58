//! Queue coordination - lifecycle rules, contested claims and statistics
//!
//! The stores in [`crate::db`] only persist entries; everything that decides
//! who is served next and which state changes are legal lives here.

mod claim;
mod clock;
mod stats;
mod status;

pub use claim::{ClaimCoordinator, ClaimOutcome, ClaimReport};
pub use clock::{Clock, FixedClock, ServiceCalendar, SystemClock};
pub use stats::StatsAggregator;
pub use status::StatusMachine;
