//! Read-only queue statistics

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Advisory counters for one department, or all of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub department: Option<String>,
    pub service_day: NaiveDate,
    pub waiting_count: i64,
    pub called_count: i64,
    pub in_progress_count: i64,
    pub completed_count: i64,
    pub no_show_count: i64,
    /// Mean of `called_at - checked_in_at` over entries called during `service_day`
    pub average_wait_seconds: Option<f64>,
}
