//! Advisory queue statistics, derived without writing to the store

use crate::{
    db::QueueStore,
    models::{EntryStatus, QueueStats},
    queue::ServiceCalendar,
    Result,
};
use chrono::NaiveDate;
use std::sync::Arc;

pub struct StatsAggregator {
    store: Arc<dyn QueueStore>,
    calendar: ServiceCalendar,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn QueueStore>, calendar: ServiceCalendar) -> Self {
        Self { store, calendar }
    }

    /// Counters for `department` (or every department) on `service_day`
    ///
    /// Active entries are counted whatever day they checked in on; terminal
    /// entries count toward the day they ended in, and the wait average
    /// covers entries called during the day.
    ///
    /// Counts and the wait average are two separate reads; the store may
    /// change in between, so the snapshot is only eventually consistent.
    pub async fn snapshot(
        &self,
        department: Option<&str>,
        service_day: NaiveDate,
    ) -> Result<QueueStats> {
        let (from, to) = self.calendar.bounds(service_day);
        let counts = self.store.count_by_status(department, from, to).await?;
        let average_wait_seconds = self
            .store
            .average_wait_seconds(department, from, to)
            .await?;

        let count = |status: EntryStatus| {
            counts
                .iter()
                .filter(|(s, _)| *s == status)
                .map(|(_, n)| *n)
                .sum::<i64>()
        };

        Ok(QueueStats {
            department: department.map(str::to_string),
            service_day,
            waiting_count: count(EntryStatus::Waiting),
            called_count: count(EntryStatus::Called),
            in_progress_count: count(EntryStatus::InProgress),
            completed_count: count(EntryStatus::Completed),
            no_show_count: count(EntryStatus::NoShow),
            average_wait_seconds,
        })
    }
}
