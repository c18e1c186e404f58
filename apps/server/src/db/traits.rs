//! Storage traits for queue backends
//!
//! Any backend (PostgreSQL, in-memory, ...) can implement these. The only
//! mutation primitive is a conditional write guarded on the entry's current
//! status; there is no unconditional overwrite.

use crate::{
    models::{EntryId, EntryPatch, EntryStatus, QueueEntry},
    Result,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Per-status entry counts
pub type StatusCounts = Vec<(EntryStatus, i64)>;

/// Durable ordered collection of queue entries
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a freshly created entry
    ///
    /// # Errors
    /// * `DuplicateActiveEntry` - the patient already has a non-terminal entry
    async fn insert(&self, entry: &QueueEntry) -> Result<QueueEntry>;

    /// Look up a single entry
    async fn find(&self, id: EntryId) -> Result<Option<QueueEntry>>;

    /// Apply a patch only if the entry's status still equals `patch.expected`
    ///
    /// # Returns
    /// * `Ok(Some(entry))` - the write committed
    /// * `Ok(None)` - the entry is missing or its status moved on
    ///
    /// # Errors
    /// Patches that violate the status machine are rejected before any write.
    async fn update(&self, id: EntryId, patch: &EntryPatch) -> Result<Option<QueueEntry>>;

    /// Waiting entries of one department in service order
    ///
    /// Order: priority ascending, then service day, then sequence.
    async fn list_waiting(&self, department: &str) -> Result<Vec<QueueEntry>>;

    /// Entries in any of `statuses`, optionally restricted to one department,
    /// in the same order as [`QueueStore::list_waiting`]
    async fn list_by_status(
        &self,
        department: Option<&str>,
        statuses: &[EntryStatus],
    ) -> Result<Vec<QueueEntry>>;

    /// The non-terminal entry of a patient, if any
    async fn find_active_for_patient(&self, patient_ref: &str) -> Result<Option<QueueEntry>>;

    /// Delete an entry only while it is still waiting
    ///
    /// Returns `false` when nothing was deleted.
    async fn delete_waiting(&self, id: EntryId) -> Result<bool>;

    /// Counts of every active entry plus the entries that ended in `[from, to)`
    async fn count_by_status(
        &self,
        department: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<StatusCounts>;

    /// Mean `called_at - checked_in_at` in seconds over entries called in `[from, to)`
    async fn average_wait_seconds(
        &self,
        department: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<f64>>;
}

/// Issues ticket numbers per (department, day)
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    /// Next ticket number for the partition; strictly increasing, never reused
    async fn next_sequence(&self, department: &str, service_day: NaiveDate) -> Result<i64>;
}
