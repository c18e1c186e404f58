//! Domain models for the patient queue

pub mod entry;
pub mod stats;

pub use entry::{
    EntryId, EntryPatch, EntryStatus, NewEntry, Priority, PriorityInput, QueueEntry,
    WaitingPosition,
};
pub use stats::QueueStats;
