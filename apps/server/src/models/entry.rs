//! Queue entry domain model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque identifier of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EntryId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for EntryId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| crate::Error::Validation(format!("Invalid entry id: {}", s)))
    }
}

/// Triage priority, 1 (most urgent) to 5 (least urgent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Priority(u8);

impl Priority {
    pub const MOST_URGENT: Priority = Priority(1);
    pub const LEAST_URGENT: Priority = Priority(5);

    pub fn new(value: i32) -> crate::Result<Self> {
        Self::try_from(value)
    }

    pub fn value(&self) -> i32 {
        self.0 as i32
    }
}

impl TryFrom<i32> for Priority {
    type Error = crate::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if (Self::MOST_URGENT.value()..=Self::LEAST_URGENT.value()).contains(&value) {
            Ok(Priority(value as u8))
        } else {
            Err(crate::Error::InvalidPriority(value.to_string()))
        }
    }
}

impl From<Priority> for i32 {
    fn from(value: Priority) -> Self {
        value.value()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A priority as a caller sent it
///
/// Any JSON number is accepted here so that fractions and values beyond the
/// integer range surface as `InvalidPriority` rather than a decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PriorityInput(serde_json::Number);

impl From<i32> for PriorityInput {
    fn from(value: i32) -> Self {
        Self(value.into())
    }
}

impl TryFrom<PriorityInput> for Priority {
    type Error = crate::Error;

    fn try_from(input: PriorityInput) -> Result<Self, Self::Error> {
        match input.0.as_i64().and_then(|v| i32::try_from(v).ok()) {
            Some(value) => Priority::new(value),
            None => Err(crate::Error::InvalidPriority(input.0.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Waiting,
    Called,
    InProgress,
    Completed,
    NoShow,
    Cancelled,
}

impl EntryStatus {
    pub const ACTIVE: [EntryStatus; 3] = [
        EntryStatus::Waiting,
        EntryStatus::Called,
        EntryStatus::InProgress,
    ];

    pub const SERVING: [EntryStatus; 2] = [EntryStatus::Called, EntryStatus::InProgress];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Waiting => "waiting",
            EntryStatus::Called => "called",
            EntryStatus::InProgress => "in_progress",
            EntryStatus::Completed => "completed",
            EntryStatus::NoShow => "no_show",
            EntryStatus::Cancelled => "cancelled",
        }
    }

    /// Completed, NoShow and Cancelled absorb every further request
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EntryStatus::Completed | EntryStatus::NoShow | EntryStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "waiting" => Ok(EntryStatus::Waiting),
            "called" => Ok(EntryStatus::Called),
            "in_progress" => Ok(EntryStatus::InProgress),
            "completed" => Ok(EntryStatus::Completed),
            "no_show" => Ok(EntryStatus::NoShow),
            "cancelled" => Ok(EntryStatus::Cancelled),
            _ => Err(format!("Invalid entry status: {}", value)),
        }
    }
}

// Conversion from DB string to EntryStatus
impl TryFrom<String> for EntryStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A patient's place in a department queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub patient_ref: String,
    pub encounter_ref: Option<String>,
    pub department: String,
    pub service_type: String,
    pub priority: Priority,
    /// Ticket number, unique within (department, service_day)
    pub sequence: i64,
    pub service_day: NaiveDate,
    pub status: EntryStatus,
    pub room_assignment: Option<String>,
    pub claimed_by: Option<String>,
    pub checked_in_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Build a fresh `Waiting` entry for an allocated ticket number
    pub fn waiting(new: NewEntry, sequence: i64, checked_in_at: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::new(),
            patient_ref: new.patient_ref,
            encounter_ref: new.encounter_ref,
            department: new.department,
            service_type: new.service_type,
            priority: new.priority,
            sequence,
            service_day: new.service_day,
            status: EntryStatus::Waiting,
            room_assignment: None,
            claimed_by: None,
            checked_in_at,
            called_at: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Seconds between check-in and being called, once called
    pub fn wait_seconds(&self) -> Option<i64> {
        self.called_at
            .map(|called| (called - self.checked_in_at).num_seconds().max(0))
    }

    /// Sort key shared by every view of "who is next"
    pub fn rank(&self) -> (Priority, NaiveDate, i64) {
        (self.priority, self.service_day, self.sequence)
    }
}

/// Validated enqueue input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub patient_ref: String,
    pub department: String,
    pub priority: Priority,
    pub service_type: String,
    pub encounter_ref: Option<String>,
    pub service_day: NaiveDate,
}

/// Conditional update applied to a single entry
///
/// The write only commits while the stored status still equals `expected`.
/// `target == expected` expresses a field-only patch (room or priority).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPatch {
    pub expected: EntryStatus,
    pub target: EntryStatus,
    pub at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub room_assignment: Option<String>,
    pub priority: Option<Priority>,
}

impl EntryPatch {
    pub fn transition(expected: EntryStatus, target: EntryStatus, at: DateTime<Utc>) -> Self {
        Self {
            expected,
            target,
            at,
            claimed_by: None,
            room_assignment: None,
            priority: None,
        }
    }

    pub fn fields(status: EntryStatus, at: DateTime<Utc>) -> Self {
        Self::transition(status, status, at)
    }

    pub fn claimed_by(mut self, caller_id: impl Into<String>) -> Self {
        self.claimed_by = Some(caller_id.into());
        self
    }

    pub fn room(mut self, room: Option<String>) -> Self {
        self.room_assignment = room;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn changes_status(&self) -> bool {
        self.expected != self.target
    }

    /// Apply an already validated patch to an in-memory copy
    pub fn apply_to(&self, entry: &mut QueueEntry) {
        entry.status = self.target;
        if entry.claimed_by.is_none() {
            if let Some(caller) = &self.claimed_by {
                entry.claimed_by = Some(caller.clone());
            }
        }
        if let Some(room) = &self.room_assignment {
            entry.room_assignment = Some(room.clone());
        }
        if let Some(priority) = self.priority {
            entry.priority = priority;
        }
        if self.changes_status() {
            match self.target {
                EntryStatus::Called => entry.called_at = entry.called_at.or(Some(self.at)),
                EntryStatus::InProgress => entry.started_at = entry.started_at.or(Some(self.at)),
                s if s.is_terminal() => entry.ended_at = entry.ended_at.or(Some(self.at)),
                _ => {}
            }
        }
    }
}

/// Where a waiting entry currently stands in its department line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitingPosition {
    pub entry: QueueEntry,
    /// 1-based rank in the waiting list
    pub position: usize,
    pub ahead: usize,
}
