//! Entry lifecycle rules
//!
//! ```text
//! Waiting ──► Called ──► InProgress ──► Completed
//!    │          │  └──► NoShow
//!    └──────────┴──────────┴──────────► Cancelled
//! ```
//!
//! Every write to an entry passes through [`StatusMachine::validate_patch`],
//! including the conditional updates issued by the stores themselves.

use crate::models::{EntryId, EntryPatch, EntryStatus, QueueEntry};
use crate::{Error, Result};
use chrono::{DateTime, Utc};

pub struct StatusMachine;

impl StatusMachine {
    /// Whether `from -> to` is one of the legal lifecycle edges
    pub fn can_transition(from: EntryStatus, to: EntryStatus) -> bool {
        use EntryStatus::*;
        matches!(
            (from, to),
            (Waiting, Called)
                | (Called, InProgress)
                | (Called, NoShow)
                | (InProgress, Completed)
                | (Waiting, Cancelled)
                | (Called, Cancelled)
                | (InProgress, Cancelled)
        )
    }

    pub fn check(id: EntryId, from: EntryStatus, to: EntryStatus) -> Result<()> {
        if from.is_terminal() {
            return Err(Error::EntryFinalized { id, status: from });
        }
        if !Self::can_transition(from, to) {
            return Err(Error::InvalidTransition { from, to });
        }
        Ok(())
    }

    /// Reject any patch that would break the lifecycle or field invariants
    pub fn validate_patch(id: EntryId, patch: &EntryPatch) -> Result<()> {
        if patch.expected.is_terminal() {
            return Err(Error::EntryFinalized {
                id,
                status: patch.expected,
            });
        }

        let room_allowed = matches!(
            patch.target,
            EntryStatus::Called | EntryStatus::InProgress
        );
        if patch.room_assignment.is_some() && !room_allowed {
            return Err(Error::Validation(format!(
                "room assignment is only allowed while called or in progress (target {})",
                patch.target
            )));
        }

        if patch.changes_status() {
            Self::check(id, patch.expected, patch.target)?;

            if patch.priority.is_some() {
                return Err(Error::Validation(
                    "priority cannot change together with status".to_string(),
                ));
            }
            // Leaving Waiting is what assigns the claimant
            if patch.expected == EntryStatus::Waiting && patch.claimed_by.is_none() {
                return Err(Error::Validation(format!(
                    "leaving waiting requires a caller id (target {})",
                    patch.target
                )));
            }
            return Ok(());
        }

        if patch.claimed_by.is_some() {
            return Err(Error::Validation(
                "claimant can only be set by a status change".to_string(),
            ));
        }
        if patch.priority.is_some() && patch.expected != EntryStatus::Waiting {
            return Err(Error::NotWaiting {
                id,
                status: patch.expected,
            });
        }
        if patch.priority.is_none() && patch.room_assignment.is_none() {
            return Err(Error::Validation("empty patch".to_string()));
        }

        Ok(())
    }

    /// Build the conditional patch that moves `entry` to `target`
    pub fn plan(
        entry: &QueueEntry,
        target: EntryStatus,
        caller_id: &str,
        room_assignment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<EntryPatch> {
        Self::check(entry.id, entry.status, target)?;
        let mut patch = EntryPatch::transition(entry.status, target, at).room(room_assignment);
        if entry.status == EntryStatus::Waiting {
            patch = patch.claimed_by(caller_id);
        }
        Self::validate_patch(entry.id, &patch)?;
        Ok(patch)
    }
}
