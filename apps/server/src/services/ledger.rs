//! Encounter ledger: best-effort activity log of queue transitions.
//!
//! Recording never fails the caller. The Postgres ledger hands rows to a
//! bounded channel drained by a background task; if a row cannot be written
//! it is logged and dropped. A committed queue transition is never rolled
//! back because its ledger row was lost.

use crate::models::{EntryId, EntryStatus, QueueEntry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    Enqueued,
    Called,
    Started,
    Completed,
    NoShow,
    Cancelled,
    Removed,
    Retriaged,
    RoomAssigned,
    Requeued,
}

impl LedgerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerAction::Enqueued => "enqueued",
            LedgerAction::Called => "called",
            LedgerAction::Started => "started",
            LedgerAction::Completed => "completed",
            LedgerAction::NoShow => "no_show",
            LedgerAction::Cancelled => "cancelled",
            LedgerAction::Removed => "removed",
            LedgerAction::Retriaged => "retriaged",
            LedgerAction::RoomAssigned => "room_assigned",
            LedgerAction::Requeued => "requeued",
        }
    }

    /// Event for a status change into `status`
    pub fn for_status(status: EntryStatus) -> Self {
        match status {
            EntryStatus::Waiting => LedgerAction::Enqueued,
            EntryStatus::Called => LedgerAction::Called,
            EntryStatus::InProgress => LedgerAction::Started,
            EntryStatus::Completed => LedgerAction::Completed,
            EntryStatus::NoShow => LedgerAction::NoShow,
            EntryStatus::Cancelled => LedgerAction::Cancelled,
        }
    }
}

impl fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEvent {
    pub action: LedgerAction,
    pub entry_id: EntryId,
    pub caller_id: Option<String>,
    pub patient_ref: String,
    pub department: String,
    pub details: Option<JsonValue>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEvent {
    pub fn for_entry(
        action: LedgerAction,
        entry: &QueueEntry,
        caller_id: Option<&str>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            action,
            entry_id: entry.id,
            caller_id: caller_id.map(str::to_string),
            patient_ref: entry.patient_ref.clone(),
            department: entry.department.clone(),
            details: None,
            recorded_at,
        }
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}

pub trait EncounterLedger: Send + Sync {
    /// Append an event; must return without waiting on storage
    fn record(&self, event: LedgerEvent);
}

/// Ledger that only emits tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLedger;

impl EncounterLedger for TracingLedger {
    fn record(&self, event: LedgerEvent) {
        tracing::info!(
            target: "encounter_ledger",
            event = %event.action,
            entry_id = %event.entry_id,
            caller_id = event.caller_id.as_deref().unwrap_or("-"),
            department = %event.department,
            "Ledger event"
        );
    }
}

#[derive(Clone)]
pub struct PostgresEncounterLedger {
    sender: mpsc::Sender<LedgerEvent>,
}

impl PostgresEncounterLedger {
    /// Spawns the background writer; must be called inside a Tokio runtime
    pub fn new(db_pool: PgPool, channel_capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<LedgerEvent>(channel_capacity.max(1));

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = insert_ledger_row(&db_pool, &event).await {
                    tracing::warn!(
                        entry_id = %event.entry_id,
                        event = %event.action,
                        "Failed to persist encounter_ledger row: {}",
                        e
                    );
                }
            }
        });

        tracing::info!(channel_capacity, "Encounter ledger initialized (encounter_ledger)");

        Self { sender }
    }
}

impl EncounterLedger for PostgresEncounterLedger {
    fn record(&self, event: LedgerEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    if let Err(e) = sender.send(event).await {
                        tracing::warn!("Failed to enqueue ledger event: {}", e);
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!(
                    entry_id = %event.entry_id,
                    "Ledger event queue closed; dropping event"
                );
            }
        }
    }
}

async fn insert_ledger_row(pool: &PgPool, event: &LedgerEvent) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO encounter_ledger (
            event,
            entry_id,
            caller_id,
            patient_ref,
            department,
            details,
            recorded_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(event.action.as_str())
    .bind(event.entry_id.as_uuid())
    .bind(&event.caller_id)
    .bind(&event.patient_ref)
    .bind(&event.department)
    .bind(&event.details)
    .bind(event.recorded_at)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names() {
        assert_eq!(LedgerAction::for_status(EntryStatus::NoShow).as_str(), "no_show");
        assert_eq!(
            LedgerAction::for_status(EntryStatus::InProgress),
            LedgerAction::Started
        );
        assert_eq!(LedgerAction::RoomAssigned.to_string(), "room_assigned");
        assert_eq!(
            serde_json::to_value(LedgerAction::Requeued).unwrap(),
            serde_json::json!("requeued")
        );
    }
}
