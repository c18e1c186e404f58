//! Queue service - the public operation set over stores, claims and stats
//!
//! Every mutation is a conditional write keyed on the entry's current status.
//! Successful mutations are logged, counted and appended to the encounter
//! ledger; the ledger is best-effort and never affects the returned result.

use crate::{
    db::{QueueStore, SequenceAllocator},
    metrics,
    models::{
        EntryId, EntryPatch, EntryStatus, NewEntry, Priority, PriorityInput, QueueEntry,
        QueueStats, WaitingPosition,
    },
    queue::{
        ClaimCoordinator, ClaimOutcome, Clock, ServiceCalendar, StatsAggregator, StatusMachine,
        SystemClock,
    },
    services::{
        directory::{OpenDirectory, PatientDirectory},
        ledger::{EncounterLedger, LedgerAction, LedgerEvent, TracingLedger},
    },
    Error, Result,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

/// Guarded writes re-read and retry when the entry moved on concurrently.
/// Status only moves forward and every path reaches a terminal state within
/// three steps, after which the patch itself is rejected.
const MAX_GUARDED_ATTEMPTS: usize = 4;

pub const DEFAULT_SERVICE_TYPE: &str = "consultation";

/// Enqueue input as received from a caller
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EnqueueRequest {
    #[validate(length(min = 1, max = 128))]
    pub patient_ref: String,
    #[validate(length(min = 1, max = 64))]
    pub department: String,
    pub priority: PriorityInput,
    #[validate(length(min = 1, max = 64))]
    pub service_type: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub encounter_ref: Option<String>,
}

pub struct QueueService {
    store: Arc<dyn QueueStore>,
    sequences: Arc<dyn SequenceAllocator>,
    directory: Arc<dyn PatientDirectory>,
    ledger: Arc<dyn EncounterLedger>,
    clock: Arc<dyn Clock>,
    calendar: ServiceCalendar,
    claims: ClaimCoordinator,
    stats: StatsAggregator,
    default_service_type: String,
}

pub struct QueueServiceBuilder {
    store: Arc<dyn QueueStore>,
    sequences: Arc<dyn SequenceAllocator>,
    directory: Arc<dyn PatientDirectory>,
    ledger: Arc<dyn EncounterLedger>,
    clock: Arc<dyn Clock>,
    calendar: ServiceCalendar,
    default_service_type: String,
}

impl QueueServiceBuilder {
    pub fn directory(mut self, directory: Arc<dyn PatientDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn EncounterLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn calendar(mut self, calendar: ServiceCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn default_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.default_service_type = service_type.into();
        self
    }

    pub fn build(self) -> QueueService {
        QueueService {
            claims: ClaimCoordinator::new(self.store.clone()),
            stats: StatsAggregator::new(self.store.clone(), self.calendar),
            store: self.store,
            sequences: self.sequences,
            directory: self.directory,
            ledger: self.ledger,
            clock: self.clock,
            calendar: self.calendar,
            default_service_type: self.default_service_type,
        }
    }
}

impl QueueService {
    /// Start from the two storage seams; collaborators default to an open
    /// directory, a tracing-only ledger, the system clock and UTC days.
    pub fn builder(
        store: Arc<dyn QueueStore>,
        sequences: Arc<dyn SequenceAllocator>,
    ) -> QueueServiceBuilder {
        QueueServiceBuilder {
            store,
            sequences,
            directory: Arc::new(OpenDirectory),
            ledger: Arc::new(TracingLedger),
            clock: Arc::new(SystemClock),
            calendar: ServiceCalendar::utc(),
            default_service_type: DEFAULT_SERVICE_TYPE.to_string(),
        }
    }

    /// Service day the clock currently falls in
    pub fn today(&self) -> NaiveDate {
        self.calendar.day_of(self.clock.now())
    }

    /// Add a patient to the back of their priority band
    ///
    /// # Errors
    /// * `Validation` / `InvalidPriority` - malformed input
    /// * `UnknownPatient` - the directory does not know `patient_ref`
    /// * `DuplicateActiveEntry` - the patient already has a non-terminal entry
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<QueueEntry> {
        let result = self.enqueue_inner(request).await;
        metrics::record_operation("enqueue", &result);
        result
    }

    async fn enqueue_inner(&self, request: EnqueueRequest) -> Result<QueueEntry> {
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        let priority = Priority::try_from(request.priority)?;
        let patient_ref = required("patient_ref", &request.patient_ref)?;
        let department = required("department", &request.department)?;
        let service_type = match &request.service_type {
            Some(s) => required("service_type", s)?,
            None => self.default_service_type.clone(),
        };
        let encounter_ref = request
            .encounter_ref
            .as_deref()
            .map(|e| required("encounter_ref", e))
            .transpose()?;

        if !self.directory.resolve(&patient_ref).await? {
            return Err(Error::UnknownPatient(patient_ref));
        }

        let entry = self
            .admit(patient_ref, department, priority, service_type, encounter_ref)
            .await?;
        self.ledger.record(LedgerEvent::for_entry(
            LedgerAction::Enqueued,
            &entry,
            None,
            entry.checked_in_at,
        ));
        Ok(entry)
    }

    /// Allocate a ticket number and insert a fresh waiting entry
    async fn admit(
        &self,
        patient_ref: String,
        department: String,
        priority: Priority,
        service_type: String,
        encounter_ref: Option<String>,
    ) -> Result<QueueEntry> {
        // Checked up front so rejected requests do not consume ticket numbers;
        // the store enforces it again atomically on insert.
        if let Some(existing) = self.store.find_active_for_patient(&patient_ref).await? {
            return Err(Error::DuplicateActiveEntry {
                patient_ref,
                entry_id: Some(existing.id),
            });
        }

        let now = self.clock.now();
        let service_day = self.calendar.day_of(now);
        let sequence = self
            .sequences
            .next_sequence(&department, service_day)
            .await?;

        let entry = QueueEntry::waiting(
            NewEntry {
                patient_ref,
                department,
                priority,
                service_type,
                encounter_ref,
                service_day,
            },
            sequence,
            now,
        );
        let entry = self.store.insert(&entry).await?;

        tracing::info!(
            entry_id = %entry.id,
            department = %entry.department,
            priority = %entry.priority,
            sequence = entry.sequence,
            %service_day,
            "Patient enqueued"
        );

        Ok(entry)
    }

    /// Claim the next waiting patient of `department` for `caller_id`
    pub async fn claim_next(
        &self,
        department: &str,
        caller_id: &str,
        room_assignment: Option<String>,
    ) -> Result<ClaimOutcome> {
        let result = self
            .claim_next_inner(department, caller_id, room_assignment)
            .await;
        metrics::record_operation("claim_next", &result);
        result
    }

    async fn claim_next_inner(
        &self,
        department: &str,
        caller_id: &str,
        room_assignment: Option<String>,
    ) -> Result<ClaimOutcome> {
        let department = required("department", department)?;
        let caller_id = required("caller_id", caller_id)?;
        let room_assignment = room_assignment
            .as_deref()
            .map(|r| required("room_assignment", r))
            .transpose()?;

        let (outcome, report) = self
            .claims
            .claim_next(&department, &caller_id, room_assignment, self.clock.now())
            .await?;

        metrics::QUEUE_CLAIM_ATTEMPTS.observe(report.attempts as f64);
        if report.conflicts > 0 {
            metrics::QUEUE_CLAIM_CONFLICTS_TOTAL
                .with_label_values(&[department.as_str()])
                .inc_by(report.conflicts as u64);
        }

        if let ClaimOutcome::Claimed(entry) = &outcome {
            self.record_status_change(entry, &caller_id);
        }
        Ok(outcome)
    }

    /// Move an entry to `target` on behalf of `caller_id`
    ///
    /// # Errors
    /// * `NotFound` - `id` does not resolve
    /// * `InvalidTransition` - `target` is not reachable from the current status
    /// * `EntryFinalized` - the entry is already terminal
    pub async fn transition(
        &self,
        id: EntryId,
        target: EntryStatus,
        caller_id: &str,
        room_assignment: Option<String>,
    ) -> Result<QueueEntry> {
        let result = self
            .transition_inner(id, target, caller_id, room_assignment)
            .await;
        metrics::record_operation("transition", &result);
        result
    }

    async fn transition_inner(
        &self,
        id: EntryId,
        target: EntryStatus,
        caller_id: &str,
        room_assignment: Option<String>,
    ) -> Result<QueueEntry> {
        let caller_id = required("caller_id", caller_id)?;
        let at = self.clock.now();

        let (_, updated) = self
            .apply_guarded(id, |current| {
                StatusMachine::plan(current, target, &caller_id, room_assignment.clone(), at)
            })
            .await?;

        self.record_status_change(&updated, &caller_id);
        Ok(updated)
    }

    /// Delete an entry that has not been claimed yet
    pub async fn remove(&self, id: EntryId) -> Result<()> {
        let result = self.remove_inner(id).await;
        metrics::record_operation("remove", &result);
        result
    }

    async fn remove_inner(&self, id: EntryId) -> Result<()> {
        let entry = self.get(id).await?;
        if entry.status != EntryStatus::Waiting {
            return Err(Error::CannotRemoveClaimedEntry {
                id,
                status: entry.status,
            });
        }

        if !self.store.delete_waiting(id).await? {
            // Claimed or deleted between the read and the delete
            return match self.store.find(id).await? {
                Some(current) => Err(Error::CannotRemoveClaimedEntry {
                    id,
                    status: current.status,
                }),
                None => Err(Error::entry_not_found(id)),
            };
        }

        tracing::info!(entry_id = %id, department = %entry.department, "Queue entry removed");
        self.ledger.record(LedgerEvent::for_entry(
            LedgerAction::Removed,
            &entry,
            None,
            self.clock.now(),
        ));
        Ok(())
    }

    pub async fn get(&self, id: EntryId) -> Result<QueueEntry> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| Error::entry_not_found(id))
    }

    /// Waiting entries of `department` in service order
    pub async fn list_waiting(&self, department: &str) -> Result<Vec<QueueEntry>> {
        let department = required("department", department)?;
        self.store.list_waiting(&department).await
    }

    /// Entries currently being served, earliest call first
    pub async fn now_serving(&self, department: Option<&str>) -> Result<Vec<QueueEntry>> {
        let mut serving = self
            .store
            .list_by_status(department, &EntryStatus::SERVING)
            .await?;
        serving.sort_by_key(|e| (e.called_at, e.rank()));
        Ok(serving)
    }

    /// Advisory counters for `day` (default: the current service day)
    pub async fn stats(
        &self,
        department: Option<&str>,
        day: Option<NaiveDate>,
    ) -> Result<QueueStats> {
        let day = day.unwrap_or_else(|| self.today());
        self.stats.snapshot(department, day).await
    }

    /// Where a waiting entry stands in its department's line
    ///
    /// # Errors
    /// * `NotWaiting` - the entry has already been claimed or ended
    pub async fn position(&self, id: EntryId) -> Result<WaitingPosition> {
        let entry = self.get(id).await?;
        if entry.status != EntryStatus::Waiting {
            return Err(Error::NotWaiting {
                id,
                status: entry.status,
            });
        }

        let waiting = self.store.list_waiting(&entry.department).await?;
        match waiting.iter().position(|e| e.id == id) {
            Some(index) => Ok(WaitingPosition {
                entry: waiting[index].clone(),
                position: index + 1,
                ahead: index,
            }),
            None => {
                let current = self.get(id).await?;
                Err(Error::NotWaiting {
                    id,
                    status: current.status,
                })
            }
        }
    }

    /// Change the priority of a waiting entry, keeping its ticket number
    pub async fn retriage(
        &self,
        id: EntryId,
        priority: PriorityInput,
        caller_id: &str,
    ) -> Result<QueueEntry> {
        let result = self.retriage_inner(id, priority, caller_id).await;
        metrics::record_operation("retriage", &result);
        result
    }

    async fn retriage_inner(
        &self,
        id: EntryId,
        priority: PriorityInput,
        caller_id: &str,
    ) -> Result<QueueEntry> {
        let priority = Priority::try_from(priority)?;
        let caller_id = required("caller_id", caller_id)?;
        let at = self.clock.now();

        let (before, updated) = self
            .apply_guarded(id, |current| {
                let patch = EntryPatch::fields(current.status, at).priority(priority);
                StatusMachine::validate_patch(id, &patch)?;
                Ok(patch)
            })
            .await?;

        tracing::info!(
            entry_id = %id,
            department = %updated.department,
            from = %before.priority,
            to = %updated.priority,
            caller_id = %caller_id,
            "Queue entry retriaged"
        );
        self.ledger.record(
            LedgerEvent::for_entry(
                LedgerAction::Retriaged,
                &updated,
                Some(caller_id.as_str()),
                at,
            )
            .with_details(json!({
                "from": before.priority.value(),
                "to": updated.priority.value(),
            })),
        );
        Ok(updated)
    }

    /// Set or move the room of an entry that is called or in progress
    pub async fn assign_room(
        &self,
        id: EntryId,
        room: &str,
        caller_id: &str,
    ) -> Result<QueueEntry> {
        let result = self.assign_room_inner(id, room, caller_id).await;
        metrics::record_operation("assign_room", &result);
        result
    }

    async fn assign_room_inner(
        &self,
        id: EntryId,
        room: &str,
        caller_id: &str,
    ) -> Result<QueueEntry> {
        let room = required("room_assignment", room)?;
        let caller_id = required("caller_id", caller_id)?;
        let at = self.clock.now();

        let (_, updated) = self
            .apply_guarded(id, |current| {
                let patch = EntryPatch::fields(current.status, at).room(Some(room.clone()));
                StatusMachine::validate_patch(id, &patch)?;
                Ok(patch)
            })
            .await?;

        tracing::info!(
            entry_id = %id,
            department = %updated.department,
            room = %room,
            caller_id = %caller_id,
            "Room assigned"
        );
        self.ledger.record(
            LedgerEvent::for_entry(
                LedgerAction::RoomAssigned,
                &updated,
                Some(caller_id.as_str()),
                at,
            )
            .with_details(json!({ "room": room })),
        );
        Ok(updated)
    }

    /// Put a no-show or cancelled patient back in line under a new ticket
    ///
    /// The original entry is left untouched; the new entry keeps its
    /// department, service type and encounter.
    pub async fn requeue(
        &self,
        id: EntryId,
        caller_id: &str,
        priority: Option<PriorityInput>,
    ) -> Result<QueueEntry> {
        let result = self.requeue_inner(id, caller_id, priority).await;
        metrics::record_operation("requeue", &result);
        result
    }

    async fn requeue_inner(
        &self,
        id: EntryId,
        caller_id: &str,
        priority: Option<PriorityInput>,
    ) -> Result<QueueEntry> {
        let caller_id = required("caller_id", caller_id)?;
        let original = self.get(id).await?;
        if !matches!(original.status, EntryStatus::NoShow | EntryStatus::Cancelled) {
            return Err(Error::InvalidTransition {
                from: original.status,
                to: EntryStatus::Waiting,
            });
        }
        let priority = match priority {
            Some(p) => Priority::try_from(p)?,
            None => original.priority,
        };

        let entry = self
            .admit(
                original.patient_ref.clone(),
                original.department.clone(),
                priority,
                original.service_type.clone(),
                original.encounter_ref.clone(),
            )
            .await?;

        tracing::info!(
            entry_id = %entry.id,
            requeued_from = %id,
            caller_id = %caller_id,
            "Patient requeued"
        );
        self.ledger.record(
            LedgerEvent::for_entry(
                LedgerAction::Requeued,
                &entry,
                Some(caller_id.as_str()),
                entry.checked_in_at,
            )
            .with_details(json!({ "requeued_from": id.to_string() })),
        );
        Ok(entry)
    }

    /// Re-read the entry and retry while the conditional write loses a race
    ///
    /// Returns the entry as read before the committed write and the entry as
    /// written.
    async fn apply_guarded<F>(&self, id: EntryId, mut build: F) -> Result<(QueueEntry, QueueEntry)>
    where
        F: FnMut(&QueueEntry) -> Result<EntryPatch>,
    {
        for _ in 0..MAX_GUARDED_ATTEMPTS {
            let current = self.get(id).await?;
            let patch = build(&current)?;
            if let Some(updated) = self.store.update(id, &patch).await? {
                return Ok((current, updated));
            }
            tracing::debug!(
                entry_id = %id,
                expected = %patch.expected,
                "Entry changed concurrently, re-reading"
            );
        }

        Err(Error::Internal(format!(
            "entry {} kept changing during a guarded update",
            id
        )))
    }

    fn record_status_change(&self, entry: &QueueEntry, caller_id: &str) {
        tracing::info!(
            entry_id = %entry.id,
            department = %entry.department,
            status = %entry.status,
            caller_id,
            "Queue entry status changed"
        );

        let at = match entry.status {
            EntryStatus::Called => entry.called_at,
            EntryStatus::InProgress => entry.started_at,
            _ => entry.ended_at,
        }
        .unwrap_or_else(|| self.clock.now());

        let action = LedgerAction::for_status(entry.status);
        let mut event = LedgerEvent::for_entry(action, entry, Some(caller_id), at);
        if let Some(room) = &entry.room_assignment {
            event = event.with_details(json!({ "room": room }));
        }
        self.ledger.record(event);
    }
}

/// Trimmed, non-empty identifier
fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}
