//! Contested dequeue: hand the best-ranked waiting entry to exactly one caller

use crate::{
    db::QueueStore,
    models::{EntryPatch, EntryStatus, QueueEntry},
    Result,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Result of one `claim_next` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed(QueueEntry),
    /// The waiting list was empty, or every candidate was taken by someone else
    NoOneWaiting,
}

impl ClaimOutcome {
    pub fn into_entry(self) -> Option<QueueEntry> {
        match self {
            ClaimOutcome::Claimed(entry) => Some(entry),
            ClaimOutcome::NoOneWaiting => None,
        }
    }
}

/// Details of a finished claim, for logging and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimReport {
    /// Conditional writes issued
    pub attempts: usize,
    /// Candidates lost to a competing caller
    pub conflicts: usize,
}

pub struct ClaimCoordinator {
    store: Arc<dyn QueueStore>,
}

impl ClaimCoordinator {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Claim the highest-ranked waiting entry of `department` for `caller_id`
    ///
    /// Takes one snapshot of the waiting list and walks it in rank order,
    /// issuing a single `Waiting -> Called` conditional write per candidate.
    /// A failed guard means another caller won that entry, so the next
    /// candidate is tried. Entries enqueued after the snapshot are not
    /// considered, which bounds the loop by the snapshot size.
    pub async fn claim_next(
        &self,
        department: &str,
        caller_id: &str,
        room_assignment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(ClaimOutcome, ClaimReport)> {
        let candidates = self.store.list_waiting(department).await?;
        let mut report = ClaimReport {
            attempts: 0,
            conflicts: 0,
        };

        for candidate in candidates {
            let patch = EntryPatch::transition(EntryStatus::Waiting, EntryStatus::Called, at)
                .claimed_by(caller_id)
                .room(room_assignment.clone());

            report.attempts += 1;
            match self.store.update(candidate.id, &patch).await? {
                Some(claimed) => {
                    tracing::info!(
                        entry_id = %claimed.id,
                        department,
                        caller_id,
                        sequence = claimed.sequence,
                        priority = %claimed.priority,
                        attempts = report.attempts,
                        "Claimed queue entry"
                    );
                    return Ok((ClaimOutcome::Claimed(claimed), report));
                }
                None => {
                    report.conflicts += 1;
                    tracing::debug!(
                        entry_id = %candidate.id,
                        department,
                        caller_id,
                        "Candidate already claimed, trying next"
                    );
                }
            }
        }

        tracing::debug!(
            department,
            caller_id,
            conflicts = report.conflicts,
            "No one waiting"
        );
        Ok((ClaimOutcome::NoOneWaiting, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryQueueStore, StatusCounts};
    use crate::models::{EntryId, NewEntry, Priority};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn new_entry(patient: &str, priority: i32, sequence: i64) -> QueueEntry {
        QueueEntry::waiting(
            NewEntry {
                patient_ref: patient.to_string(),
                department: "General".to_string(),
                priority: Priority::new(priority).unwrap(),
                service_type: "consultation".to_string(),
                encounter_ref: None,
                service_day: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            },
            sequence,
            Utc::now(),
        )
    }

    /// Lets a rival caller claim the top candidate between snapshot and write
    struct RacingStore {
        inner: MemoryQueueStore,
        raced: AtomicBool,
    }

    #[async_trait]
    impl QueueStore for RacingStore {
        async fn insert(&self, entry: &QueueEntry) -> Result<QueueEntry> {
            self.inner.insert(entry).await
        }

        async fn find(&self, id: EntryId) -> Result<Option<QueueEntry>> {
            self.inner.find(id).await
        }

        async fn update(&self, id: EntryId, patch: &EntryPatch) -> Result<Option<QueueEntry>> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                let rival =
                    EntryPatch::transition(EntryStatus::Waiting, EntryStatus::Called, patch.at)
                        .claimed_by("rival");
                self.inner.update(id, &rival).await?;
            }
            self.inner.update(id, patch).await
        }

        async fn list_waiting(&self, department: &str) -> Result<Vec<QueueEntry>> {
            self.inner.list_waiting(department).await
        }

        async fn list_by_status(
            &self,
            department: Option<&str>,
            statuses: &[EntryStatus],
        ) -> Result<Vec<QueueEntry>> {
            self.inner.list_by_status(department, statuses).await
        }

        async fn find_active_for_patient(&self, patient_ref: &str) -> Result<Option<QueueEntry>> {
            self.inner.find_active_for_patient(patient_ref).await
        }

        async fn delete_waiting(&self, id: EntryId) -> Result<bool> {
            self.inner.delete_waiting(id).await
        }

        async fn count_by_status(
            &self,
            department: Option<&str>,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<StatusCounts> {
            self.inner.count_by_status(department, from, to).await
        }

        async fn average_wait_seconds(
            &self,
            department: Option<&str>,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Option<f64>> {
            self.inner.average_wait_seconds(department, from, to).await
        }
    }

    #[tokio::test]
    async fn test_claim_moves_past_a_stolen_candidate() {
        let inner = MemoryQueueStore::new();
        let urgent = inner.insert(&new_entry("urgent", 1, 1)).await.unwrap();
        let routine = inner.insert(&new_entry("routine", 4, 2)).await.unwrap();

        let store = Arc::new(RacingStore {
            inner: inner.clone(),
            raced: AtomicBool::new(false),
        });
        let coordinator = ClaimCoordinator::new(store);

        let (outcome, report) = coordinator
            .claim_next("General", "desk-1", None, Utc::now())
            .await
            .unwrap();

        let claimed = outcome.into_entry().expect("second candidate claimed");
        assert_eq!(claimed.id, routine.id);
        assert_eq!(claimed.claimed_by.as_deref(), Some("desk-1"));
        assert_eq!(report, ClaimReport { attempts: 2, conflicts: 1 });

        let stolen = inner.find(urgent.id).await.unwrap().unwrap();
        assert_eq!(stolen.claimed_by.as_deref(), Some("rival"));
    }

    #[tokio::test]
    async fn test_claim_on_empty_department() {
        let coordinator = ClaimCoordinator::new(Arc::new(MemoryQueueStore::new()));
        let (outcome, report) = coordinator
            .claim_next("General", "desk-1", Some("R1".into()), Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome, ClaimOutcome::NoOneWaiting);
        assert_eq!(report.attempts, 0);
    }

    #[tokio::test]
    async fn test_claim_sets_room_and_called_at() {
        let store = MemoryQueueStore::new();
        store.insert(&new_entry("p-1", 3, 1)).await.unwrap();
        let coordinator = ClaimCoordinator::new(Arc::new(store));
        let at = Utc::now();

        let (outcome, _) = coordinator
            .claim_next("General", "desk-1", Some("Room 4".into()), at)
            .await
            .unwrap();
        let claimed = outcome.into_entry().unwrap();

        assert_eq!(claimed.status, EntryStatus::Called);
        assert_eq!(claimed.room_assignment.as_deref(), Some("Room 4"));
        assert_eq!(claimed.called_at, Some(at));
    }
}
