//! In-process queue backend
//!
//! Same contracts as the PostgreSQL backend, with the compare-and-swap
//! performed under the write lock. Suitable for single-instance deployments,
//! demos and tests; state is lost on restart.

use crate::{
    db::traits::{QueueStore, SequenceAllocator, StatusCounts},
    models::{EntryId, EntryPatch, EntryStatus, QueueEntry},
    queue::StatusMachine,
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Clone, Default)]
pub struct MemoryQueueStore {
    entries: Arc<RwLock<HashMap<EntryId, QueueEntry>>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn in_department(entry: &QueueEntry, department: Option<&str>) -> bool {
    department.map_or(true, |d| entry.department == d)
}

fn sorted(mut entries: Vec<QueueEntry>) -> Vec<QueueEntry> {
    entries.sort_by_key(|e| e.rank());
    entries
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert(&self, entry: &QueueEntry) -> Result<QueueEntry> {
        let mut entries = self.entries.write().await;

        if entry.status.is_active() {
            if let Some(existing) = entries
                .values()
                .find(|e| e.patient_ref == entry.patient_ref && e.status.is_active())
            {
                return Err(Error::DuplicateActiveEntry {
                    patient_ref: entry.patient_ref.clone(),
                    entry_id: Some(existing.id),
                });
            }
        }
        if entries.contains_key(&entry.id) {
            return Err(Error::Internal(format!("duplicate entry id {}", entry.id)));
        }

        entries.insert(entry.id, entry.clone());
        Ok(entry.clone())
    }

    async fn find(&self, id: EntryId) -> Result<Option<QueueEntry>> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn update(&self, id: EntryId, patch: &EntryPatch) -> Result<Option<QueueEntry>> {
        StatusMachine::validate_patch(id, patch)?;

        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&id) else {
            return Ok(None);
        };
        if entry.status != patch.expected {
            return Ok(None);
        }

        patch.apply_to(entry);
        Ok(Some(entry.clone()))
    }

    async fn list_waiting(&self, department: &str) -> Result<Vec<QueueEntry>> {
        self.list_by_status(Some(department), &[EntryStatus::Waiting]).await
    }

    async fn list_by_status(
        &self,
        department: Option<&str>,
        statuses: &[EntryStatus],
    ) -> Result<Vec<QueueEntry>> {
        let entries = self.entries.read().await;
        let matching = entries
            .values()
            .filter(|e| in_department(e, department) && statuses.contains(&e.status))
            .cloned()
            .collect();
        Ok(sorted(matching))
    }

    async fn find_active_for_patient(&self, patient_ref: &str) -> Result<Option<QueueEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .find(|e| e.patient_ref == patient_ref && e.status.is_active())
            .cloned())
    }

    async fn delete_waiting(&self, id: EntryId) -> Result<bool> {
        let mut entries = self.entries.write().await;
        match entries.get(&id) {
            Some(entry) if entry.status == EntryStatus::Waiting => {
                entries.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_by_status(
        &self,
        department: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<StatusCounts> {
        let entries = self.entries.read().await;
        let mut counts: HashMap<EntryStatus, i64> = HashMap::new();
        for entry in entries.values() {
            if !in_department(entry, department) {
                continue;
            }
            let ended_within = entry.ended_at.is_some_and(|at| at >= from && at < to);
            if entry.status.is_active() || ended_within {
                *counts.entry(entry.status).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    async fn average_wait_seconds(
        &self,
        department: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let entries = self.entries.read().await;
        let waits: Vec<f64> = entries
            .values()
            .filter(|e| in_department(e, department))
            .filter_map(|e| {
                let called = e.called_at?;
                let wait = (called - e.checked_in_at).num_milliseconds() as f64 / 1000.0;
                (called >= from && called < to).then_some(wait)
            })
            .collect();

        if waits.is_empty() {
            return Ok(None);
        }
        Ok(Some(waits.iter().sum::<f64>() / waits.len() as f64))
    }
}

/// Per-partition counters held in process memory
#[derive(Clone, Default)]
pub struct MemorySequenceAllocator {
    counters: Arc<Mutex<HashMap<(String, NaiveDate), i64>>>,
}

impl MemorySequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceAllocator for MemorySequenceAllocator {
    async fn next_sequence(&self, department: &str, service_day: NaiveDate) -> Result<i64> {
        let mut counters = self.counters.lock().await;
        let counter = counters
            .entry((department.to_string(), service_day))
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}
