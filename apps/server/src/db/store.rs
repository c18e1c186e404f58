//! PostgreSQL queue store

use crate::{
    db::traits::{QueueStore, StatusCounts},
    models::{EntryId, EntryPatch, EntryStatus, Priority, QueueEntry},
    queue::StatusMachine,
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const ENTRY_COLUMNS: &str = "id, patient_ref, encounter_ref, department, service_type, priority, \
     sequence, service_day, status, room_assignment, claimed_by, \
     checked_in_at, called_at, started_at, ended_at";

const ONE_ACTIVE_PER_PATIENT: &str = "queue_entries_one_active_per_patient";

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    patient_ref: String,
    encounter_ref: Option<String>,
    department: String,
    service_type: String,
    priority: i32,
    sequence: i64,
    service_day: NaiveDate,
    status: String,
    room_assignment: Option<String>,
    claimed_by: Option<String>,
    checked_in_at: DateTime<Utc>,
    called_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<EntryRow> for QueueEntry {
    type Error = Error;

    fn try_from(row: EntryRow) -> Result<Self> {
        let status = EntryStatus::try_from(row.status).map_err(Error::Internal)?;
        let priority = Priority::try_from(row.priority)
            .map_err(|e| Error::Internal(format!("corrupt priority on {}: {}", row.id, e)))?;

        Ok(QueueEntry {
            id: EntryId::from(row.id),
            patient_ref: row.patient_ref,
            encounter_ref: row.encounter_ref,
            department: row.department,
            service_type: row.service_type,
            priority,
            sequence: row.sequence,
            service_day: row.service_day,
            status,
            room_assignment: row.room_assignment,
            claimed_by: row.claimed_by,
            checked_in_at: row.checked_in_at,
            called_at: row.called_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
        })
    }
}

fn into_entries(rows: Vec<EntryRow>) -> Result<Vec<QueueEntry>> {
    rows.into_iter().map(QueueEntry::try_from).collect()
}

/// Queue store backed by the `queue_entries` table
#[derive(Clone)]
pub struct PostgresQueueStore {
    pool: PgPool,
}

impl PostgresQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl QueueStore for PostgresQueueStore {
    async fn insert(&self, entry: &QueueEntry) -> Result<QueueEntry> {
        let query = format!(
            r#"
            INSERT INTO queue_entries ({ENTRY_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {ENTRY_COLUMNS}
            "#
        );

        let result = sqlx::query_as::<_, EntryRow>(&query)
            .bind(entry.id.as_uuid())
            .bind(&entry.patient_ref)
            .bind(&entry.encounter_ref)
            .bind(&entry.department)
            .bind(&entry.service_type)
            .bind(entry.priority.value())
            .bind(entry.sequence)
            .bind(entry.service_day)
            .bind(entry.status.as_str())
            .bind(&entry.room_assignment)
            .bind(&entry.claimed_by)
            .bind(entry.checked_in_at)
            .bind(entry.called_at)
            .bind(entry.started_at)
            .bind(entry.ended_at)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => QueueEntry::try_from(row),
            Err(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some(ONE_ACTIVE_PER_PATIENT) =>
            {
                Err(Error::DuplicateActiveEntry {
                    patient_ref: entry.patient_ref.clone(),
                    entry_id: None,
                })
            }
            Err(e) => Err(Error::Database(e)),
        }
    }

    async fn find(&self, id: EntryId) -> Result<Option<QueueEntry>> {
        let query = format!("SELECT {ENTRY_COLUMNS} FROM queue_entries WHERE id = $1");

        let row = sqlx::query_as::<_, EntryRow>(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(QueueEntry::try_from).transpose()
    }

    async fn update(&self, id: EntryId, patch: &EntryPatch) -> Result<Option<QueueEntry>> {
        StatusMachine::validate_patch(id, patch)?;

        // Timestamps are stamped only on a status change and only if still unset.
        // The `status = $7` guard turns this into a compare-and-swap: a competing
        // writer that committed first leaves zero matching rows.
        let query = format!(
            r#"
            UPDATE queue_entries
            SET status = $2,
                claimed_by = COALESCE(claimed_by, $3),
                room_assignment = COALESCE($4, room_assignment),
                priority = COALESCE($5, priority),
                called_at = CASE
                    WHEN $8 AND $2 = 'called' AND called_at IS NULL THEN $6
                    ELSE called_at END,
                started_at = CASE
                    WHEN $8 AND $2 = 'in_progress' AND started_at IS NULL THEN $6
                    ELSE started_at END,
                ended_at = CASE
                    WHEN $8 AND $2 IN ('completed', 'no_show', 'cancelled') AND ended_at IS NULL THEN $6
                    ELSE ended_at END
            WHERE id = $1
              AND status = $7
            RETURNING {ENTRY_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, EntryRow>(&query)
            .bind(id.as_uuid())
            .bind(patch.target.as_str())
            .bind(&patch.claimed_by)
            .bind(&patch.room_assignment)
            .bind(patch.priority.map(|p| p.value()))
            .bind(patch.at)
            .bind(patch.expected.as_str())
            .bind(patch.changes_status())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(QueueEntry::try_from).transpose()
    }

    async fn list_waiting(&self, department: &str) -> Result<Vec<QueueEntry>> {
        let query = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM queue_entries
            WHERE department = $1
              AND status = 'waiting'
            ORDER BY priority ASC, service_day ASC, sequence ASC
            "#
        );

        let rows = sqlx::query_as::<_, EntryRow>(&query)
            .bind(department)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        into_entries(rows)
    }

    async fn list_by_status(
        &self,
        department: Option<&str>,
        statuses: &[EntryStatus],
    ) -> Result<Vec<QueueEntry>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let query = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM queue_entries
            WHERE ($1::text IS NULL OR department = $1)
              AND status = ANY($2)
            ORDER BY priority ASC, service_day ASC, sequence ASC
            "#
        );

        let rows = sqlx::query_as::<_, EntryRow>(&query)
            .bind(department)
            .bind(&statuses)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        into_entries(rows)
    }

    async fn find_active_for_patient(&self, patient_ref: &str) -> Result<Option<QueueEntry>> {
        let query = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM queue_entries
            WHERE patient_ref = $1
              AND status IN ('waiting', 'called', 'in_progress')
            "#
        );

        let row = sqlx::query_as::<_, EntryRow>(&query)
            .bind(patient_ref)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(QueueEntry::try_from).transpose()
    }

    async fn delete_waiting(&self, id: EntryId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM queue_entries WHERE id = $1 AND status = 'waiting'")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_by_status(
        &self,
        department: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<StatusCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*)
            FROM queue_entries
            WHERE ($1::text IS NULL OR department = $1)
              AND (
                status IN ('waiting', 'called', 'in_progress')
                OR (ended_at >= $2 AND ended_at < $3)
              )
            GROUP BY status
            "#,
        )
        .bind(department)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter()
            .map(|(status, count)| {
                EntryStatus::try_from(status)
                    .map(|s| (s, count))
                    .map_err(Error::Internal)
            })
            .collect()
    }

    async fn average_wait_seconds(
        &self,
        department: Option<&str>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let avg: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT AVG(EXTRACT(EPOCH FROM (called_at - checked_in_at)))::float8
            FROM queue_entries
            WHERE ($1::text IS NULL OR department = $1)
              AND called_at IS NOT NULL
              AND called_at >= $2
              AND called_at < $3
            "#,
        )
        .bind(department)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(avg)
    }
}
