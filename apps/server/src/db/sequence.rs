//! PostgreSQL ticket number allocator

use crate::{db::traits::SequenceAllocator, Error, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

/// One counter row per (department, day) in `queue_sequences`
///
/// The upsert takes the row lock, so concurrent enqueues across any number of
/// service instances serialize on the partition and never see the same value.
#[derive(Clone)]
pub struct PostgresSequenceAllocator {
    pool: PgPool,
}

impl PostgresSequenceAllocator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SequenceAllocator for PostgresSequenceAllocator {
    async fn next_sequence(&self, department: &str, service_day: NaiveDate) -> Result<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO queue_sequences (department, service_day, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (department, service_day)
            DO UPDATE SET last_value = queue_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(department)
        .bind(service_day)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        tracing::debug!(department, %service_day, sequence = value, "Allocated ticket number");

        Ok(value)
    }
}
