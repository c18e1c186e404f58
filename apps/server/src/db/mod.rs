//! Database layer - queue stores, sequence allocators and connection setup

pub mod memory;
pub mod sequence;
pub mod store;
pub mod traits;

pub use memory::{MemoryQueueStore, MemorySequenceAllocator};
pub use sequence::PostgresSequenceAllocator;
pub use store::PostgresQueueStore;
pub use traits::{QueueStore, SequenceAllocator, StatusCounts};

use crate::config::DatabaseConfig;
use crate::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Create the PostgreSQL pool with per-connection timeouts applied
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let statement_timeout_ms = config.statement_timeout_seconds * 1000;
    let lock_timeout_ms = config.lock_timeout_seconds * 1000;

    let pool = PgPoolOptions::new()
        .min_connections(config.pool_min_size)
        .max_connections(config.pool_max_size)
        .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                let statement = format!(
                    "SET statement_timeout = {}; SET lock_timeout = {}",
                    statement_timeout_ms, lock_timeout_ms
                );
                sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&statement)).await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
        .map_err(crate::Error::Database)?;

    tracing::info!(
        max_connections = config.pool_max_size,
        "Database pool initialized"
    );

    Ok(pool)
}

/// Apply pending schema migrations
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| crate::Error::Internal(format!("migration failed: {}", e)))?;

    tracing::info!("Database migrations applied");
    Ok(())
}
