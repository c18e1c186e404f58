//! Shared application state handed to every handler

use crate::{
    config::{Config, QueueBackendKind},
    db::{
        self, MemoryQueueStore, MemorySequenceAllocator, PostgresQueueStore,
        PostgresSequenceAllocator,
    },
    queue::ServiceCalendar,
    services::{
        EncounterLedger, MetricsService, OpenDirectory, PatientDirectory,
        PostgresEncounterLedger, PostgresPatientDirectory, QueueService, TracingLedger,
    },
};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub queue: Arc<QueueService>,
    pub metrics_service: Arc<MetricsService>,
    /// Present for the postgres backend or a postgres-backed directory
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// Wire stores and collaborators according to `config`
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let calendar = ServiceCalendar::new(config.queue.day_offset_minutes)
            .context("queue.day_offset_minutes is out of range")?;

        let needs_pool =
            config.queue.backend == QueueBackendKind::Postgres || config.directory.enabled;
        let db_pool = if needs_pool {
            let pool = db::connect(&config.database)
                .await
                .context("Failed to connect to database")?;
            if config.database.run_migrations {
                db::migrate(&pool).await.context("Failed to run migrations")?;
            }
            Some(pool)
        } else {
            None
        };

        let builder = match (config.queue.backend, &db_pool) {
            (QueueBackendKind::Postgres, Some(pool)) => QueueService::builder(
                Arc::new(PostgresQueueStore::new(pool.clone())),
                Arc::new(PostgresSequenceAllocator::new(pool.clone())),
            ),
            (QueueBackendKind::Postgres, None) => {
                anyhow::bail!("postgres backend selected without a database pool")
            }
            (QueueBackendKind::Memory, _) => {
                tracing::warn!("Using in-memory queue backend; entries are lost on restart");
                QueueService::builder(
                    Arc::new(MemoryQueueStore::new()),
                    Arc::new(MemorySequenceAllocator::new()),
                )
            }
        };

        let directory: Arc<dyn PatientDirectory> = match (&db_pool, config.directory.enabled) {
            (Some(pool), true) => Arc::new(
                PostgresPatientDirectory::new(
                    pool.clone(),
                    &config.directory.table,
                    &config.directory.id_column,
                )
                .context("Invalid patient directory configuration")?,
            ),
            _ => Arc::new(OpenDirectory),
        };

        let ledger: Arc<dyn EncounterLedger> = match (&db_pool, config.ledger.enabled) {
            (Some(pool), true) if config.queue.backend == QueueBackendKind::Postgres => Arc::new(
                PostgresEncounterLedger::new(pool.clone(), config.ledger.channel_capacity),
            ),
            _ => Arc::new(TracingLedger),
        };

        let queue = builder
            .directory(directory)
            .ledger(ledger)
            .calendar(calendar)
            .default_service_type(config.queue.default_service_type.clone())
            .build();

        tracing::info!(
            backend = config.queue.backend.as_str(),
            directory = config.directory.enabled,
            ledger = config.ledger.enabled,
            day_offset_minutes = config.queue.day_offset_minutes,
            "Queue service initialized"
        );

        Ok(Self::from_service(config, queue, db_pool))
    }

    /// State around an already assembled queue service
    pub fn from_service(config: Config, queue: QueueService, db_pool: Option<PgPool>) -> Self {
        let queue = Arc::new(queue);
        let metrics_service = Arc::new(MetricsService::new(queue.clone(), db_pool.clone()));

        Self {
            config: Arc::new(config),
            queue,
            metrics_service,
            db_pool,
        }
    }
}
