//! Application services - queue operations and their collaborators

pub mod directory;
pub mod ledger;
pub mod metrics;
pub mod queue;

pub use directory::{OpenDirectory, PatientDirectory, PostgresPatientDirectory, StaticDirectory};
pub use ledger::{
    EncounterLedger, LedgerAction, LedgerEvent, PostgresEncounterLedger, TracingLedger,
};
pub use metrics::MetricsService;
pub use queue::{EnqueueRequest, QueueService, QueueServiceBuilder, DEFAULT_SERVICE_TYPE};
