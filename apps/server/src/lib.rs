//! Clinic queue service
//!
//! Per-department patient queues with priority-then-arrival ordering,
//! contested claiming by concurrent staff terminals, a guarded lifecycle
//! state machine and advisory statistics. Served over HTTP by `queue-server`.

#![allow(clippy::too_many_arguments)]

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod request_context;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
