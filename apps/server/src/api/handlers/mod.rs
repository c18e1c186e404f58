//! Request handlers for API endpoints

pub mod metrics;
pub mod queue;

pub use metrics::metrics_handler;
