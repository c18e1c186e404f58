//! Metrics collection for the queue server
//!
//! Prometheus metrics for HTTP traffic, queue operations and claim contention.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
};

lazy_static! {
    // HTTP Request Metrics

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "queue_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("Failed to register HTTP_REQUESTS_TOTAL");

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "queue_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register HTTP_REQUEST_DURATION_SECONDS");

    /// In-flight HTTP requests
    pub static ref HTTP_REQUESTS_IN_FLIGHT: IntGaugeVec = register_int_gauge_vec!(
        "queue_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
        &["method", "path"]
    )
    .expect("Failed to register HTTP_REQUESTS_IN_FLIGHT");

    // Queue Operation Metrics

    /// Queue operations by name and outcome (ok or error kind)
    pub static ref QUEUE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "queue_operations_total",
        "Total number of queue operations",
        &["operation", "outcome"]
    )
    .expect("Failed to register QUEUE_OPERATIONS_TOTAL");

    /// Conditional writes needed per claim
    pub static ref QUEUE_CLAIM_ATTEMPTS: Histogram = register_histogram!(
        "queue_claim_attempts",
        "Conditional writes issued per claim_next call",
        vec![0.0, 1.0, 2.0, 3.0, 5.0, 10.0, 25.0, 50.0]
    )
    .expect("Failed to register QUEUE_CLAIM_ATTEMPTS");

    /// Candidates lost to a competing caller
    pub static ref QUEUE_CLAIM_CONFLICTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "queue_claim_conflicts_total",
        "Total number of claim candidates taken by another caller",
        &["department"]
    )
    .expect("Failed to register QUEUE_CLAIM_CONFLICTS_TOTAL");

    /// Entries per status, refreshed on scrape
    pub static ref QUEUE_ENTRIES: IntGaugeVec = register_int_gauge_vec!(
        "queue_entries",
        "Number of queue entries by status for the current service day",
        &["status"]
    )
    .expect("Failed to register QUEUE_ENTRIES");

    // Database Metrics

    /// Active database connections
    pub static ref DB_CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        "queue_db_connections_active",
        "Number of active database connections"
    )
    .expect("Failed to register DB_CONNECTIONS_ACTIVE");

    /// Idle database connections
    pub static ref DB_CONNECTIONS_IDLE: IntGauge = register_int_gauge!(
        "queue_db_connections_idle",
        "Number of idle database connections"
    )
    .expect("Failed to register DB_CONNECTIONS_IDLE");
}

/// Record the outcome of one queue operation
pub fn record_operation<T>(operation: &str, result: &crate::Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    QUEUE_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Helper to sanitize path for metrics labels (remove IDs, limit cardinality)
pub fn sanitize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [] => "/".to_string(),
        ["queue", "entries", _id] => "/queue/entries/{id}".to_string(),
        ["queue", "entries", _id, action] => format!("/queue/entries/{{id}}/{action}"),
        ["queue", "departments", _dept, action] => {
            format!("/queue/departments/{{department}}/{action}")
        }
        _ if segments.len() > 3 => format!("/{}", segments[..2].join("/")),
        _ => format!("/{}", segments.join("/")),
    }
}
