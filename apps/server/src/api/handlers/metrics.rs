//! Metrics endpoint handler
//!
//! Exposes Prometheus-compatible metrics for monitoring

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};

use crate::state::AppState;

/// Handler for /metrics endpoint
///
/// Scrape-time gauges are refreshed first so the queue counts reflect the
/// store at the moment of the scrape.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let custom_metrics = state
        .metrics_service
        .collect_custom_metrics(
            env!("CARGO_PKG_VERSION"),
            state.config.queue.backend.as_str(),
        )
        .await;

    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => {
            buffer.extend_from_slice(custom_metrics.as_bytes());
            (
                StatusCode::OK,
                [("Content-Type", "text/plain; version=0.0.4; charset=utf-8")],
                buffer,
            )
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain")],
                b"Failed to encode metrics".to_vec(),
            )
        }
    }
}
