//! Metrics service for collecting application metrics

use crate::services::QueueService;
use sqlx::PgPool;
use std::sync::Arc;

/// Refreshes scrape-time gauges before the registry is encoded
pub struct MetricsService {
    queue: Arc<QueueService>,
    pool: Option<PgPool>,
}

impl MetricsService {
    pub fn new(queue: Arc<QueueService>, pool: Option<PgPool>) -> Self {
        Self { queue, pool }
    }

    /// Update database connection pool metrics
    pub fn update_db_connection_metrics(&self) {
        let Some(pool) = &self.pool else {
            return;
        };
        let pool_size = pool.size();
        let idle = pool.num_idle() as u32;

        crate::metrics::DB_CONNECTIONS_ACTIVE.set(pool_size.saturating_sub(idle) as i64);
        crate::metrics::DB_CONNECTIONS_IDLE.set(idle as i64);
    }

    /// Update per-status entry gauges for the current service day
    pub async fn update_queue_metrics(&self) {
        match self.queue.stats(None, None).await {
            Ok(stats) => {
                let gauges = [
                    ("waiting", stats.waiting_count),
                    ("called", stats.called_count),
                    ("in_progress", stats.in_progress_count),
                    ("completed", stats.completed_count),
                    ("no_show", stats.no_show_count),
                ];
                for (status, count) in gauges {
                    crate::metrics::QUEUE_ENTRIES
                        .with_label_values(&[status])
                        .set(count);
                }
            }
            Err(e) => tracing::warn!("Failed to refresh queue metrics: {}", e),
        }
    }

    /// Collect all custom application metrics
    pub async fn collect_custom_metrics(&self, server_version: &str, backend: &str) -> String {
        self.update_db_connection_metrics();
        self.update_queue_metrics().await;

        let mut output = String::new();
        output.push_str("# HELP queue_server_info Queue server information\n");
        output.push_str("# TYPE queue_server_info gauge\n");
        output.push_str(&format!(
            "queue_server_info{{version=\"{}\",backend=\"{}\"}} 1\n",
            server_version, backend
        ));

        output
    }
}
