//! Queue API Routes

use crate::api::handlers::queue;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

/// Routes mounted under `/queue`
pub fn queue_routes() -> Router<AppState> {
    Router::new()
        .route("/entries", post(queue::enqueue))
        .route(
            "/entries/:id",
            get(queue::get_entry).delete(queue::remove_entry),
        )
        .route("/entries/:id/transition", post(queue::transition))
        .route("/entries/:id/room", post(queue::assign_room))
        .route("/entries/:id/priority", post(queue::retriage))
        .route("/entries/:id/requeue", post(queue::requeue))
        .route("/entries/:id/position", get(queue::position))
        .route("/departments/:department/claim", post(queue::claim_next))
        .route("/departments/:department/waiting", get(queue::list_waiting))
        .route("/now-serving", get(queue::now_serving))
        .route("/stats", get(queue::stats))
}
