//! Queue endpoint handlers
//!
//! Thin adapters: extract and validate input, call [`QueueService`], and map
//! the result to a status code. Errors render through `Error::into_response`.
//!
//! [`QueueService`]: crate::services::QueueService

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use crate::{
    api::extractors::{EntryPath, ValidJson},
    models::{EntryStatus, PriorityInput},
    queue::ClaimOutcome,
    services::EnqueueRequest,
    state::AppState,
    Result,
};

#[derive(Debug, Deserialize, Validate)]
pub struct ClaimRequest {
    #[validate(length(min = 1, max = 128))]
    pub caller_id: String,
    #[validate(length(min = 1, max = 64))]
    pub room_assignment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransitionRequest {
    pub status: EntryStatus,
    #[validate(length(min = 1, max = 128))]
    pub caller_id: String,
    #[validate(length(min = 1, max = 64))]
    pub room_assignment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RoomRequest {
    #[validate(length(min = 1, max = 64))]
    pub room_assignment: String,
    #[validate(length(min = 1, max = 128))]
    pub caller_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PriorityRequest {
    pub priority: PriorityInput,
    #[validate(length(min = 1, max = 128))]
    pub caller_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RequeueRequest {
    #[validate(length(min = 1, max = 128))]
    pub caller_id: String,
    pub priority: Option<PriorityInput>,
}

#[derive(Debug, Deserialize)]
pub struct DepartmentQuery {
    pub department: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub department: Option<String>,
    pub day: Option<NaiveDate>,
}

/// POST /queue/entries
pub async fn enqueue(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<EnqueueRequest>,
) -> Result<impl IntoResponse> {
    let entry = state.queue.enqueue(request).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /queue/entries/:id
pub async fn get_entry(
    State(state): State<AppState>,
    EntryPath(id): EntryPath,
) -> Result<impl IntoResponse> {
    Ok(Json(state.queue.get(id).await?))
}

/// DELETE /queue/entries/:id
pub async fn remove_entry(
    State(state): State<AppState>,
    EntryPath(id): EntryPath,
) -> Result<StatusCode> {
    state.queue.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /queue/entries/:id/transition
pub async fn transition(
    State(state): State<AppState>,
    EntryPath(id): EntryPath,
    ValidJson(request): ValidJson<TransitionRequest>,
) -> Result<impl IntoResponse> {
    let entry = state
        .queue
        .transition(id, request.status, &request.caller_id, request.room_assignment)
        .await?;
    Ok(Json(entry))
}

/// POST /queue/entries/:id/room
pub async fn assign_room(
    State(state): State<AppState>,
    EntryPath(id): EntryPath,
    ValidJson(request): ValidJson<RoomRequest>,
) -> Result<impl IntoResponse> {
    let entry = state
        .queue
        .assign_room(id, &request.room_assignment, &request.caller_id)
        .await?;
    Ok(Json(entry))
}

/// POST /queue/entries/:id/priority
pub async fn retriage(
    State(state): State<AppState>,
    EntryPath(id): EntryPath,
    ValidJson(request): ValidJson<PriorityRequest>,
) -> Result<impl IntoResponse> {
    let entry = state
        .queue
        .retriage(id, request.priority, &request.caller_id)
        .await?;
    Ok(Json(entry))
}

/// POST /queue/entries/:id/requeue
pub async fn requeue(
    State(state): State<AppState>,
    EntryPath(id): EntryPath,
    ValidJson(request): ValidJson<RequeueRequest>,
) -> Result<impl IntoResponse> {
    let entry = state
        .queue
        .requeue(id, &request.caller_id, request.priority)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /queue/entries/:id/position
pub async fn position(
    State(state): State<AppState>,
    EntryPath(id): EntryPath,
) -> Result<impl IntoResponse> {
    Ok(Json(state.queue.position(id).await?))
}

/// POST /queue/departments/:department/claim
///
/// 200 with the claimed entry, or 204 when no one is waiting.
pub async fn claim_next(
    State(state): State<AppState>,
    Path(department): Path<String>,
    ValidJson(request): ValidJson<ClaimRequest>,
) -> Result<Response> {
    let outcome = state
        .queue
        .claim_next(&department, &request.caller_id, request.room_assignment)
        .await?;

    Ok(match outcome {
        ClaimOutcome::Claimed(entry) => Json(entry).into_response(),
        ClaimOutcome::NoOneWaiting => StatusCode::NO_CONTENT.into_response(),
    })
}

/// GET /queue/departments/:department/waiting
pub async fn list_waiting(
    State(state): State<AppState>,
    Path(department): Path<String>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.queue.list_waiting(&department).await?))
}

/// GET /queue/now-serving
pub async fn now_serving(
    State(state): State<AppState>,
    Query(query): Query<DepartmentQuery>,
) -> Result<impl IntoResponse> {
    let serving = state.queue.now_serving(query.department.as_deref()).await?;
    Ok(Json(serving))
}

/// GET /queue/stats
pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse> {
    let stats = state
        .queue
        .stats(query.department.as_deref(), query.day)
        .await?;
    Ok(Json(stats))
}
