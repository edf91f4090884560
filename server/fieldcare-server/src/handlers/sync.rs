//! Sync protocol endpoints
//!
//! - POST /api/v1/sync/push — apply a batch of pending client mutations
//! - POST /api/v1/sync/pull — fetch role-scoped changes since a cursor
//! - GET  /api/v1/sync/history — admin audit listing (cursor-paginated)
//!
//! Per-operation outcomes (applied vs. conflict) live inside the push
//! response body; transport-level errors are reserved for a malformed
//! overall request, missing identity, or an engine fault.

use audit_engine::AuditPage;
use axum::extract::{Query, State};
use axum::Json;
use fieldcare_sync::{HistoryRequest, PullRequest, PullResponse, PushRequest, PushResponse};
use tracing::info;

use crate::error::{api_success, ApiError, ApiResponse};
use crate::extract::ActorIdentity;
use crate::AppState;

pub async fn push(
    State(state): State<AppState>,
    ActorIdentity(actor): ActorIdentity,
    Json(request): Json<PushRequest>,
) -> Result<Json<ApiResponse<PushResponse>>, ApiError> {
    info!(
        actor_id = %actor.actor_id,
        device_id = %request.device_id,
        ops = request.ops.len(),
        "push request received"
    );

    let response = state.engine.push(&actor, request).await?;
    Ok(Json(api_success(response)))
}

pub async fn pull(
    State(state): State<AppState>,
    ActorIdentity(actor): ActorIdentity,
    Json(request): Json<PullRequest>,
) -> Result<Json<ApiResponse<PullResponse>>, ApiError> {
    info!(
        actor_id = %actor.actor_id,
        device_id = %request.device_id,
        since = ?request.since,
        "pull request received"
    );

    let response = state.engine.pull(&actor, request).await?;
    Ok(Json(api_success(response)))
}

pub async fn history(
    State(state): State<AppState>,
    ActorIdentity(actor): ActorIdentity,
    Query(request): Query<HistoryRequest>,
) -> Result<Json<ApiResponse<AuditPage>>, ApiError> {
    let page = state.engine.history(&actor, request).await?;
    Ok(Json(api_success(page)))
}
