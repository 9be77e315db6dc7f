//! API endpoint handlers for agent learning.
//!
//! Every handler delegates to the `LearningCoordinator` in `ApiState`; no
//! handler touches learning.db directly.

use super::state::ApiState;
use crate::learning::{
    Account, AgentId, H256, LearningError, LearningRecord, LearningUpdate, Milestone,
    MutationOutcome, StoredEvent,
};

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a learning error onto a status code and a `{"error", "kind"}` body.
fn error_response(error: LearningError) -> Response {
    let status = match &error {
        LearningError::LearningNotEnabled { .. }
        | LearningError::AlreadyEnabled { .. }
        | LearningError::StaleRoot { .. } => StatusCode::CONFLICT,
        LearningError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        LearningError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        LearningError::InvalidProof { .. } | LearningError::InvalidRoot => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LearningError::UnknownModule { .. } | LearningError::InvalidConfig { .. } => {
            StatusCode::BAD_REQUEST
        }
        LearningError::AgentNotFound { .. } => StatusCode::NOT_FOUND,
        LearningError::Database(_) | LearningError::Other(_) => {
            tracing::warn!(%error, "learning request failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "learning storage failed", "kind": error.kind()})),
            )
                .into_response();
        }
    };

    (
        status,
        Json(serde_json::json!({"error": error.to_string(), "kind": error.kind()})),
    )
        .into_response()
}

#[derive(Serialize)]
pub(super) struct MutationResponse {
    pub record: LearningRecord,
    pub milestones: Vec<Milestone>,
}

impl From<MutationOutcome> for MutationResponse {
    fn from(outcome: MutationOutcome) -> Self {
        Self {
            record: outcome.record,
            milestones: outcome.milestones,
        }
    }
}

// ---------------------------------------------------------------------------
// GET /agents/{agent_id}/learning
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub(super) struct LearningStatusResponse {
    pub agent_id: AgentId,
    pub learning_enabled: bool,
    pub module: Account,
    pub root: H256,
    pub version: u64,
    pub daily_update_count: u32,
    pub remaining_updates: u32,
}

pub(super) async fn get_learning(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<AgentId>,
) -> impl IntoResponse {
    let record = match state.coordinator.get_record(agent_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return error_response(LearningError::AgentNotFound { agent_id }),
        Err(error) => return error_response(error),
    };

    let daily_update_count = state.coordinator.current_daily_updates(&record);
    let remaining_updates = state.coordinator.remaining_updates(&record);

    Json(LearningStatusResponse {
        agent_id,
        learning_enabled: record.learning_enabled,
        module: record.module,
        root: record.root,
        version: record.version,
        daily_update_count,
        remaining_updates,
    })
    .into_response()
}

// ---------------------------------------------------------------------------
// GET /agents/{agent_id}/learning/metrics
// ---------------------------------------------------------------------------

pub(super) async fn get_metrics(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<AgentId>,
) -> impl IntoResponse {
    match state.coordinator.get_learning_metrics(agent_id).await {
        Ok(metrics) => Json(metrics).into_response(),
        Err(error) => error_response(error),
    }
}

// ---------------------------------------------------------------------------
// GET /agents/{agent_id}/learning/history
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(super) struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub(super) struct HistoryResponse {
    pub events: Vec<StoredEvent>,
}

pub(super) async fn get_history(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<AgentId>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    match state.coordinator.learning_history(agent_id, limit).await {
        Ok(events) => Json(HistoryResponse { events }).into_response(),
        Err(error) => error_response(error),
    }
}

// ---------------------------------------------------------------------------
// POST /agents/{agent_id}/learning/verify
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(super) struct VerifyRequest {
    pub claim: H256,
    #[serde(default)]
    pub proof: Vec<H256>,
}

#[derive(Serialize)]
pub(super) struct VerifyResponse {
    pub valid: bool,
    pub root: H256,
}

pub(super) async fn verify(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<AgentId>,
    Json(request): Json<VerifyRequest>,
) -> impl IntoResponse {
    match state
        .coordinator
        .verify_learning_with_root(agent_id, request.claim, &request.proof)
        .await
    {
        Ok((valid, root)) => Json(VerifyResponse { valid, root }).into_response(),
        Err(error) => error_response(error),
    }
}

// ---------------------------------------------------------------------------
// POST /agents/{agent_id}/learning/enable
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(super) struct EnableRequest {
    pub caller: Account,
    pub module: Account,
    pub initial_root: H256,
}

pub(super) async fn enable(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<AgentId>,
    Json(request): Json<EnableRequest>,
) -> impl IntoResponse {
    match state
        .coordinator
        .enable_learning(&request.caller, agent_id, request.module, request.initial_root)
        .await
    {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

// ---------------------------------------------------------------------------
// POST /agents/{agent_id}/learning/disable
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(super) struct CallerRequest {
    pub caller: Account,
}

pub(super) async fn disable(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<AgentId>,
    Json(request): Json<CallerRequest>,
) -> impl IntoResponse {
    match state
        .coordinator
        .disable_learning(&request.caller, agent_id)
        .await
    {
        Ok(record) => Json(record).into_response(),
        Err(error) => error_response(error),
    }
}

// ---------------------------------------------------------------------------
// POST /agents/{agent_id}/learning/interactions
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(super) struct InteractionRequest {
    pub caller: Account,
    pub payload_hash: H256,
}

pub(super) async fn record_interaction(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<AgentId>,
    Json(request): Json<InteractionRequest>,
) -> impl IntoResponse {
    match state
        .coordinator
        .record_interaction(&request.caller, agent_id, request.payload_hash)
        .await
    {
        Ok(outcome) => Json(MutationResponse::from(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

// ---------------------------------------------------------------------------
// POST /agents/{agent_id}/learning/updates
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(super) struct UpdateRequest {
    pub caller: Account,
    #[serde(flatten)]
    pub update: LearningUpdate,
}

pub(super) async fn update_learning(
    State(state): State<Arc<ApiState>>,
    Path(agent_id): Path<AgentId>,
    Json(request): Json<UpdateRequest>,
) -> impl IntoResponse {
    match state
        .coordinator
        .update_learning(&request.caller, agent_id, request.update)
        .await
    {
        Ok(outcome) => Json(MutationResponse::from(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}
