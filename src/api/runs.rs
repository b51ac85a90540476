//! Run trigger and status endpoints
//!
//! `POST /api/runs` executes a workflow synchronously and returns the final
//! context. `GET /api/runs/{run_id}/status` returns the latest status of each
//! node in the run (`initial` until the node starts), for clients that poll
//! instead of subscribing.

use crate::{
    api::{error_response, AppState},
    runtime::status::StatusEvent,
    workflow::types::{RunResult, TriggerEvent},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::Value;

/// Latest node statuses for one run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusResponse {
    pub run_id: String,
    pub nodes: Vec<StatusEvent>,
}

pub fn create_run_routes() -> Router<AppState> {
    Router::new()
        .route("/api/runs", post(trigger_run))
        .route("/api/runs/{run_id}/status", get(run_status))
}

/// Execute a workflow
///
/// POST /api/runs
/// Body: { "workflowId": "...", "userId": "...", "initialData": { ... } }
async fn trigger_run(
    State(state): State<AppState>,
    Json(event): Json<TriggerEvent>,
) -> Result<Json<RunResult>, (StatusCode, Json<Value>)> {
    tracing::info!(
        "📥 Run requested for workflow {:?} by user {:?}",
        event.workflow_id,
        event.user_id
    );

    match state.engine.execute(event).await {
        Ok(run) => {
            tracing::info!("✅ Run {} of workflow {} finished", run.run_id, run.workflow_id);
            Ok(Json(run))
        }
        Err(e) => Err(error_response(&e)),
    }
}

/// GET /api/runs/{run_id}/status
async fn run_status(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatusResponse>, StatusCode> {
    let nodes = state.status.run_status(&run_id);
    if nodes.is_empty() {
        tracing::debug!("🔍 No statuses recorded for run {}", run_id);
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(RunStatusResponse { run_id, nodes }))
}
