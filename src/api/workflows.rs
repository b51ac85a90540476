//! Workflow definition endpoint
//!
//! Saves editor snapshots into the SQLite workflow store so they can be run.
//! Saving an existing id replaces its definition; runs already in flight keep
//! the snapshot they loaded.

use crate::{
    api::{error_response, AppState},
    workflow::types::Workflow,
};
use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};
use serde::Serialize;
use serde_json::{json, Value};

/// Response for workflow save operations
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub message: String,
}

pub fn create_workflow_routes() -> Router<AppState> {
    Router::new().route("/api/workflows", post(save_workflow))
}

/// Create or replace a workflow
///
/// POST /api/workflows
/// Body: { "id": "...", "userId": "...", "nodes": [...], "connections": [...] }
async fn save_workflow(
    State(state): State<AppState>,
    Json(workflow): Json<Workflow>,
) -> Result<Json<WorkflowResponse>, (StatusCode, Json<Value>)> {
    if workflow.id.trim().is_empty() || workflow.user_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "workflow id and userId are required" })),
        ));
    }

    state.workflows.save_workflow(&workflow).await.map_err(|e| error_response(&e))?;
    tracing::info!("💾 Saved workflow {} ({} nodes)", workflow.id, workflow.nodes.len());

    Ok(Json(WorkflowResponse {
        id: workflow.id,
        message: "Workflow saved".to_string(),
    }))
}
