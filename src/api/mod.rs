//! HTTP API Layer
//!
//! Thin axum surface over the execution core:
//! - Workflow definition upserts
//! - Run triggering and status polling

use crate::{
    error::{EngineError, ErrorClass},
    runtime::{engine::ExecutionEngine, status::ChannelStatusPublisher},
    workflow::storage::WorkflowStorage,
};
use axum::{http::StatusCode, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

pub mod runs;
pub mod workflows;

pub use runs::create_run_routes;
pub use workflows::create_workflow_routes;

/// Shared handles for every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<ExecutionEngine>,
    pub workflows: WorkflowStorage,
    /// Same hub the engine publishes to; read for status polling
    pub status: Arc<ChannelStatusPublisher>,
}

/// Map an engine error onto a status code and `{error}` body
pub fn error_response(error: &EngineError) -> (StatusCode, Json<Value>) {
    let status = status_for(error);
    if status.is_server_error() {
        tracing::error!("❌ Request failed: {}", error);
    } else {
        tracing::warn!("❌ Request rejected ({}): {}", status, error);
    }
    (status, Json(json!({ "error": error.to_string() })))
}

fn status_for(error: &EngineError) -> StatusCode {
    match error.class() {
        ErrorClass::Validation | ErrorClass::Structural => StatusCode::BAD_REQUEST,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Conflict => StatusCode::CONFLICT,
        ErrorClass::Execution => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
