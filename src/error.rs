//! Error taxonomy for the execution core
//!
//! Every failure a run can produce is an `EngineError`. Only `Retriable` errors
//! are re-attempted by the step runner; everything else halts the run.

use thiserror::Error;

/// Errors produced while validating, loading, or executing a workflow run
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation ------
    /// Trigger event is missing a mandatory field
    #[error("invalid trigger event: {0}")]
    InvalidTrigger(String),

    /// Every node in the snapshot was malformed or the snapshot was empty
    #[error("no valid nodes to execute")]
    NoValidNodes,

    /// Node data failed its executor's schema
    #[error("invalid configuration for node '{node_id}': {message}")]
    NodeConfig { node_id: String, message: String },

    // ------ Structural ------
    /// Workflow does not exist or is not owned by the requesting user
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Two valid nodes share the same id
    #[error("duplicate node id: '{0}'")]
    DuplicateNodeId(String),

    /// Connection graph is not acyclic; carries the ids left unprocessed
    #[error("workflow graph contains a cycle among nodes: {}", .0.join(", "))]
    Cycle(Vec<String>),

    /// No executor is registered for the node type tag
    #[error("unknown node type: '{0}'")]
    UnknownNodeType(String),

    /// A node type was registered twice
    #[error("executor already registered for node type '{0}'")]
    DuplicateExecutor(String),

    /// A replayed run id already belongs to another workflow or user
    #[error("run id '{0}' cannot be reused for this workflow")]
    RunConflict(String),

    /// Registry was built without an executor for a known node type
    #[error("no executor registered for node type '{0}'")]
    MissingExecutor(String),

    // ------ Execution ------
    /// Fatal failure inside an executor; the run halts
    #[error("{0}")]
    NonRetriable(String),

    /// Transient failure; the step runner may re-attempt the step
    #[error("{0}")]
    Retriable(String),

    // ------ Internal ------
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Broad error classes, used by the HTTP layer to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    NotFound,
    Conflict,
    Structural,
    Execution,
    Internal,
}

impl EngineError {
    /// Whether the step runner is allowed to re-attempt the failed work
    pub fn is_retriable(&self) -> bool {
        matches!(self, EngineError::Retriable(_))
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            EngineError::InvalidTrigger(_)
            | EngineError::NoValidNodes
            | EngineError::NodeConfig { .. } => ErrorClass::Validation,
            EngineError::WorkflowNotFound(_) => ErrorClass::NotFound,
            EngineError::RunConflict(_) => ErrorClass::Conflict,
            EngineError::DuplicateNodeId(_)
            | EngineError::Cycle(_)
            | EngineError::UnknownNodeType(_)
            | EngineError::DuplicateExecutor(_)
            | EngineError::MissingExecutor(_) => ErrorClass::Structural,
            EngineError::NonRetriable(_) | EngineError::Retriable(_) => ErrorClass::Execution,
            EngineError::Storage(_) | EngineError::Serialization(_) => ErrorClass::Internal,
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
