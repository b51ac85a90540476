//! Workflow model and snapshot storage
//!
//! - Type definitions (Workflow, Node, Connection, TriggerEvent, ExecutionContext)
//! - Read-only snapshot stores (SQLite via sqlx, and in-memory)

// Core workflow type definitions
pub mod types;

// Snapshot stores the execution driver reads from
pub mod storage;

pub use storage::{MemoryWorkflowStore, WorkflowStorage, WorkflowStore};
pub use types::{
    Connection, ExecutionContext, Node, NodeType, Position, RunResult, TriggerEvent, ValidNode,
    Workflow,
};
