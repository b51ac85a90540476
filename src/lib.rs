//! Flowline: durable workflow execution core
//!
//! Loads a workflow snapshot, orders its nodes with a deterministic
//! topological sort, and runs them one by one through registered executors,
//! checkpointing each side effect and publishing node status as it goes.

// Core configuration and setup
pub mod config;

// Error taxonomy shared by every layer
pub mod error;

// Workflow model and snapshot storage
pub mod workflow;

// Execution engine: sorter, registry, executors, step runner, status
pub mod runtime;

// HTTP API layer - run triggers, status polling, workflow upserts
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::{EngineError, EngineResult};
pub use runtime::{ExecutionEngine, ExecutorRegistry};
pub use server::{create_app, start_server};
pub use workflow::{Connection, ExecutionContext, Node, NodeType, RunResult, TriggerEvent, Workflow};
