//! Runtime Execution Engine
//!
//! Everything between "a trigger arrived" and "here is the final context":
//! - Deterministic topological ordering of nodes
//! - Executor registry and the built-in node executors
//! - Durable, memoized steps with retry for transient failures
//! - Fire-and-forget node status publishing

// Execution driver: validate, load, sort, run nodes in order
pub mod engine;

// Node executor contract plus INITIAL and MANUAL_TRIGGER
pub mod executor;

// HTTP_REQUEST / WEBHOOK executor
pub mod http;

// NodeType -> executor table
pub mod registry;

// Per-family status channels
pub mod status;

// Checkpointed step runner
pub mod step;

// Kahn's algorithm over a petgraph DiGraph
pub mod topology;

pub use engine::ExecutionEngine;
pub use executor::{ExecutorInput, NodeExecutor};
pub use registry::ExecutorRegistry;
pub use status::{ChannelStatusPublisher, NodeStatus, StatusChannel, StatusEvent, StatusPublisher};
pub use step::{MemoryStepStore, RetryPolicy, RunOwner, SqliteStepStore, StepRunner, StepStore};
