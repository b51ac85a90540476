//! Node executors
//!
//! Every node type is handled by a `NodeExecutor`. An executor receives the
//! node's data, the run's current context, the step runner, and the status
//! publisher, and returns the context the next node will see. Any side effect
//! must happen inside exactly one `StepRunner::run` call per logical action.
//!
//! Built-in executors here:
//! - INITIAL: no-op placeholder for graphs that have no trigger yet
//! - MANUAL_TRIGGER: checkpoints the incoming context
//!
//! The HTTP_REQUEST / WEBHOOK executor lives in `runtime::http`.

use crate::{
    error::EngineResult,
    runtime::{
        status::{publish_status, NodeStatus, StatusChannel, StatusEvent, StatusPublisher},
        step::StepRunner,
    },
    workflow::types::ExecutionContext,
};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Everything an executor gets for one node invocation
pub struct ExecutorInput<'a> {
    pub node_id: &'a str,
    /// Node configuration as authored; each executor validates its own schema
    pub data: &'a Map<String, Value>,
    /// Context accumulated by all preceding nodes
    pub context: ExecutionContext,
    pub step: &'a StepRunner,
    pub publisher: &'a dyn StatusPublisher,
}

impl ExecutorInput<'_> {
    /// Fire-and-forget status report for this node
    pub fn report(&self, channel: StatusChannel, status: NodeStatus) {
        publish_status(
            self.publisher,
            channel,
            StatusEvent::new(self.step.run_id(), self.node_id, status),
        );
    }

    /// Report the terminal status matching `result` and pass it through
    pub fn finish<T>(&self, channel: StatusChannel, result: EngineResult<T>) -> EngineResult<T> {
        match &result {
            Ok(_) => self.report(channel, NodeStatus::Success),
            Err(e) => {
                tracing::error!("❌ Node '{}' failed: {}", self.node_id, e);
                self.report(channel, NodeStatus::Error);
            }
        }
        result
    }
}

/// Contract every node type implements
#[async_trait]
pub trait NodeExecutor: Send + Sync + std::fmt::Debug {
    /// Status channel this executor's events are published on
    fn channel(&self) -> StatusChannel;

    async fn execute(&self, input: ExecutorInput<'_>) -> EngineResult<ExecutionContext>;
}

/// INITIAL: a node with no trigger configured; the context passes through
#[derive(Debug, Default)]
pub struct InitialExecutor;

#[async_trait]
impl NodeExecutor for InitialExecutor {
    fn channel(&self) -> StatusChannel {
        StatusChannel::Initial
    }

    async fn execute(&self, input: ExecutorInput<'_>) -> EngineResult<ExecutionContext> {
        input.report(self.channel(), NodeStatus::Loading);
        tracing::debug!("⏭️ Node '{}' has no trigger configured, passing context through", input.node_id);
        let context = input.context.clone();
        input.finish(self.channel(), Ok(context))
    }
}

/// MANUAL_TRIGGER: checkpoints the context the run was started with
#[derive(Debug, Default)]
pub struct ManualTriggerExecutor;

#[async_trait]
impl NodeExecutor for ManualTriggerExecutor {
    fn channel(&self) -> StatusChannel {
        StatusChannel::ManualTrigger
    }

    async fn execute(&self, input: ExecutorInput<'_>) -> EngineResult<ExecutionContext> {
        input.report(self.channel(), NodeStatus::Loading);

        let incoming = &input.context;
        let result = input
            .step
            .run(&format!("manual-trigger:{}", input.node_id), move || async move {
                Ok(incoming.clone())
            })
            .await;

        input.finish(self.channel(), result)
    }
}
