//! Execution driver
//!
//! Runs one workflow per trigger event:
//! validate trigger → load snapshot → drop malformed nodes → sort → execute
//! each node in order, threading the context → return the final context.
//!
//! Nodes run strictly one after another on the calling task. The first error
//! ends the run; nodes after the failing one never start.

use crate::{
    error::{EngineError, EngineResult},
    runtime::{
        executor::ExecutorInput,
        registry::ExecutorRegistry,
        status::{publish_status, NodeStatus, StatusEvent, StatusPublisher},
        step::{self, RetryPolicy, RunOwner, StepRunner, StepStore},
        topology,
    },
    workflow::{
        storage::WorkflowStore,
        types::{Node, RunResult, TriggerEvent, ValidNode},
    },
};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Orchestrates workflow runs
///
/// Holds only shared, read-only collaborators; concurrent runs share nothing
/// mutable except through their own step namespace.
#[derive(Debug)]
pub struct ExecutionEngine {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<ExecutorRegistry>,
    steps: Arc<dyn StepStore>,
    publisher: Arc<dyn StatusPublisher>,
    retry: RetryPolicy,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        registry: Arc<ExecutorRegistry>,
        steps: Arc<dyn StepStore>,
        publisher: Arc<dyn StatusPublisher>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            registry,
            steps,
            publisher,
            retry,
        }
    }

    /// Execute the workflow a trigger event points at
    ///
    /// The trigger is validated before the store is consulted. Supplying a
    /// `runId` that already ran replays it: completed steps return their
    /// checkpoints instead of running again, even if the trigger now carries
    /// different data. A run id is bound to the first workflow and user that
    /// used it; anyone else reusing it gets `RunConflict`.
    pub async fn execute(&self, event: TriggerEvent) -> EngineResult<RunResult> {
        let (workflow_id, user_id) = match event.validate() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("❌ Rejected trigger event: {}", e);
                return Err(e);
            }
        };

        let run_id = event
            .run_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = tracing::info_span!("workflow_run", workflow_id = %workflow_id, run_id = %run_id);
        self.run(workflow_id, user_id, run_id, &event)
            .instrument(span)
            .await
    }

    async fn run(&self, workflow_id: &str, user_id: &str, run_id: String, event: &TriggerEvent) -> EngineResult<RunResult> {
        let run_start_time = std::time::Instant::now();
        tracing::info!("🚀 Starting workflow run");

        let workflow = self.store.get_workflow(workflow_id, user_id).await.map_err(|e| {
            tracing::warn!("❌ Could not load workflow: {}", e);
            e
        })?;
        tracing::debug!(
            "📊 Loaded snapshot with {} nodes and {} connections",
            workflow.nodes.len(),
            workflow.connections.len()
        );

        step::claim_run(
            self.steps.as_ref(),
            &RunOwner::new(run_id.as_str(), workflow.id.as_str(), user_id),
        )
        .await?;

        let nodes = executable_nodes(&workflow.nodes)?;

        tracing::debug!("🔄 Computing topological execution order");
        let order = topology::sort(&nodes, &workflow.connections)?;
        tracing::debug!(
            "📋 Execution order: {:?}",
            order.iter().map(|node| node.id.as_str()).collect::<Vec<_>>()
        );

        // Every node is visible to pollers from the start, even ones a failure never reaches
        for node in &order {
            if let Ok(executor) = self.registry.get_executor(&node.node_type) {
                publish_status(
                    self.publisher.as_ref(),
                    executor.channel(),
                    StatusEvent::new(run_id.as_str(), node.id.as_str(), NodeStatus::Initial),
                );
            }
        }

        let step = StepRunner::new(run_id.as_str(), Arc::clone(&self.steps), self.retry.clone());
        let mut context = event.seed_context();

        for (position, node) in order.iter().enumerate() {
            let executor = self.registry.get_executor(&node.node_type).map_err(|e| {
                tracing::error!("❌ Node '{}' cannot be dispatched: {}", node.id, e);
                e
            })?;

            tracing::info!(
                "📍 Step {}/{}: Executing node '{}' (type: {})",
                position + 1,
                order.len(),
                node.id,
                node.node_type
            );
            let node_start_time = std::time::Instant::now();

            context = executor
                .execute(ExecutorInput {
                    node_id: &node.id,
                    data: &node.data,
                    context,
                    step: &step,
                    publisher: self.publisher.as_ref(),
                })
                .await
                .map_err(|e| {
                    tracing::error!(
                        "❌ Run aborted at node '{}' after {:?}: {}",
                        node.id,
                        run_start_time.elapsed(),
                        e
                    );
                    e
                })?;

            tracing::info!("✅ Node '{}' completed in {:?}", node.id, node_start_time.elapsed());
        }

        tracing::info!(
            "🎉 Workflow run completed: {} nodes in {:?}",
            order.len(),
            run_start_time.elapsed()
        );

        Ok(RunResult {
            workflow_id: workflow.id,
            run_id,
            result: context,
        })
    }
}

/// Keep nodes that have both `id` and `type`; warn about the rest
fn executable_nodes(nodes: &[Node]) -> EngineResult<Vec<ValidNode>> {
    let valid: Vec<ValidNode> = nodes
        .iter()
        .enumerate()
        .filter_map(|(position, node)| {
            let valid = node.validated();
            if valid.is_none() {
                tracing::warn!(
                    "⚠️ Dropping node at position {} (id: {:?}, type: {:?}): id and type are required",
                    position,
                    node.id,
                    node.node_type
                );
            }
            valid
        })
        .collect();

    if valid.is_empty() {
        tracing::error!("❌ No valid nodes to execute");
        return Err(EngineError::NoValidNodes);
    }
    Ok(valid)
}
