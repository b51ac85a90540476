//! Executor registry
//!
//! A closed `NodeType -> executor` table built once at startup and shared
//! read-only by every run. Building fails on duplicate registrations and on
//! node types left without an executor, so a deployment gap shows up before
//! the first run rather than halfway through one.

use crate::{
    config::EngineConfig,
    error::{EngineError, EngineResult},
    runtime::{
        executor::{InitialExecutor, ManualTriggerExecutor, NodeExecutor},
        http::HttpRequestExecutor,
    },
    workflow::types::NodeType,
};
use std::{collections::HashMap, sync::Arc};

#[derive(Debug)]
pub struct ExecutorRegistry {
    executors: HashMap<NodeType, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn builder() -> ExecutorRegistryBuilder {
        ExecutorRegistryBuilder::default()
    }

    /// Registry with every built-in executor
    ///
    /// HTTP_REQUEST and WEBHOOK share a single HTTP executor.
    pub fn with_builtins(config: &EngineConfig) -> EngineResult<Self> {
        let http: Arc<dyn NodeExecutor> = Arc::new(HttpRequestExecutor::new(
            config.http_timeout(),
            config.retry_transient_http,
        )?);

        Self::builder()
            .register(NodeType::Initial, Arc::new(InitialExecutor))?
            .register(NodeType::ManualTrigger, Arc::new(ManualTriggerExecutor))?
            .register(NodeType::HttpRequest, Arc::clone(&http))?
            .register(NodeType::Webhook, http)?
            .build()
    }

    /// Executor for a node's type tag
    ///
    /// Always fatal on failure: an unknown tag is a definition or deployment
    /// problem, never a transient one.
    pub fn get_executor(&self, tag: &str) -> EngineResult<Arc<dyn NodeExecutor>> {
        let node_type: NodeType = tag.parse()?;
        self.executors
            .get(&node_type)
            .cloned()
            .ok_or_else(|| EngineError::UnknownNodeType(tag.to_string()))
    }

    pub fn registered_types(&self) -> Vec<NodeType> {
        NodeType::ALL
            .into_iter()
            .filter(|node_type| self.executors.contains_key(node_type))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct ExecutorRegistryBuilder {
    executors: HashMap<NodeType, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistryBuilder {
    pub fn register(mut self, node_type: NodeType, executor: Arc<dyn NodeExecutor>) -> EngineResult<Self> {
        if self.executors.contains_key(&node_type) {
            return Err(EngineError::DuplicateExecutor(node_type.to_string()));
        }
        tracing::debug!("🧩 Registered executor for {} ({:?})", node_type, executor.channel());
        self.executors.insert(node_type, executor);
        Ok(self)
    }

    /// Finish the registry; every `NodeType` must have an executor
    pub fn build(self) -> EngineResult<ExecutorRegistry> {
        if let Some(missing) = NodeType::ALL
            .into_iter()
            .find(|node_type| !self.executors.contains_key(node_type))
        {
            return Err(EngineError::MissingExecutor(missing.to_string()));
        }
        Ok(ExecutorRegistry {
            executors: self.executors,
        })
    }
}
