//! Core workflow type definitions
//!
//! Nodes, connections, and workflows as the editor stores them, plus the
//! per-run data (trigger event, execution context, run result). These are
//! serialized to and from camelCase JSON.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, str::FromStr};

/// A complete workflow snapshot as supplied by the workflow store
///
/// Read-only for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Unique workflow identifier
    pub id: String,
    /// Owning user; the store only hands the snapshot to this user
    pub user_id: String,
    /// Nodes in editor order (this order breaks ties when sorting)
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Directed connections between nodes
    #[serde(default)]
    pub connections: Vec<Connection>,
}

/// A single node as authored in the editor
///
/// `id` and `type` are optional on the wire so that a half-configured node can
/// be dropped from a run with a warning instead of failing the whole snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Type tag; parsed into `NodeType` at dispatch time
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    /// Node-specific configuration, validated by the executor
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Layout hint for the editor; ignored by execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: Some(id.into()),
            node_type: Some(node_type.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Replace the node's data with the fields of a JSON object
    ///
    /// Non-object values leave the data empty.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    /// Returns the executable view of this node, or `None` if `id` or `type`
    /// is missing or blank
    pub fn validated(&self) -> Option<ValidNode> {
        let id = self.id.as_deref().filter(|id| !id.trim().is_empty())?;
        let node_type = self.node_type.as_deref().filter(|t| !t.trim().is_empty())?;
        Some(ValidNode {
            id: id.to_string(),
            node_type: node_type.to_string(),
            data: self.data.clone(),
        })
    }
}

/// A node that passed the mandatory-field check and may be scheduled
#[derive(Debug, Clone, PartialEq)]
pub struct ValidNode {
    pub id: String,
    /// Raw tag; an unknown tag is only rejected when the node is dispatched
    pub node_type: String,
    pub data: Map<String, Value>,
}

/// The closed set of node types the engine knows how to dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Placeholder for "no trigger configured yet"; a no-op
    Initial,
    /// Run started by hand; checkpoints the incoming context
    ManualTrigger,
    /// Outbound HTTP call
    /// Expected data: { "endpoint": "https://...", "method": "POST", "body": "{...}" }
    HttpRequest,
    /// Webhook node; shares the HTTP request executor
    Webhook,
}

impl NodeType {
    pub const ALL: [NodeType; 4] = [
        NodeType::Initial,
        NodeType::ManualTrigger,
        NodeType::HttpRequest,
        NodeType::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Initial => "INITIAL",
            NodeType::ManualTrigger => "MANUAL_TRIGGER",
            NodeType::HttpRequest => "HTTP_REQUEST",
            NodeType::Webhook => "WEBHOOK",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = EngineError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == tag)
            .ok_or_else(|| EngineError::UnknownNodeType(tag.to_string()))
    }
}

/// Directed edge `source -> target`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_handle: String,
    #[serde(default)]
    pub target_handle: String,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}-{}", source, target),
            source,
            target,
            source_handle: "main".to_string(),
            target_handle: "main".to_string(),
        }
    }
}

/// The external input that starts a run
///
/// `workflowId` and `userId` are optional here so their absence surfaces as a
/// validation error from the engine rather than a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    /// Takes precedence over `data` when both are present
    #[serde(default)]
    pub initial_data: Option<Map<String, Value>>,
    /// Re-use an existing run id so completed steps replay from their checkpoints
    #[serde(default)]
    pub run_id: Option<String>,
}

impl TriggerEvent {
    pub fn new(workflow_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            workflow_id: Some(workflow_id.into()),
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_initial_data(mut self, data: Map<String, Value>) -> Self {
        self.initial_data = Some(data);
        self
    }

    /// Returns `(workflow_id, user_id)`; blank values count as missing
    pub fn validate(&self) -> EngineResult<(&str, &str)> {
        let workflow_id = self
            .workflow_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| EngineError::InvalidTrigger("workflowId is required".to_string()))?;
        let user_id = self
            .user_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| EngineError::InvalidTrigger("userId is required".to_string()))?;
        Ok((workflow_id, user_id))
    }

    /// Seed for the run's execution context
    pub fn seed_context(&self) -> ExecutionContext {
        self.initial_data
            .as_ref()
            .or(self.data.as_ref())
            .cloned()
            .map(ExecutionContext::from_map)
            .unwrap_or_default()
    }
}

/// The accumulator threaded through every node of a run
///
/// Each executor returns the context it wants the next node to see. Outputs
/// are merged as a shallow union where later keys win.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext(Map<String, Value>);

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Shallow union; keys from `output` overwrite existing ones
    pub fn merge(&mut self, output: Map<String, Value>) {
        self.0.extend(output);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Terminal value of a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub workflow_id: String,
    pub run_id: String,
    pub result: ExecutionContext,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_without_id_or_type_is_not_executable() {
        let raw: Vec<Node> = serde_json::from_value(json!([
            { "type": "MANUAL_TRIGGER", "data": {} },
            { "id": "n2", "data": {} },
            { "id": "  ", "type": "INITIAL" },
            { "id": "n4", "type": "HTTP_REQUEST", "position": { "x": 10.0, "y": 20.0 } }
        ]))
        .unwrap();

        let valid: Vec<ValidNode> = raw.iter().filter_map(Node::validated).collect();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].id, "n4");
        assert_eq!(valid[0].node_type, "HTTP_REQUEST");
    }

    #[test]
    fn node_type_tags_round_trip_through_from_str() {
        for node_type in NodeType::ALL {
            assert_eq!(node_type.as_str().parse::<NodeType>().unwrap(), node_type);
        }
        assert!(matches!(
            "SLACK".parse::<NodeType>(),
            Err(EngineError::UnknownNodeType(tag)) if tag == "SLACK"
        ));
    }

    #[test]
    fn initial_data_takes_precedence_over_data() {
        let event: TriggerEvent = serde_json::from_value(json!({
            "workflowId": "wf-1",
            "userId": "user-1",
            "data": { "from": "data" },
            "initialData": { "from": "initialData" }
        }))
        .unwrap();

        assert_eq!(event.seed_context().get("from"), Some(&json!("initialData")));
    }

    #[test]
    fn data_seeds_context_when_initial_data_absent() {
        let event: TriggerEvent = serde_json::from_value(json!({
            "workflowId": "wf-1",
            "userId": "user-1",
            "data": { "orderId": 42 }
        }))
        .unwrap();

        assert_eq!(event.seed_context().get("orderId"), Some(&json!(42)));
        assert!(TriggerEvent::new("wf-1", "user-1").seed_context().is_empty());
    }

    #[test]
    fn trigger_validation_rejects_missing_or_blank_ids() {
        let missing_workflow = TriggerEvent {
            user_id: Some("user-1".into()),
            ..TriggerEvent::default()
        };
        assert!(matches!(missing_workflow.validate(), Err(EngineError::InvalidTrigger(_))));

        let blank_user = TriggerEvent::new("wf-1", "");
        assert!(matches!(blank_user.validate(), Err(EngineError::InvalidTrigger(_))));

        assert_eq!(TriggerEvent::new("wf-1", "user-1").validate().unwrap(), ("wf-1", "user-1"));
    }

    #[test]
    fn merge_is_shallow_and_later_keys_win() {
        let mut context = ExecutionContext::from_map(
            json!({ "a": 1, "nested": { "x": 1, "y": 2 } }).as_object().cloned().unwrap(),
        );
        context.merge(json!({ "b": 2, "nested": { "x": 9 } }).as_object().cloned().unwrap());

        assert_eq!(context.get("a"), Some(&json!(1)));
        assert_eq!(context.get("b"), Some(&json!(2)));
        assert_eq!(context.get("nested"), Some(&json!({ "x": 9 })));
    }
}
