//! Node status publication
//!
//! Executors report `loading` before they do work and exactly one of
//! `success` / `error` afterwards. Events go to a channel per executor family,
//! so an observer that only cares about HTTP nodes never sees trigger events.
//! Publishing is fire-and-forget: a failed publish is logged and dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::{HashMap, VecDeque},
    sync::RwLock,
};
use thiserror::Error;
use tokio::sync::broadcast;

/// Lifecycle of a node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Initial,
    Loading,
    Success,
    Error,
}

/// Executor family a status event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusChannel {
    Initial,
    ManualTrigger,
    HttpRequest,
}

impl StatusChannel {
    pub const ALL: [StatusChannel; 3] = [
        StatusChannel::Initial,
        StatusChannel::ManualTrigger,
        StatusChannel::HttpRequest,
    ];

    /// Topic name observers subscribe to
    pub fn topic(&self) -> &'static str {
        match self {
            StatusChannel::Initial => "initial-execution",
            StatusChannel::ManualTrigger => "manual-trigger-execution",
            StatusChannel::HttpRequest => "http-request-execution",
        }
    }
}

/// Message published on a status channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub run_id: String,
    pub node_id: String,
    pub status: NodeStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl StatusEvent {
    pub fn new(run_id: impl Into<String>, node_id: impl Into<String>, status: NodeStatus) -> Self {
        Self {
            run_id: run_id.into(),
            node_id: node_id.into(),
            status,
            timestamp: Utc::now(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("status channel '{topic}' unavailable: {reason}")]
    Unavailable { topic: &'static str, reason: String },
}

/// Sink for node status events
pub trait StatusPublisher: Send + Sync + std::fmt::Debug {
    fn publish(&self, channel: StatusChannel, event: StatusEvent) -> Result<(), PublishError>;
}

/// Publish and swallow any failure; a status outage never fails a run
pub fn publish_status(publisher: &dyn StatusPublisher, channel: StatusChannel, event: StatusEvent) {
    let node_id = event.node_id.clone();
    let status = event.status;
    if let Err(e) = publisher.publish(channel, event) {
        tracing::warn!("⚠️ Dropped '{:?}' status for node '{}': {}", status, node_id, e);
    }
}

/// In-process status hub: one broadcast channel per executor family
///
/// Also remembers the latest status of every node for the most recent runs so
/// observers that poll instead of subscribing can catch up.
#[derive(Debug)]
pub struct ChannelStatusPublisher {
    senders: HashMap<StatusChannel, broadcast::Sender<StatusEvent>>,
    latest: RwLock<LatestStatuses>,
}

#[derive(Debug)]
struct LatestStatuses {
    runs: HashMap<String, HashMap<String, StatusEvent>>,
    /// Run ids in first-seen order, for eviction
    order: VecDeque<String>,
    retained_runs: usize,
}

impl ChannelStatusPublisher {
    /// `capacity` bounds each channel's backlog; lagging subscribers skip
    /// ahead. `retained_runs` bounds how many runs stay pollable.
    pub fn new(capacity: usize, retained_runs: usize) -> Self {
        let senders = StatusChannel::ALL
            .into_iter()
            .map(|channel| (channel, broadcast::channel(capacity.max(1)).0))
            .collect();

        Self {
            senders,
            latest: RwLock::new(LatestStatuses {
                runs: HashMap::new(),
                order: VecDeque::new(),
                retained_runs: retained_runs.max(1),
            }),
        }
    }

    pub fn subscribe(&self, channel: StatusChannel) -> broadcast::Receiver<StatusEvent> {
        self.senders[&channel].subscribe()
    }

    /// Latest event per node for a run, ordered by node id
    pub fn run_status(&self, run_id: &str) -> Vec<StatusEvent> {
        let latest = match self.latest.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut events: Vec<StatusEvent> = latest
            .runs
            .get(run_id)
            .map(|nodes| nodes.values().cloned().collect())
            .unwrap_or_default();
        events.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        events
    }
}

impl Default for ChannelStatusPublisher {
    fn default() -> Self {
        Self::new(256, 1024)
    }
}

impl StatusPublisher for ChannelStatusPublisher {
    fn publish(&self, channel: StatusChannel, event: StatusEvent) -> Result<(), PublishError> {
        {
            let mut latest = self.latest.write().map_err(|e| PublishError::Unavailable {
                topic: channel.topic(),
                reason: e.to_string(),
            })?;

            if !latest.runs.contains_key(&event.run_id) {
                latest.order.push_back(event.run_id.clone());
                while latest.order.len() > latest.retained_runs {
                    if let Some(evicted) = latest.order.pop_front() {
                        latest.runs.remove(&evicted);
                    }
                }
            }
            latest
                .runs
                .entry(event.run_id.clone())
                .or_default()
                .insert(event.node_id.clone(), event.clone());
        }

        tracing::debug!(
            "📣 [{}] node '{}' → {:?}",
            channel.topic(),
            event.node_id,
            event.status
        );

        // No subscribers is not a failure; nobody is watching this family.
        let _ = self.senders[&channel].send(event);
        Ok(())
    }
}
