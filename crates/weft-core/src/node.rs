//! Node contract
//!
//! [`Node::process`] is the only data-plane entry point and is accepted only
//! while the node is running, degraded or throttled. The control-plane calls
//! (`init`, `start`, `stop`, `reset`) succeed without effect when the node is
//! already in the state they lead to, so `stop` on a stopped node is a no-op.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::NodeError;
use crate::message::Message;
use crate::port::PortConfig;
use crate::qos::{ResourceConfig, ResourceState};
use crate::value::Value;

/// Node configuration handed to [`Node::init`]
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Node name, unique within its flow
    pub name: String,
    /// Processor kind, e.g. `passthrough`
    pub kind: String,
    /// Owning flow
    pub flow_id: String,
    /// Free-form settings from the flow definition
    pub settings: BTreeMap<String, Value>,
    /// Resource limits
    pub resources: ResourceConfig,
    /// Input port configurations
    pub inputs: Vec<PortConfig>,
    /// Output port configurations
    pub outputs: Vec<PortConfig>,
}

impl NodeConfig {
    /// Config for a node of the given kind
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Set the owning flow
    pub fn with_flow(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = flow_id.into();
        self
    }

    /// Add a setting
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Add an input port
    pub fn with_input(mut self, port: PortConfig) -> Self {
        self.inputs.push(port);
        self
    }

    /// Add an output port
    pub fn with_output(mut self, port: PortConfig) -> Self {
        self.outputs.push(port);
        self
    }

    /// Setting by key
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Setting rendered as text; strings are returned without quotes
    pub fn setting_str(&self, key: &str) -> Option<String> {
        self.settings.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Descriptive information about a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Node name
    pub name: String,
    /// Processor kind
    pub kind: String,
    /// Implementation version
    pub version: String,
    /// Human readable description
    pub description: String,
    /// Owning flow
    pub flow_id: String,
    /// When the node object was created
    pub created_at: DateTime<Utc>,
}

/// Processing counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Messages processed successfully
    pub processed: u64,
    /// Messages that failed processing
    pub failed: u64,
    /// Cumulative processing time in microseconds
    pub total_latency_us: u64,
    /// Time of the most recent process call
    pub last_processed_at: Option<DateTime<Utc>>,
}

impl NodeMetrics {
    /// Mean processing time in microseconds
    pub fn average_latency_us(&self) -> u64 {
        let total = self.processed + self.failed;
        if total == 0 { 0 } else { self.total_latency_us / total }
    }
}

/// Severity of a node log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Diagnostic detail
    Debug,
    /// Normal operation
    Info,
    /// Something unexpected that did not fail processing
    Warn,
    /// Processing failed
    Error,
}

/// One entry of a node's log ring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was written
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
    /// Text
    pub message: String,
    /// Message being processed, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl LogEntry {
    /// Entry stamped with the current time
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            message_id: None,
        }
    }

    /// Attach the id of the message being processed
    pub fn for_message(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

/// Outcome of a span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "error")]
pub enum SpanStatus {
    /// Completed normally
    Ok,
    /// Failed with the given error
    Error(String),
}

/// One processing step recorded by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSpan {
    /// Trace shared across the flow
    pub trace_id: String,
    /// This span
    pub span_id: String,
    /// Span of the previous step
    pub parent_span_id: Option<String>,
    /// Node that recorded the span
    pub node: String,
    /// Operation name
    pub operation: String,
    /// Message processed
    pub message_id: String,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Duration in microseconds
    pub duration_us: u64,
    /// Outcome
    #[serde(flatten)]
    pub status: SpanStatus,
}

/// Coarse health signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    /// No signal yet
    #[default]
    Unknown,
    /// Working normally
    Healthy,
    /// Working with errors
    Degraded,
    /// Not working
    Unhealthy,
}

/// Full lifecycle of a node: set-up states followed by the resource states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLifecycle {
    /// Constructed, not configured
    #[default]
    Created,
    /// Configured by `init`
    Initialized,
    /// See [`ResourceState::Starting`]
    Starting,
    /// See [`ResourceState::Running`]
    Running,
    /// See [`ResourceState::Degraded`]
    Degraded,
    /// See [`ResourceState::Throttled`]
    Throttled,
    /// See [`ResourceState::Stopping`]
    Stopping,
    /// See [`ResourceState::Stopped`]
    Stopped,
}

impl NodeLifecycle {
    /// Resource state, once the node has been started
    pub fn resource_state(self) -> Option<ResourceState> {
        match self {
            NodeLifecycle::Created | NodeLifecycle::Initialized => None,
            NodeLifecycle::Starting => Some(ResourceState::Starting),
            NodeLifecycle::Running => Some(ResourceState::Running),
            NodeLifecycle::Degraded => Some(ResourceState::Degraded),
            NodeLifecycle::Throttled => Some(ResourceState::Throttled),
            NodeLifecycle::Stopping => Some(ResourceState::Stopping),
            NodeLifecycle::Stopped => Some(ResourceState::Stopped),
        }
    }

    /// Whether `process` is accepted
    pub fn is_processing(self) -> bool {
        self.resource_state().is_some_and(ResourceState::is_processing)
    }

    /// Whether the transition `self -> next` is allowed.
    ///
    /// `created -> initialized -> starting`, `stopped -> initialized` (reset)
    /// and `initialized -> initialized` (re-init) extend the resource table.
    pub fn can_transition_to(self, next: NodeLifecycle) -> bool {
        use NodeLifecycle::*;
        match (self, next) {
            (Created, Initialized) => true,
            (Initialized, Initialized | Starting) => true,
            (Stopped, Initialized) => true,
            _ => match (self.resource_state(), next.resource_state()) {
                (Some(from), Some(to)) => from.can_transition_to(to),
                _ => false,
            },
        }
    }

    /// Name in snake case
    pub fn as_str(self) -> &'static str {
        match self {
            NodeLifecycle::Created => "created",
            NodeLifecycle::Initialized => "initialized",
            NodeLifecycle::Starting => "starting",
            NodeLifecycle::Running => "running",
            NodeLifecycle::Degraded => "degraded",
            NodeLifecycle::Throttled => "throttled",
            NodeLifecycle::Stopping => "stopping",
            NodeLifecycle::Stopped => "stopped",
        }
    }
}

impl From<ResourceState> for NodeLifecycle {
    fn from(state: ResourceState) -> Self {
        match state {
            ResourceState::Starting => NodeLifecycle::Starting,
            ResourceState::Running => NodeLifecycle::Running,
            ResourceState::Degraded => NodeLifecycle::Degraded,
            ResourceState::Throttled => NodeLifecycle::Throttled,
            ResourceState::Stopping => NodeLifecycle::Stopping,
            ResourceState::Stopped => NodeLifecycle::Stopped,
        }
    }
}

impl fmt::Display for NodeLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of a node's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Lifecycle state
    pub state: NodeLifecycle,
    /// Health signal
    pub health: Health,
    /// Most recent failure
    pub last_error: Option<String>,
    /// When `state` was entered
    pub since: DateTime<Utc>,
}

impl NodeStatus {
    /// Status for a freshly constructed node
    pub fn created() -> Self {
        Self {
            state: NodeLifecycle::Created,
            health: Health::Unknown,
            last_error: None,
            since: Utc::now(),
        }
    }
}

/// Runtime processing unit
#[async_trait]
pub trait Node: Send + Sync {
    /// Process one message; fails unless the node is processing
    async fn process(&self, ctx: &Context, message: Message) -> Result<Message, NodeError>;

    /// Apply configuration and move to `initialized`
    async fn init(&self, config: NodeConfig) -> Result<(), NodeError>;

    /// Move to `running`
    async fn start(&self) -> Result<(), NodeError>;

    /// Move to `stopped`
    async fn stop(&self) -> Result<(), NodeError>;

    /// Clear counters, logs and traces and return to `initialized`
    async fn reset(&self) -> Result<(), NodeError>;

    /// Current configuration
    fn config(&self) -> NodeConfig;

    /// Replace the configuration without changing state
    fn set_config(&self, config: NodeConfig) -> Result<(), NodeError>;

    /// Descriptive information
    fn metadata(&self) -> NodeMetadata;

    /// Processing counters
    fn metrics(&self) -> NodeMetrics;

    /// Recent log entries, oldest first
    fn logs(&self) -> Vec<LogEntry>;

    /// Recent trace spans, oldest first
    fn traces(&self) -> Vec<TraceSpan>;

    /// Current status
    fn status(&self) -> NodeStatus;
}

/// Shared handle to a node
pub type NodeRef = Arc<dyn Node>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(NodeLifecycle::Created, NodeLifecycle::Initialized, true)]
    #[case(NodeLifecycle::Created, NodeLifecycle::Starting, false)]
    #[case(NodeLifecycle::Initialized, NodeLifecycle::Starting, true)]
    #[case(NodeLifecycle::Initialized, NodeLifecycle::Running, false)]
    #[case(NodeLifecycle::Starting, NodeLifecycle::Running, true)]
    #[case(NodeLifecycle::Running, NodeLifecycle::Throttled, true)]
    #[case(NodeLifecycle::Running, NodeLifecycle::Initialized, false)]
    #[case(NodeLifecycle::Stopping, NodeLifecycle::Stopped, true)]
    #[case(NodeLifecycle::Stopped, NodeLifecycle::Initialized, true)]
    #[case(NodeLifecycle::Stopped, NodeLifecycle::Starting, true)]
    fn test_lifecycle_transitions(
        #[case] from: NodeLifecycle,
        #[case] to: NodeLifecycle,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_processing_states() {
        assert!(NodeLifecycle::Running.is_processing());
        assert!(NodeLifecycle::Degraded.is_processing());
        assert!(NodeLifecycle::Throttled.is_processing());
        assert!(!NodeLifecycle::Initialized.is_processing());
        assert!(!NodeLifecycle::Stopped.is_processing());
    }

    #[test]
    fn test_config_settings() {
        let config = NodeConfig::new("tagger", "tag")
            .with_flow("orders")
            .with_setting("key", "region")
            .with_setting("retries", 3i64);
        assert_eq!(config.setting_str("key").as_deref(), Some("region"));
        assert_eq!(config.setting_str("retries").as_deref(), Some("3"));
        assert_eq!(config.setting("missing"), None);
    }

    #[test]
    fn test_average_latency() {
        let metrics = NodeMetrics {
            processed: 3,
            failed: 1,
            total_latency_us: 400,
            last_processed_at: None,
        };
        assert_eq!(metrics.average_latency_us(), 100);
        assert_eq!(NodeMetrics::default().average_latency_us(), 0);
    }

    #[test]
    fn test_span_serializes_status() {
        let span = TraceSpan {
            trace_id: "t".to_string(),
            span_id: "s".to_string(),
            parent_span_id: None,
            node: "n".to_string(),
            operation: "process".to_string(),
            message_id: "m".to_string(),
            started_at: Utc::now(),
            duration_us: 5,
            status: SpanStatus::Error("boom".to_string()),
        };
        let json = serde_json::to_value(&span).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");
    }
}
