//! Processor-backed node

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use weft_core::node::{
    Health, LogEntry, LogLevel, NodeMetadata, NodeMetrics, SpanStatus, TraceSpan,
};
use weft_core::{
    Context, Message, Node, NodeConfig, NodeError, NodeLifecycle, NodeStatus, PortError,
    Registry, ResourceState,
};

use crate::processor::{Processor, processor_for};

/// Entries kept in each of the log and trace rings
pub const RING_CAPACITY: usize = 256;

struct State {
    config: NodeConfig,
    processor: Option<Arc<dyn Processor>>,
    status: NodeStatus,
}

/// [`Node`] that hands each message to a [`Processor`] picked by its kind.
///
/// Lifecycle calls are idempotent from a matching state: `start` on a running
/// node and `stop` on a stopped (or never started) node succeed without
/// changing anything. `reset` returns a stopped node to `initialized` and
/// clears its counters, logs and traces.
pub struct ProcessorNode {
    registry: Arc<Registry>,
    created_at: chrono::DateTime<Utc>,
    state: RwLock<State>,
    metrics: Mutex<NodeMetrics>,
    logs: Mutex<VecDeque<LogEntry>>,
    traces: Mutex<VecDeque<TraceSpan>>,
}

impl ProcessorNode {
    /// New node in the `created` state
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            created_at: Utc::now(),
            state: RwLock::new(State {
                config: NodeConfig::default(),
                processor: None,
                status: NodeStatus::created(),
            }),
            metrics: Mutex::new(NodeMetrics::default()),
            logs: Mutex::new(VecDeque::new()),
            traces: Mutex::new(VecDeque::new()),
        }
    }

    /// Move a started node between resource states, e.g. to `throttled`
    pub fn set_state(&self, next: ResourceState) -> Result<(), NodeError> {
        let mut state = self.state.write();
        let target = NodeLifecycle::from(next);
        if state.status.state == target {
            return Ok(());
        }
        if !state.status.state.can_transition_to(target) {
            return Err(invalid_transition(&state, next.as_str()));
        }
        Self::enter(&mut state, target);
        drop(state);
        self.log(LogLevel::Info, format!("state changed to {target}"));
        Ok(())
    }

    fn enter(state: &mut State, next: NodeLifecycle) {
        tracing::debug!(node = %state.config.name, from = %state.status.state, to = %next, "Node state change");
        state.status.state = next;
        state.status.since = Utc::now();
    }

    fn build(&self, config: &NodeConfig) -> Result<Arc<dyn Processor>, NodeError> {
        for port in config.inputs.iter().chain(&config.outputs) {
            port.validate().map_err(|err| NodeError::InvalidConfig {
                node: config.name.clone(),
                message: err.to_string(),
            })?;
        }
        if config.resources.concurrency == 0 {
            return Err(NodeError::InvalidConfig {
                node: config.name.clone(),
                message: "concurrency must be at least 1".to_string(),
            });
        }
        processor_for(config, &self.registry)
    }

    /// Count a processed message that could not be handed downstream
    pub fn record_delivery_failure(&self, message_id: &str, err: &PortError) {
        let message = format!("delivery failed: {err}");
        self.metrics.lock().failed += 1;
        {
            let mut state = self.state.write();
            state.status.health = Health::Degraded;
            state.status.last_error = Some(message.clone());
        }
        push_bounded(
            &mut self.logs.lock(),
            LogEntry::new(LogLevel::Error, message).for_message(message_id),
        );
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        push_bounded(&mut self.logs.lock(), LogEntry::new(level, message));
    }

    fn record(&self, started: Instant, result: &Result<Message, NodeError>, span: TraceSpan) {
        let elapsed = started.elapsed().as_micros() as u64;
        {
            let mut metrics = self.metrics.lock();
            match result {
                Ok(_) => metrics.processed += 1,
                Err(_) => metrics.failed += 1,
            }
            metrics.total_latency_us += elapsed;
            metrics.last_processed_at = Some(Utc::now());
        }

        let status = match result {
            Ok(_) => SpanStatus::Ok,
            Err(err) => SpanStatus::Error(err.to_string()),
        };
        {
            let mut state = self.state.write();
            match &status {
                SpanStatus::Ok => state.status.health = Health::Healthy,
                SpanStatus::Error(message) => {
                    state.status.health = Health::Degraded;
                    state.status.last_error = Some(message.clone());
                }
            }
        }

        if let SpanStatus::Error(message) = &status {
            push_bounded(
                &mut self.logs.lock(),
                LogEntry::new(LogLevel::Error, message.clone()).for_message(&span.message_id),
            );
        }
        push_bounded(
            &mut self.traces.lock(),
            TraceSpan {
                duration_us: elapsed,
                status,
                ..span
            },
        );
    }
}

fn invalid_transition(state: &State, operation: &str) -> NodeError {
    NodeError::InvalidTransition {
        node: state.config.name.clone(),
        operation: operation.to_string(),
        state: state.status.state.to_string(),
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, item: T) {
    if ring.len() == RING_CAPACITY {
        ring.pop_front();
    }
    ring.push_back(item);
}

#[async_trait]
impl Node for ProcessorNode {
    async fn process(&self, ctx: &Context, mut message: Message) -> Result<Message, NodeError> {
        let (name, processor, timeout) = {
            let state = self.state.read();
            let processor = match &state.processor {
                Some(processor) if state.status.state.is_processing() => Arc::clone(processor),
                _ => {
                    return Err(NodeError::NotRunning {
                        node: state.config.name.clone(),
                        state: state.status.state.to_string(),
                    });
                }
            };
            (
                state.config.name.clone(),
                processor,
                state.config.resources.timeouts.process,
            )
        };

        let parent_span_id = message.enter_span();
        let span = TraceSpan {
            trace_id: message.trace_id.clone(),
            span_id: message.span_id.clone(),
            parent_span_id: Some(parent_span_id),
            node: name.clone(),
            operation: processor.kind().to_string(),
            message_id: message.id.clone(),
            started_at: Utc::now(),
            duration_us: 0,
            status: SpanStatus::Ok,
        };
        let message_id = message.id.clone();
        let started = Instant::now();

        let ctx = ctx.with_timeout(timeout);
        let result = match ctx.run(processor.process(&ctx, message)).await {
            Ok(Ok(mut out)) => {
                out.source = name.clone();
                Ok(out)
            }
            Ok(Err(err)) => Err(NodeError::Processing {
                node: name.clone(),
                message_id,
                message: format!("{err:#}"),
            }),
            Err(reason) => Err(NodeError::Cancelled {
                node: name.clone(),
                reason,
            }),
        };

        self.record(started, &result, span);
        result
    }

    async fn init(&self, config: NodeConfig) -> Result<(), NodeError> {
        let processor = self.build(&config)?;
        let mut state = self.state.write();
        if !state.status.state.can_transition_to(NodeLifecycle::Initialized) {
            return Err(NodeError::InvalidTransition {
                node: config.name,
                operation: "init".to_string(),
                state: state.status.state.to_string(),
            });
        }
        tracing::debug!(node = %config.name, kind = %config.kind, "Node initialized");
        state.config = config;
        state.processor = Some(processor);
        Self::enter(&mut state, NodeLifecycle::Initialized);
        drop(state);
        self.log(LogLevel::Info, "initialized");
        Ok(())
    }

    async fn start(&self) -> Result<(), NodeError> {
        let mut state = self.state.write();
        if state.status.state.is_processing() {
            return Ok(());
        }
        if !state.status.state.can_transition_to(NodeLifecycle::Starting) {
            return Err(invalid_transition(&state, "start"));
        }
        Self::enter(&mut state, NodeLifecycle::Starting);
        Self::enter(&mut state, NodeLifecycle::Running);
        state.status.health = Health::Healthy;
        drop(state);
        self.log(LogLevel::Info, "started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), NodeError> {
        let mut state = self.state.write();
        match state.status.state {
            NodeLifecycle::Created | NodeLifecycle::Initialized | NodeLifecycle::Stopped => {
                return Ok(());
            }
            NodeLifecycle::Stopping => {}
            _ => Self::enter(&mut state, NodeLifecycle::Stopping),
        }
        Self::enter(&mut state, NodeLifecycle::Stopped);
        drop(state);
        self.log(LogLevel::Info, "stopped");
        Ok(())
    }

    async fn reset(&self) -> Result<(), NodeError> {
        {
            let mut state = self.state.write();
            match state.status.state {
                NodeLifecycle::Created => return Ok(()),
                NodeLifecycle::Initialized | NodeLifecycle::Stopped => {}
                _ => return Err(invalid_transition(&state, "reset")),
            }
            Self::enter(&mut state, NodeLifecycle::Initialized);
            state.status.health = Health::Unknown;
            state.status.last_error = None;
        }
        *self.metrics.lock() = NodeMetrics::default();
        self.logs.lock().clear();
        self.traces.lock().clear();
        self.log(LogLevel::Info, "reset");
        Ok(())
    }

    fn config(&self) -> NodeConfig {
        self.state.read().config.clone()
    }

    fn set_config(&self, config: NodeConfig) -> Result<(), NodeError> {
        let processor = self.build(&config)?;
        let mut state = self.state.write();
        if state.status.state == NodeLifecycle::Created {
            return Err(NodeError::InvalidTransition {
                node: config.name,
                operation: "set_config".to_string(),
                state: state.status.state.to_string(),
            });
        }
        state.config = config;
        state.processor = Some(processor);
        drop(state);
        self.log(LogLevel::Info, "configuration updated");
        Ok(())
    }

    fn metadata(&self) -> NodeMetadata {
        let state = self.state.read();
        let kind = state
            .processor
            .as_ref()
            .map_or(state.config.kind.as_str(), |p| p.kind());
        NodeMetadata {
            name: state.config.name.clone(),
            kind: kind.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: format!("{kind} processor"),
            flow_id: state.config.flow_id.clone(),
            created_at: self.created_at,
        }
    }

    fn metrics(&self) -> NodeMetrics {
        self.metrics.lock().clone()
    }

    fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().iter().cloned().collect()
    }

    fn traces(&self) -> Vec<TraceSpan> {
        self.traces.lock().iter().cloned().collect()
    }

    fn status(&self) -> NodeStatus {
        self.state.read().status.clone()
    }
}
