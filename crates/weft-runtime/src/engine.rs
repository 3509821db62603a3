//! Flow execution engine
//!
//! A [`FlowRuntime`] turns a compiled [`FlowDefinition`] into running tasks:
//!
//! ```text
//!  inject ──▶ [a.in] ──▶ worker(a) ──▶ [b.in] ──▶ worker(b) ──▶ [flow.out] ──▶ output()
//!                               └───▶ [c.in] ──▶ worker(c) ──────┘
//! ```
//!
//! Every node gets a [`ProcessorNode`] and a bounded input [`ChannelPort`].
//! One worker task per node receives from the input port, processes the
//! message and delivers the result to each downstream input port, or to the
//! shared output port for sink nodes.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context as _, anyhow, bail};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use weft_core::{
    Context, Direction, FlowDefinition, Message, Node, NodeError, Port, PortConfig,
    PortError, QualityOfService, Registry, RetryPolicy, RuntimeConfig,
};

use crate::error::Result;
use crate::node::ProcessorNode;
use crate::port::ChannelPort;
use crate::retry::RetryExecutor;

/// Port settings after applying flow overrides to the runtime defaults
#[derive(Debug, Clone, PartialEq)]
pub struct PortSettings {
    /// Buffer capacity of every port
    pub buffer_size: usize,
    /// Delivery guarantee
    pub qos: QualityOfService,
    /// Backoff for full downstream ports
    pub retry: RetryPolicy,
}

impl PortSettings {
    /// Defaults from `runtime`, overridden by the flow's `buffer_size`, `qos`
    /// and `retries` settings
    pub fn resolve(flow: &FlowDefinition, runtime: &RuntimeConfig) -> Self {
        let mut retry = runtime.retry.clone();
        if let Some(attempts) = flow.retries() {
            retry.max_attempts = attempts;
        }
        Self {
            buffer_size: flow.buffer_size().unwrap_or(runtime.buffer_size),
            qos: flow.qos().unwrap_or(runtime.qos),
            retry,
        }
    }

    fn port(&self, name: impl Into<String>, direction: Direction) -> PortConfig {
        PortConfig::new(name, direction)
            .with_buffer_size(self.buffer_size)
            .with_qos(self.qos)
            .with_retry(self.retry.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Stopped,
}

struct NodeHandle {
    node: Arc<ProcessorNode>,
    input: Arc<ChannelPort>,
    downstream: Vec<String>,
}

/// Executes one compiled flow
pub struct FlowRuntime {
    flow: FlowDefinition,
    settings: PortSettings,
    nodes: BTreeMap<String, NodeHandle>,
    output: Arc<ChannelPort>,
    token: CancellationToken,
    state: Mutex<RunState>,
    workers: Mutex<BTreeMap<String, JoinHandle<()>>>,
}

impl FlowRuntime {
    /// Build ports and initialize a node for every node of `flow`
    pub async fn new(
        flow: FlowDefinition,
        registry: Arc<Registry>,
        runtime: &RuntimeConfig,
    ) -> Result<Self> {
        let settings = PortSettings::resolve(&flow, runtime);
        let output = Arc::new(ChannelPort::new(
            settings.port(format!("{}.out", flow.name), Direction::Output),
        )?);

        let mut nodes = BTreeMap::new();
        for definition in &flow.nodes {
            let input_config = settings.port(input_port_name(&definition.name), Direction::Input);
            let input = Arc::new(ChannelPort::new(input_config.clone())?);

            let mut config = definition.node_config(&flow.name).with_input(input_config);
            if definition.downstream.is_empty() {
                config = config.with_output(output.config());
            }
            for target in &definition.downstream {
                config = config.with_output(settings.port(input_port_name(target), Direction::Output));
            }

            let node = Arc::new(ProcessorNode::new(Arc::clone(&registry)));
            node.init(config)
                .await
                .with_context(|| format!("failed to initialize node '{}'", definition.name))?;

            nodes.insert(
                definition.name.clone(),
                NodeHandle {
                    node,
                    input,
                    downstream: definition.downstream.clone(),
                },
            );
        }

        tracing::debug!(
            flow = %flow.name,
            nodes = nodes.len(),
            buffer_size = settings.buffer_size,
            qos = %settings.qos,
            "Flow runtime built"
        );

        Ok(Self {
            flow,
            settings,
            nodes,
            output,
            token: CancellationToken::new(),
            state: Mutex::new(RunState::Idle),
            workers: Mutex::new(BTreeMap::new()),
        })
    }

    /// Flow being executed
    pub fn flow(&self) -> &FlowDefinition {
        &self.flow
    }

    /// Effective port settings
    pub fn settings(&self) -> &PortSettings {
        &self.settings
    }

    /// Node by name
    pub fn node(&self, name: &str) -> Option<Arc<ProcessorNode>> {
        self.nodes.get(name).map(|handle| Arc::clone(&handle.node))
    }

    /// Input port of a node
    pub fn input(&self, name: &str) -> Option<Arc<ChannelPort>> {
        self.nodes.get(name).map(|handle| Arc::clone(&handle.input))
    }

    /// Port receiving the results of every sink node
    pub fn output(&self) -> Arc<ChannelPort> {
        Arc::clone(&self.output)
    }

    /// Whether workers are running
    pub fn is_running(&self) -> bool {
        *self.state.lock() == RunState::Running
    }

    /// Start every node and spawn its worker. Starting twice is a no-op;
    /// a stopped runtime cannot be restarted.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                RunState::Running => return Ok(()),
                RunState::Stopped => bail!("flow '{}' has been stopped", self.flow.name),
                RunState::Idle => *state = RunState::Running,
            }
        }

        for (name, handle) in &self.nodes {
            handle.node.start().await?;
            let targets = handle
                .downstream
                .iter()
                .map(|target| {
                    self.nodes
                        .get(target)
                        .map(|h| Arc::clone(&h.input))
                        .ok_or_else(|| anyhow!("node '{name}' feeds unknown node '{target}'"))
                })
                .collect::<Result<Vec<_>>>()?;
            let targets = if targets.is_empty() {
                vec![Arc::clone(&self.output)]
            } else {
                targets
            };

            let worker = Worker {
                flow: self.flow.name.clone(),
                ctx: Context::from_token(self.token.child_token()),
                node: Arc::clone(&handle.node),
                name: name.clone(),
                input: Arc::clone(&handle.input),
                targets,
            };
            self.workers
                .lock()
                .insert(name.clone(), tokio::spawn(worker.run()));
        }

        tracing::info!(flow = %self.flow.name, nodes = self.nodes.len(), "Flow started");
        Ok(())
    }

    /// Send a message into a node's input port
    pub async fn inject(&self, ctx: &Context, node: &str, message: Message) -> Result<()> {
        let handle = self
            .nodes
            .get(node)
            .ok_or_else(|| anyhow!("flow '{}' has no node '{node}'", self.flow.name))?;
        let message = message.with_flow(&self.flow.name).with_target(node);
        RetryExecutor::for_port(handle.input.as_ref())
            .deliver_with_qos(ctx, handle.input.as_ref(), message)
            .await
            .with_context(|| format!("failed to inject into node '{node}'"))?;
        Ok(())
    }

    /// Let every buffered message flow through, then stop.
    ///
    /// Input ports are closed in topological order, waiting for each node's
    /// worker to finish before closing the next, so nothing in flight is
    /// lost. The output port is closed last and can still be drained.
    pub async fn drain(&self) -> Result<()> {
        if *self.state.lock() != RunState::Running {
            return self.stop().await;
        }
        for name in self.flow.topological_order() {
            let Some(handle) = self.nodes.get(name) else {
                continue;
            };
            handle.input.close();
            let worker = self.workers.lock().remove(name);
            if let Some(worker) = worker {
                worker
                    .await
                    .with_context(|| format!("worker for node '{name}' failed"))?;
            }
        }
        self.output.close();
        self.stop().await
    }

    /// Cancel every worker, close every port and stop every node.
    /// Stopping twice is a no-op.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state == RunState::Stopped {
                return Ok(());
            }
            *state = RunState::Stopped;
        }

        self.token.cancel();
        for handle in self.nodes.values() {
            handle.input.close();
        }
        self.output.close();

        let workers = std::mem::take(&mut *self.workers.lock());
        let (names, handles): (Vec<_>, Vec<_>) = workers.into_iter().unzip();
        let results = futures::future::join_all(handles).await;
        for (name, result) in names.into_iter().zip(results) {
            if let Err(err) = result {
                tracing::warn!(flow = %self.flow.name, node = %name, "Worker ended abnormally: {err}");
            }
        }
        for handle in self.nodes.values() {
            handle.node.stop().await?;
        }

        tracing::info!(flow = %self.flow.name, "Flow stopped");
        Ok(())
    }
}

fn input_port_name(node: &str) -> String {
    format!("{node}.in")
}

struct Worker {
    flow: String,
    ctx: Context,
    node: Arc<ProcessorNode>,
    name: String,
    input: Arc<ChannelPort>,
    targets: Vec<Arc<ChannelPort>>,
}

impl Worker {
    async fn run(self) {
        tracing::debug!(flow = %self.flow, node = %self.name, "Worker started");
        loop {
            let message = match self.input.receive(&self.ctx).await {
                Ok(message) => message,
                Err(PortError::Closed { .. }) => break,
                Err(err) if err.is_cancellation() => break,
                Err(err) => {
                    tracing::warn!(flow = %self.flow, node = %self.name, "Receive failed: {err}");
                    break;
                }
            };

            let output = match self.node.process(&self.ctx, message).await {
                Ok(output) => output,
                Err(NodeError::Cancelled { .. }) if self.ctx.err().is_some() => break,
                Err(err) => {
                    tracing::warn!(flow = %self.flow, node = %self.name, "{err}");
                    continue;
                }
            };

            if !self.deliver(output).await {
                break;
            }
        }
        tracing::debug!(flow = %self.flow, node = %self.name, "Worker finished");
    }

    /// Returns false once the worker should exit
    async fn deliver(&self, output: Message) -> bool {
        for target in &self.targets {
            let message = output.clone().with_target(target_node(&target.name()));
            let result = RetryExecutor::for_port(target.as_ref())
                .deliver_with_qos(&self.ctx, target.as_ref(), message)
                .await;
            match result {
                Ok(_) => {}
                Err(err) if err.is_cancellation() => return false,
                Err(err) => {
                    tracing::warn!(
                        flow = %self.flow,
                        node = %self.name,
                        message_id = %output.id,
                        "Delivery failed: {err}"
                    );
                    self.node.record_delivery_failure(&output.id, &err);
                }
            }
        }
        true
    }
}

fn target_node(port: &str) -> &str {
    port.strip_suffix(".in").unwrap_or(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::flow::compile_source;

    fn flow(source: &str) -> FlowDefinition {
        compile_source("test.weft", source).unwrap().remove(0)
    }

    #[test]
    fn test_flow_settings_override_defaults() {
        let flow = flow(r#"flow "f" { config { buffer_size: 4, qos: "best-effort", retries: 7 } node "a" {} }"#);
        let settings = PortSettings::resolve(&flow, &RuntimeConfig::default());
        assert_eq!(settings.buffer_size, 4);
        assert_eq!(settings.qos, QualityOfService::BestEffort);
        assert_eq!(settings.retry.max_attempts, 7);
    }

    #[test]
    fn test_runtime_defaults_apply() {
        let flow = flow(r#"flow "f" { node "a" {} }"#);
        let runtime = RuntimeConfig {
            buffer_size: 9,
            ..Default::default()
        };
        let settings = PortSettings::resolve(&flow, &runtime);
        assert_eq!(settings.buffer_size, 9);
        assert_eq!(settings.qos, QualityOfService::AtLeastOnce);
        assert_eq!(settings.retry, RetryPolicy::default());
    }

    #[tokio::test]
    async fn test_new_wires_ports() {
        let flow = flow(r#"flow "f" { node "a" { to: "b" } node "b" {} }"#);
        let runtime = FlowRuntime::new(flow, Arc::new(Registry::new()), &RuntimeConfig::default())
            .await
            .unwrap();
        let a = runtime.node("a").unwrap().config();
        assert_eq!(a.inputs[0].name, "a.in");
        assert_eq!(a.outputs[0].name, "b.in");
        let b = runtime.node("b").unwrap().config();
        assert_eq!(b.outputs[0].name, "f.out");
        assert_eq!(b.flow_id, "f");
    }

    #[tokio::test]
    async fn test_new_rejects_bad_node_config() {
        let flow = flow(r#"flow "f" { node "v" { type: validate } }"#);
        let err = FlowRuntime::new(flow, Arc::new(Registry::new()), &RuntimeConfig::default())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("node 'v'"));
    }

    #[test]
    fn test_target_node() {
        assert_eq!(target_node("b.in"), "b");
        assert_eq!(target_node("f.out"), "f.out");
    }
}
