//! Flow definitions compiled from the syntax tree
//!
//! A flow is a named graph of nodes. Each `node` block names its processor
//! with `type` (or `nodeType`) and its neighbours with `from` and `to`. Edges
//! declared from either end are merged, so `to: b` on `a` and `from: a` on `b`
//! describe the same edge.
//!
//! ```text
//! flow "orders" {
//!   config { buffer_size: 16, qos: "at-least-once" }
//!   node "ingest" { type: passthrough, to: check }
//!   node "check"  { type: validate, schema: "object" }
//! }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::ast::{BlockStatement, Expression, NodeStatement, Program, Statement};
use crate::error::{Error, FlowError, Result};
use crate::node::NodeConfig;
use crate::parser;
use crate::qos::QualityOfService;
use crate::value::Value;

/// Processor kind used when a node names none
pub const DEFAULT_NODE_KIND: &str = "passthrough";

/// Flow settings with a meaning to the runtime
pub mod settings {
    /// Port buffer capacity
    pub const BUFFER_SIZE: &str = "buffer_size";
    /// Delivery guarantee
    pub const QOS: &str = "qos";
    /// Delivery attempts per message
    pub const RETRIES: &str = "retries";
}

/// Directed edge between two nodes of a flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    /// Upstream node
    pub from: String,
    /// Downstream node
    pub to: String,
}

/// A node of a compiled flow
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDefinition {
    /// Node name
    pub name: String,
    /// Processor kind
    pub kind: String,
    /// Node-level assignments other than wiring
    pub settings: BTreeMap<String, Value>,
    /// Assignments from the node's `config` block
    pub config: BTreeMap<String, Value>,
    /// Nodes feeding this one
    pub upstream: Vec<String>,
    /// Nodes fed by this one
    pub downstream: Vec<String>,
}

impl NodeDefinition {
    /// Runtime configuration for this node: `config` block entries, then
    /// node-level settings on top. Ports are left for the runtime to add.
    pub fn node_config(&self, flow_id: &str) -> NodeConfig {
        let mut config = NodeConfig::new(&self.name, &self.kind).with_flow(flow_id);
        config.settings = self.config.clone();
        config.settings.extend(self.settings.clone());
        config
    }
}

/// A compiled flow
#[derive(Debug, Clone, PartialEq)]
pub struct FlowDefinition {
    /// Flow name
    pub name: String,
    /// Flow settings, program-wide defaults included
    pub settings: BTreeMap<String, Value>,
    /// Nodes in source order
    pub nodes: Vec<NodeDefinition>,
    /// Edges, sorted and deduplicated
    pub edges: Vec<Edge>,
    order: Vec<String>,
}

impl FlowDefinition {
    /// Node by name
    pub fn node(&self, name: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Nodes with no upstream, in source order
    pub fn entry_nodes(&self) -> Vec<&NodeDefinition> {
        self.nodes.iter().filter(|n| n.upstream.is_empty()).collect()
    }

    /// Nodes with no downstream, in source order
    pub fn sink_nodes(&self) -> Vec<&NodeDefinition> {
        self.nodes.iter().filter(|n| n.downstream.is_empty()).collect()
    }

    /// Node names with every node after all of its upstream nodes
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    /// Flow setting by name
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// `buffer_size` setting
    pub fn buffer_size(&self) -> Option<usize> {
        self.positive_setting(settings::BUFFER_SIZE)
            .ok()
            .flatten()
            .and_then(|n| usize::try_from(n).ok())
    }

    /// `retries` setting
    pub fn retries(&self) -> Option<u32> {
        self.positive_setting(settings::RETRIES)
            .ok()
            .flatten()
            .and_then(|n| u32::try_from(n).ok())
    }

    /// `qos` setting
    pub fn qos(&self) -> Option<QualityOfService> {
        self.settings
            .get(settings::QOS)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    fn positive_setting(&self, key: &str) -> std::result::Result<Option<u64>, FlowError> {
        let invalid = |message: &str| FlowError::InvalidSetting {
            flow: self.name.clone(),
            setting: key.to_string(),
            message: message.to_string(),
        };
        match self.settings.get(key) {
            None => Ok(None),
            Some(Value::Int(n)) if *n > 0 => Ok(Some(n.unsigned_abs())),
            Some(Value::UInt(n)) if *n > 0 => Ok(Some(*n)),
            Some(Value::Int(_) | Value::UInt(_)) => Err(invalid("must be at least 1")),
            Some(_) => Err(invalid("must be a whole number")),
        }
    }

    fn check_settings(&self) -> std::result::Result<(), FlowError> {
        self.positive_setting(settings::BUFFER_SIZE)?;
        self.positive_setting(settings::RETRIES)?;
        if let Some(value) = self.settings.get(settings::QOS) {
            let parsed = value
                .as_str()
                .ok_or_else(|| "must be a name".to_string())
                .and_then(|s| s.parse::<QualityOfService>().map(|_| ()));
            if let Err(message) = parsed {
                return Err(FlowError::InvalidSetting {
                    flow: self.name.clone(),
                    setting: settings::QOS.to_string(),
                    message,
                });
            }
        }
        Ok(())
    }
}

/// Value of a literal expression. Whole numbers become integers.
pub fn expression_value(expression: &Expression) -> Value {
    match expression {
        Expression::String(s) => Value::String(s.value.clone()),
        Expression::Identifier(i) => Value::String(i.value.clone()),
        Expression::Number(n) => {
            let v = n.value;
            if v.fract() == 0.0 && v.abs() < 9.0e15 {
                Value::Int(v as i64)
            } else {
                Value::Float(v)
            }
        }
    }
}

/// Parse and compile a source text.
///
/// Syntax errors are reported together as [`Error::Syntax`].
pub fn compile_source(source_name: &str, source: &str) -> Result<Vec<FlowDefinition>> {
    let (program, errors) = parser::parse(source);
    if !errors.is_empty() {
        return Err(Error::Syntax {
            source_name: source_name.to_string(),
            errors,
        });
    }
    Ok(compile(&program)?)
}

/// Turn a program into flow definitions
pub fn compile(program: &Program) -> std::result::Result<Vec<FlowDefinition>, FlowError> {
    let mut defaults = BTreeMap::new();
    for statement in &program.statements {
        match statement {
            Statement::Config(config) => collect_settings(&config.body, &mut defaults)?,
            Statement::Flow(_) => {}
            Statement::Node(node) => {
                return Err(misplaced(
                    statement,
                    format!("node \"{}\" is outside any flow", node.name.value),
                ));
            }
            Statement::Assignment(assignment) => {
                return Err(misplaced(
                    statement,
                    format!("setting '{}' is outside any flow", assignment.name.value),
                ));
            }
        }
    }

    let mut seen = HashSet::new();
    let mut flows = Vec::new();
    for flow in program.flows() {
        let name = flow.name.value.clone();
        if !seen.insert(name.clone()) {
            return Err(FlowError::DuplicateFlow { flow: name });
        }

        let mut settings = defaults.clone();
        let mut nodes: Vec<NodeDefinition> = Vec::new();
        for statement in &flow.body.statements {
            match statement {
                Statement::Config(config) => collect_settings(&config.body, &mut settings)?,
                Statement::Assignment(a) => {
                    settings.insert(a.name.value.clone(), expression_value(&a.value));
                }
                Statement::Node(node) => {
                    if nodes.iter().any(|n| n.name == node.name.value) {
                        return Err(FlowError::DuplicateNode {
                            flow: name,
                            node: node.name.value.clone(),
                        });
                    }
                    nodes.push(compile_node(node)?);
                }
                Statement::Flow(inner) => {
                    return Err(misplaced(
                        statement,
                        format!("flow \"{}\" is nested inside flow \"{name}\"", inner.name.value),
                    ));
                }
            }
        }

        let edges = collect_edges(&name, &nodes)?;
        link(&mut nodes, &edges);
        let order = topological_order(&name, &nodes, &edges)?;
        let definition = FlowDefinition {
            name,
            settings,
            nodes,
            edges,
            order,
        };
        definition.check_settings()?;
        tracing::debug!(
            flow = %definition.name,
            nodes = definition.nodes.len(),
            edges = definition.edges.len(),
            "Compiled flow"
        );
        flows.push(definition);
    }
    Ok(flows)
}

fn misplaced(statement: &Statement, message: String) -> FlowError {
    FlowError::Misplaced {
        message,
        position: statement.token().position,
    }
}

fn collect_settings(
    block: &BlockStatement,
    into: &mut BTreeMap<String, Value>,
) -> std::result::Result<(), FlowError> {
    for statement in &block.statements {
        match statement {
            Statement::Assignment(a) => {
                into.insert(a.name.value.clone(), expression_value(&a.value));
            }
            other => {
                return Err(misplaced(
                    other,
                    format!("config blocks hold settings only, found {}", other.token().kind),
                ));
            }
        }
    }
    Ok(())
}

/// Text of a literal as written, without quotes
fn expression_text(expression: &Expression) -> String {
    match expression {
        Expression::String(s) => s.value.clone(),
        Expression::Identifier(i) => i.value.clone(),
        Expression::Number(n) => n.token.literal.clone(),
    }
}

/// Neighbour names from a `from`/`to` value; strings may list several
fn node_names(value: &Expression) -> Vec<String> {
    expression_text(value)
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

fn compile_node(node: &NodeStatement) -> std::result::Result<NodeDefinition, FlowError> {
    let mut definition = NodeDefinition {
        name: node.name.value.clone(),
        kind: DEFAULT_NODE_KIND.to_string(),
        settings: BTreeMap::new(),
        config: BTreeMap::new(),
        upstream: Vec::new(),
        downstream: Vec::new(),
    };

    for statement in &node.body.statements {
        match statement {
            Statement::Assignment(a) => match a.name.value.as_str() {
                "type" | "nodeType" => definition.kind = expression_text(&a.value),
                "from" => definition.upstream.extend(node_names(&a.value)),
                "to" => definition.downstream.extend(node_names(&a.value)),
                key => {
                    definition.settings.insert(key.to_string(), expression_value(&a.value));
                }
            },
            Statement::Config(config) => collect_settings(&config.body, &mut definition.config)?,
            other => {
                return Err(misplaced(
                    other,
                    format!(
                        "node \"{}\" may only hold settings and config blocks, found {}",
                        definition.name,
                        other.token().kind
                    ),
                ));
            }
        }
    }
    Ok(definition)
}

fn collect_edges(flow: &str, nodes: &[NodeDefinition]) -> std::result::Result<Vec<Edge>, FlowError> {
    let known: HashSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
    let unknown = |node: &str, target: &str| FlowError::UnknownNode {
        flow: flow.to_string(),
        node: node.to_string(),
        target: target.to_string(),
    };

    let mut edges = Vec::new();
    for node in nodes {
        for up in &node.upstream {
            if !known.contains(up.as_str()) {
                return Err(unknown(&node.name, up));
            }
            edges.push(Edge {
                from: up.clone(),
                to: node.name.clone(),
            });
        }
        for down in &node.downstream {
            if !known.contains(down.as_str()) {
                return Err(unknown(&node.name, down));
            }
            edges.push(Edge {
                from: node.name.clone(),
                to: down.clone(),
            });
        }
    }
    edges.sort();
    edges.dedup();
    Ok(edges)
}

/// Rewrite each node's neighbour lists from the merged edge set
fn link(nodes: &mut [NodeDefinition], edges: &[Edge]) {
    for node in nodes.iter_mut() {
        node.upstream = edges
            .iter()
            .filter(|e| e.to == node.name)
            .map(|e| e.from.clone())
            .collect();
        node.downstream = edges
            .iter()
            .filter(|e| e.from == node.name)
            .map(|e| e.to.clone())
            .collect();
    }
}

fn topological_order(
    flow: &str,
    nodes: &[NodeDefinition],
    edges: &[Edge],
) -> std::result::Result<Vec<String>, FlowError> {
    let mut indegree: HashMap<&str, usize> = nodes.iter().map(|n| (n.name.as_str(), 0)).collect();
    for edge in edges {
        if let Some(count) = indegree.get_mut(edge.to.as_str()) {
            *count += 1;
        }
    }

    let mut ready: VecDeque<&str> = nodes
        .iter()
        .map(|n| n.name.as_str())
        .filter(|name| indegree.get(name) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(name) = ready.pop_front() {
        order.push(name.to_string());
        for edge in edges.iter().filter(|e| e.from == name) {
            if let Some(count) = indegree.get_mut(edge.to.as_str()) {
                *count -= 1;
                if *count == 0 {
                    ready.push_back(edge.to.as_str());
                }
            }
        }
    }

    if order.len() < nodes.len() {
        let stuck = nodes
            .iter()
            .find(|n| !order.contains(&n.name))
            .map(|n| n.name.clone())
            .unwrap_or_default();
        return Err(FlowError::Cycle {
            flow: flow.to_string(),
            node: stuck,
        });
    }
    Ok(order)
}
