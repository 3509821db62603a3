//! Weft Core Library
//!
//! This crate provides the core functionality for Weft:
//! - The flow language: tokens, lexer, parser, syntax tree and printer
//! - Payload schemas and the versioned schema registry
//! - The dataflow contract: messages, ports, nodes and quality of service
//! - Flow compilation and project configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Source    │────▶│   Parser    │────▶│    Flow     │────▶│   Runtime   │
//! │  (.weft)    │     │   (AST)     │     │  Compiler   │     │ Ports/Nodes │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                                                                    │
//!                                                             ┌──────▼──────┐
//!                                                             │  Registry   │
//!                                                             │  (schemas)  │
//!                                                             └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::{Config, Registry};
//!
//! let config = Config::load("./weft.yaml")?;
//! for flow in config.load_flows()? {
//!     println!("Flow: {} ({} nodes)", flow.name, flow.nodes.len());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod config;
pub mod context;
pub mod error;
pub mod flow;
pub mod lexer;
pub mod message;
pub mod node;
pub mod parser;
pub mod port;
pub mod qos;
pub mod registry;
pub mod schema;
pub mod token;
pub mod value;

pub use config::{Config, ProjectConfig, RuntimeConfig};
pub use context::Context;
pub use error::{
    ContextError, Error, FlowError, NodeError, PortError, RegistryError, Result, SchemaError,
};
pub use flow::{FlowDefinition, NodeDefinition};
pub use message::{Message, Payload};
pub use node::{Node, NodeConfig, NodeLifecycle, NodeStatus};
pub use port::{Direction, Port, PortConfig};
pub use qos::{QualityOfService, ResourceState, RetryPolicy};
pub use registry::Registry;
pub use schema::{Schema, SchemaRef};
pub use value::Value;
