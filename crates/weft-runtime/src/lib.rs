//! Weft Runtime
//!
//! This crate provides the reference runtime for Weft flows.
//! It implements the dataflow contract from `weft-core` in memory.
//!
//! # Features
//!
//! - Bounded channel ports with quality of service and backpressure
//! - Processor nodes with lifecycle, metrics, logs and trace spans
//! - Delivery with exponential backoff
//! - Flow execution with one worker task per node
//!
//! # Usage
//!
//! ```rust,ignore
//! use weft_runtime::FlowRuntime;
//!
//! let runtime = FlowRuntime::new(flow, registry, &config.project.runtime).await?;
//! runtime.start().await?;
//! runtime.inject(&ctx, "ingest", Message::new(42)).await?;
//! runtime.drain().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod node;
pub mod port;
pub mod processor;
pub mod retry;

pub use engine::{FlowRuntime, PortSettings};
pub use error::{Error, Result};
pub use node::ProcessorNode;
pub use port::ChannelPort;
pub use processor::{Processor, processor_for};
pub use retry::RetryExecutor;
