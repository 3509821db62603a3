//! Built-in message processors
//!
//! A [`ProcessorNode`](crate::node::ProcessorNode) delegates the work of
//! `process` to a [`Processor`] chosen by the node's kind:
//!
//! | kind          | settings                    | effect                          |
//! |---------------|-----------------------------|---------------------------------|
//! | `passthrough` |                             | forwards the message unchanged  |
//! | `validate`    | `schema`, optional `version`| fails messages the schema rejects |
//! | `tag`         | `key`, `value`              | sets header `key` to `value`    |

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use weft_core::{Context, Message, NodeConfig, NodeError, Registry, SchemaRef};

use crate::error::Result;

/// The work done by a node for one message
#[async_trait]
pub trait Processor: Send + Sync {
    /// Kind this processor is registered under
    fn kind(&self) -> &'static str;

    /// Transform one message
    async fn process(&self, ctx: &Context, message: Message) -> Result<Message>;
}

/// Forwards messages unchanged
#[derive(Debug, Default)]
pub struct Passthrough;

#[async_trait]
impl Processor for Passthrough {
    fn kind(&self) -> &'static str {
        "passthrough"
    }

    async fn process(&self, _ctx: &Context, message: Message) -> Result<Message> {
        Ok(message)
    }
}

/// Rejects messages whose payload does not match a schema
pub struct Validate {
    schema: SchemaRef,
}

impl Validate {
    /// Validate against the given schema
    pub fn new(schema: SchemaRef) -> Self {
        Self { schema }
    }
}

#[async_trait]
impl Processor for Validate {
    fn kind(&self) -> &'static str {
        "validate"
    }

    async fn process(&self, _ctx: &Context, message: Message) -> Result<Message> {
        let value = message.payload.to_value()?;
        self.schema.validate(&value).with_context(|| {
            format!(
                "payload does not match {}@{}",
                self.schema.type_name(),
                self.schema.version()
            )
        })?;
        Ok(message.with_schema(self.schema.type_name()))
    }
}

/// Sets a fixed header on every message
#[derive(Debug)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Set header `key` to `value`
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Processor for Tag {
    fn kind(&self) -> &'static str {
        "tag"
    }

    async fn process(&self, _ctx: &Context, message: Message) -> Result<Message> {
        Ok(message.with_header(&self.key, &self.value))
    }
}

/// Build the processor for a node's kind and settings
pub fn processor_for(
    config: &NodeConfig,
    registry: &Registry,
) -> std::result::Result<Arc<dyn Processor>, NodeError> {
    let invalid = |message: String| NodeError::InvalidConfig {
        node: config.name.clone(),
        message,
    };
    let required = |key: &str| {
        config
            .setting_str(key)
            .ok_or_else(|| invalid(format!("{} node requires a '{key}' setting", config.kind)))
    };

    match config.kind.as_str() {
        "passthrough" => Ok(Arc::new(Passthrough)),
        "validate" => {
            let type_name = required("schema")?;
            let schema = match config.setting_str("version") {
                Some(version) => registry.get(&type_name, &version),
                None => registry.resolve(&type_name),
            }
            .map_err(|err| invalid(err.to_string()))?;
            Ok(Arc::new(Validate::new(schema)))
        }
        "tag" => Ok(Arc::new(Tag::new(required("key")?, required("value")?))),
        other => Err(invalid(format!("unknown node type '{other}'"))),
    }
}
