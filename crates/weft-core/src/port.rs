//! Port contract
//!
//! A port is a typed, directional connection point. Implementations must:
//!
//! - validate every payload against [`PortConfig::data_type`] before accepting
//!   it (see [`PortConfig::check`]),
//! - fail a send with [`PortError::BufferFull`] when the buffer is full, unless
//!   the quality of service is best-effort, in which case the message is
//!   dropped and counted,
//! - block `receive` until a message arrives or the [`Context`] finishes,
//! - report occupancy through [`Port::backpressure`]. The signal is advisory
//!   and never stops a send on its own.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::PortError;
use crate::message::Message;
use crate::qos::{QualityOfService, RetryPolicy};
use crate::schema::SchemaRef;

/// Buffer size used when none is configured
pub const DEFAULT_BUFFER_SIZE: usize = 64;

/// Which way messages move through a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Messages flow into the owning node
    Input,
    /// Messages flow out of the owning node
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Port configuration
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Port name, unique within its node
    pub name: String,
    /// Implementation kind, e.g. `channel`
    pub port_type: String,
    /// Input or output
    pub direction: Direction,
    /// Schema every payload must satisfy; `None` accepts anything
    pub data_type: Option<SchemaRef>,
    /// Buffer capacity in messages
    pub buffer_size: usize,
    /// Delivery guarantee
    pub qos: QualityOfService,
    /// Backoff used by senders when the port reports a full buffer
    pub retry: RetryPolicy,
}

impl PortConfig {
    /// Config with default buffering and delivery
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            port_type: "channel".to_string(),
            direction,
            data_type: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            qos: QualityOfService::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the payload schema
    pub fn with_data_type(mut self, schema: SchemaRef) -> Self {
        self.data_type = Some(schema);
        self
    }

    /// Set the buffer capacity
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the delivery guarantee
    pub fn with_qos(mut self, qos: QualityOfService) -> Self {
        self.qos = qos;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reject configurations no port can honour
    pub fn validate(&self) -> Result<(), PortError> {
        if self.name.is_empty() {
            return Err(PortError::InvalidConfig {
                port: self.name.clone(),
                message: "port name must not be empty".to_string(),
            });
        }
        if self.buffer_size == 0 {
            return Err(PortError::InvalidConfig {
                port: self.name.clone(),
                message: "buffer_size must be at least 1".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(PortError::InvalidConfig {
                port: self.name.clone(),
                message: "retry.max_attempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Check a message against the port's data type.
    ///
    /// A message that declares a schema must name the port's type, and the
    /// payload must validate against it.
    pub fn check(&self, message: &Message) -> Result<(), PortError> {
        let Some(schema) = &self.data_type else {
            return Ok(());
        };

        let expected = schema.type_name();
        if let Some(declared) = &message.schema
            && *declared != expected
        {
            return Err(PortError::SchemaMismatch {
                port: self.name.clone(),
                expected,
                actual: declared.clone(),
            });
        }

        let validation = |source| PortError::Validation {
            port: self.name.clone(),
            message_id: message.id.clone(),
            source,
        };
        let value = message.payload.to_value().map_err(validation)?;
        schema.validate(&value).map_err(validation)
    }
}

/// Counters kept by a port since creation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortMetrics {
    /// Messages accepted by `send`
    pub sent: u64,
    /// Messages handed out by `receive`
    pub received: u64,
    /// Messages dropped under best-effort delivery
    pub dropped: u64,
    /// Sends refused because the buffer was full or the id was a duplicate
    pub rejected: u64,
    /// Sends refused because the payload did not validate
    pub validation_failures: u64,
}

/// Point-in-time view of a port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortStatus {
    /// Port name
    pub name: String,
    /// Input or output
    pub direction: Direction,
    /// Whether the port still accepts sends
    pub open: bool,
    /// Messages waiting in the buffer
    pub buffered: usize,
    /// Buffer capacity
    pub capacity: usize,
    /// `buffered / capacity`
    pub backpressure: f64,
}

/// Occupancy ratio clamped to `[0, 1]`
pub fn backpressure_ratio(buffered: usize, capacity: usize) -> f64 {
    if capacity == 0 {
        return 1.0;
    }
    (buffered as f64 / capacity as f64).clamp(0.0, 1.0)
}

/// Typed, directional connection point for messages
#[async_trait]
pub trait Port: Send + Sync {
    /// Validate and enqueue a message
    async fn send(&self, ctx: &Context, message: Message) -> Result<(), PortError>;

    /// Wait for the next message
    async fn receive(&self, ctx: &Context) -> Result<Message, PortError>;

    /// Current configuration
    fn config(&self) -> PortConfig;

    /// Replace the configuration
    fn set_config(&self, config: PortConfig) -> Result<(), PortError>;

    /// Buffer occupancy in `[0, 1]`
    fn backpressure(&self) -> f64;

    /// Change the buffer capacity; fails for zero or below the buffered count
    fn set_buffer_size(&self, size: usize) -> Result<(), PortError>;

    /// Counters since creation
    fn metrics(&self) -> PortMetrics;

    /// Point-in-time status
    fn status(&self) -> PortStatus;

    /// Port name
    fn name(&self) -> String {
        self.config().name
    }
}

/// Shared handle to a port
pub type PortRef = Arc<dyn Port>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::registry::Registry;
    use crate::value::Value;
    use serde_json::json;

    fn typed(type_expr: &str) -> PortConfig {
        let registry = Registry::new();
        PortConfig::new("in", Direction::Input).with_data_type(registry.resolve(type_expr).unwrap())
    }

    #[test]
    fn test_untyped_port_accepts_anything() {
        let config = PortConfig::new("in", Direction::Input);
        assert!(config.check(&Message::new(Value::Null)).is_ok());
        assert!(config.check(&Message::raw(b"garbage".to_vec())).is_ok());
    }

    #[test]
    fn test_check_validates_payload() {
        let config = typed("array<string>");
        assert!(config.check(&Message::new(vec!["a", "b"])).is_ok());

        let err = config.check(&Message::new(vec![1i32, 2, 3])).unwrap_err();
        match err {
            PortError::Validation { source, .. } => {
                assert!(matches!(source, SchemaError::Element { index: 0, .. }))
            }
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_check_decodes_raw_payloads() {
        let config = typed("array<int>");
        assert!(config.check(&Message::raw(b"[1, 2]".to_vec())).is_ok());
        let err = config.check(&Message::raw(b"[1,".to_vec())).unwrap_err();
        assert!(matches!(
            err,
            PortError::Validation {
                source: SchemaError::Undecodable { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_check_rejects_mismatched_schema_name() {
        let config = typed("string");
        let err = config
            .check(&Message::new("hello").with_schema("int"))
            .unwrap_err();
        assert_eq!(
            err,
            PortError::SchemaMismatch {
                port: "in".to_string(),
                expected: "string".to_string(),
                actual: "int".to_string(),
            }
        );
        assert!(config.check(&Message::new("hello").with_schema("string")).is_ok());
    }

    #[test]
    fn test_null_payload_fails_any() {
        let config = typed("any");
        assert!(config.check(&Message::new(Value::from(json!({})))).is_ok());
        assert!(config.check(&Message::new(Value::Null)).is_err());
    }

    #[test]
    fn test_validate_config() {
        assert!(PortConfig::new("in", Direction::Input).validate().is_ok());
        assert!(PortConfig::new("in", Direction::Input)
            .with_buffer_size(0)
            .validate()
            .is_err());
        assert!(PortConfig::new("", Direction::Output).validate().is_err());
        assert!(PortConfig::new("out", Direction::Output)
            .with_retry(RetryPolicy::with_attempts(0))
            .validate()
            .is_err());
    }

    #[test]
    fn test_backpressure_ratio() {
        assert_eq!(backpressure_ratio(0, 10), 0.0);
        assert_eq!(backpressure_ratio(5, 10), 0.5);
        assert_eq!(backpressure_ratio(12, 10), 1.0);
        assert_eq!(backpressure_ratio(0, 0), 1.0);
    }
}
