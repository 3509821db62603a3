//! Messages exchanged between nodes

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchemaError;
use crate::value::Value;

/// Message body
///
/// The contract never interprets a payload; it only validates it against the
/// port's schema. Raw bytes are decoded as JSON for validation.
///
/// On the wire the variant is explicit: `{"value": <json>}` or
/// `{"raw": "<base64>"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Structured value
    Value(Value),
    /// Undecoded bytes
    Raw(#[serde(with = "base64_bytes")] Vec<u8>),
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

impl Payload {
    /// Structured view of the payload
    pub fn to_value(&self) -> Result<Value, SchemaError> {
        match self {
            Payload::Value(value) => Ok(value.clone()),
            Payload::Raw(bytes) => serde_json::from_slice::<serde_json::Value>(bytes)
                .map(Value::from)
                .map_err(|err| SchemaError::Undecodable {
                    message: err.to_string(),
                }),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Value(Value::Null)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

/// A unit of data moving through a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id
    pub id: String,

    /// Type name of the payload schema, if the sender declares one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Message body
    pub payload: Payload,

    /// Sending node
    #[serde(default)]
    pub source: String,

    /// Receiving node
    #[serde(default)]
    pub target: String,

    /// Flow the message belongs to
    #[serde(default)]
    pub flow_id: String,

    /// Creation time
    pub timestamp: DateTime<Utc>,

    /// Free-form headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Trace shared by every message derived from the same input
    pub trace_id: String,

    /// Span of the step that produced this message
    pub span_id: String,

    /// Context propagated along the trace
    #[serde(default)]
    pub baggage: BTreeMap<String, String>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn new_span_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

impl Message {
    /// New message with fresh ids and the current time
    pub fn new(payload: impl Into<Value>) -> Self {
        Self::with_payload(Payload::Value(payload.into()))
    }

    /// New message around an existing payload
    pub fn with_payload(payload: Payload) -> Self {
        Self {
            id: new_id(),
            schema: None,
            payload,
            source: String::new(),
            target: String::new(),
            flow_id: String::new(),
            timestamp: Utc::now(),
            headers: BTreeMap::new(),
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: new_span_id(),
            baggage: BTreeMap::new(),
        }
    }

    /// New message carrying raw bytes
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_payload(Payload::Raw(bytes.into()))
    }

    /// Set the declared schema type name
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Set the source node
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the target node
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Set the flow id
    pub fn with_flow(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = flow_id.into();
        self
    }

    /// Add a header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add a baggage item
    pub fn with_baggage(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.baggage.insert(key.into(), value.into());
        self
    }

    /// Header value by key
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Copy of this message for the next hop: same trace, new id and span
    pub fn derive(&self, payload: Payload) -> Self {
        Self {
            id: new_id(),
            payload,
            timestamp: Utc::now(),
            span_id: new_span_id(),
            ..self.clone()
        }
    }

    /// Start a new span on this message, returning the previous span id
    pub fn enter_span(&mut self) -> String {
        std::mem::replace(&mut self.span_id, new_span_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_message_has_ids() {
        let a = Message::new(1i32);
        let b = Message::new(1i32);
        assert_ne!(a.id, b.id);
        assert_ne!(a.trace_id, b.trace_id);
        assert_eq!(a.span_id.len(), 16);
        assert_eq!(a.payload, Payload::Value(Value::Int(1)));
    }

    #[test]
    fn test_builder() {
        let msg = Message::new("hi")
            .with_schema("string")
            .with_source("a")
            .with_target("b")
            .with_flow("orders")
            .with_header("tenant", "acme")
            .with_baggage("user", "42");
        assert_eq!(msg.schema.as_deref(), Some("string"));
        assert_eq!(msg.source, "a");
        assert_eq!(msg.target, "b");
        assert_eq!(msg.flow_id, "orders");
        assert_eq!(msg.header("tenant"), Some("acme"));
        assert_eq!(msg.baggage.get("user").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_wire_shape() {
        let msg = Message::new(Value::from(json!({"id": 7})))
            .with_schema("object")
            .with_header("k", "v");
        let json = serde_json::to_value(&msg).unwrap();
        for field in [
            "id", "schema", "payload", "source", "target", "flow_id", "timestamp", "headers",
            "trace_id", "span_id", "baggage",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(json["payload"], json!({"value": {"id": 7}}));

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_wire_shape_keeps_raw_bytes() {
        let msg = Message::raw(br#"{"a":1}"#.to_vec());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""payload":{"raw":"eyJhIjoxfQ=="}"#), "{json}");

        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.payload, Payload::Raw(br#"{"a":1}"#.to_vec()));
        assert_eq!(back.payload.to_value().unwrap(), Value::from(json!({"a": 1})));
    }

    #[test]
    fn test_array_value_is_not_read_as_raw() {
        let msg = Message::new(Value::from(json!([123, 34])));
        let back: Message = serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(back.payload, msg.payload);
    }

    #[test]
    fn test_raw_payload_rejects_bad_base64() {
        let mut json = serde_json::to_value(Message::raw(b"x".to_vec())).unwrap();
        json["payload"] = json!({"raw": "not base64!"});
        assert!(serde_json::from_value::<Message>(json).is_err());
    }

    #[test]
    fn test_raw_payload_decodes_json() {
        let msg = Message::raw(br#"{"a": [1, 2]}"#.to_vec());
        let value = msg.payload.to_value().unwrap();
        assert_eq!(value, Value::from(json!({"a": [1, 2]})));
    }

    #[test]
    fn test_raw_payload_undecodable() {
        let err = Message::raw(vec![0xff, 0x00]).payload.to_value().unwrap_err();
        assert!(matches!(err, SchemaError::Undecodable { .. }));
    }

    #[test]
    fn test_derive_keeps_trace() {
        let parent = Message::new(1i32).with_header("k", "v").with_flow("f");
        let child = parent.derive(Payload::Value(Value::Int(2)));
        assert_eq!(child.trace_id, parent.trace_id);
        assert_ne!(child.span_id, parent.span_id);
        assert_ne!(child.id, parent.id);
        assert_eq!(child.header("k"), Some("v"));
        assert_eq!(child.flow_id, "f");
    }

    #[test]
    fn test_enter_span_returns_parent() {
        let mut msg = Message::new(1i32);
        let before = msg.span_id.clone();
        let parent = msg.enter_span();
        assert_eq!(parent, before);
        assert_ne!(msg.span_id, before);
    }
}
