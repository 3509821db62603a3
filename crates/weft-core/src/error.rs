//! Error types for weft-core

use thiserror::Error;

use crate::parser::ParseError;

/// Result type alias for weft-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in weft-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Flow source did not parse cleanly
    #[error("{} syntax error(s) in '{source_name}': {}", .errors.len(), first_error(.errors))]
    Syntax {
        /// File or label of the source text
        source_name: String,
        /// Every diagnostic reported by the parser
        errors: Vec<ParseError>,
    },

    /// Flow definition error
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// Payload failed schema validation
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Schema registry error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Port contract violation
    #[error(transparent)]
    Port(#[from] PortError),

    /// Node contract violation
    #[error(transparent)]
    Node(#[from] NodeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn first_error(errors: &[ParseError]) -> String {
    errors.first().map(ToString::to_string).unwrap_or_default()
}

/// Validation failure reported by a schema
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Null or absent value
    #[error("value is null, expected {expected}")]
    Null {
        /// Type the schema wanted
        expected: String,
    },

    /// Value of the wrong dynamic type
    #[error("expected {expected}, got {actual}")]
    TypeMismatch {
        /// Type the schema wanted
        expected: String,
        /// Dynamic type of the value
        actual: String,
    },

    /// An array element failed its element schema
    #[error("element {index}: {source}")]
    Element {
        /// Index of the first failing element
        index: usize,
        /// Why the element failed
        source: Box<SchemaError>,
    },

    /// A required object property is absent
    #[error("missing required property '{property}'")]
    MissingProperty {
        /// Property name
        property: String,
    },

    /// An object property failed its property schema
    #[error("property '{property}': {source}")]
    Property {
        /// Property name
        property: String,
        /// Why the property failed
        source: Box<SchemaError>,
    },

    /// Raw payload bytes were not decodable
    #[error("payload is not valid JSON: {message}")]
    Undecodable {
        /// Decoder message
        message: String,
    },
}

/// Schema registry failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The (type, version) pair is already registered
    #[error("schema {type_name} version {version} is already registered")]
    Duplicate {
        /// Schema type name
        type_name: String,
        /// Schema version
        version: String,
    },

    /// No schema of this type is registered
    #[error("unknown schema type '{type_name}'")]
    UnknownType {
        /// Requested type name
        type_name: String,
    },

    /// The type exists but not at this version
    #[error("unknown version '{version}' of schema type '{type_name}'")]
    UnknownVersion {
        /// Requested type name
        type_name: String,
        /// Requested version
        version: String,
    },

    /// A type expression could not be understood
    #[error("invalid type expression '{expression}'")]
    InvalidTypeExpression {
        /// The expression as written
        expression: String,
    },
}

/// Why a call context finished
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The context was cancelled
    #[error("context cancelled")]
    Cancelled,
    /// The context deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Port contract failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortError {
    /// The caller's context was cancelled while waiting
    #[error("port '{port}': operation cancelled")]
    Cancelled {
        /// Port name
        port: String,
    },

    /// The caller's deadline passed while waiting
    #[error("port '{port}': deadline exceeded")]
    DeadlineExceeded {
        /// Port name
        port: String,
    },

    /// The buffer is full and the quality of service forbids dropping
    #[error("port '{port}': buffer full ({capacity} messages)")]
    BufferFull {
        /// Port name
        port: String,
        /// Buffer capacity
        capacity: usize,
    },

    /// Payload did not match the port's data type
    #[error("port '{port}': invalid payload for message {message_id}: {source}")]
    Validation {
        /// Port name
        port: String,
        /// Offending message
        message_id: String,
        /// Validation failure
        source: SchemaError,
    },

    /// The message declares a schema the port does not carry
    #[error("port '{port}': message schema '{actual}' does not match port type '{expected}'")]
    SchemaMismatch {
        /// Port name
        port: String,
        /// Port data type
        expected: String,
        /// Schema named on the message
        actual: String,
    },

    /// Exactly-once port saw the same message id twice
    #[error("port '{port}': message {message_id} was already delivered")]
    DuplicateMessage {
        /// Port name
        port: String,
        /// Repeated message id
        message_id: String,
    },

    /// The port was closed
    #[error("port '{port}' is closed")]
    Closed {
        /// Port name
        port: String,
    },

    /// Requested buffer size cannot be applied
    #[error("port '{port}': cannot resize buffer to {requested} with {in_flight} messages in flight")]
    InvalidBufferSize {
        /// Port name
        port: String,
        /// Requested capacity
        requested: usize,
        /// Messages currently buffered
        in_flight: usize,
    },

    /// Configuration change rejected
    #[error("port '{port}': invalid configuration: {message}")]
    InvalidConfig {
        /// Port name
        port: String,
        /// What is wrong
        message: String,
    },
}

impl PortError {
    /// Build the error matching a finished context
    pub fn from_context(port: impl Into<String>, err: ContextError) -> Self {
        let port = port.into();
        match err {
            ContextError::Cancelled => PortError::Cancelled { port },
            ContextError::DeadlineExceeded => PortError::DeadlineExceeded { port },
        }
    }

    /// Whether the operation ended because the caller gave up
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            PortError::Cancelled { .. } | PortError::DeadlineExceeded { .. }
        )
    }

    /// Whether retrying the same send later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, PortError::BufferFull { .. })
    }
}

/// Node contract failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    /// Data-plane call on a node that is not processing
    #[error("node '{node}' is not running (state: {state})")]
    NotRunning {
        /// Node name
        node: String,
        /// Current lifecycle state
        state: String,
    },

    /// Lifecycle call not allowed from the current state
    #[error("node '{node}': cannot {operation} while {state}")]
    InvalidTransition {
        /// Node name
        node: String,
        /// Requested operation
        operation: String,
        /// Current lifecycle state
        state: String,
    },

    /// Node configuration rejected
    #[error("node '{node}': invalid configuration: {message}")]
    InvalidConfig {
        /// Node name
        node: String,
        /// What is wrong
        message: String,
    },

    /// Processing a message failed
    #[error("node '{node}' failed to process message {message_id}: {message}")]
    Processing {
        /// Node name
        node: String,
        /// Message being processed
        message_id: String,
        /// What went wrong
        message: String,
    },

    /// The caller's context finished before processing completed
    #[error("node '{node}': {reason}")]
    Cancelled {
        /// Node name
        node: String,
        /// Why the context finished
        reason: ContextError,
    },

    /// A port operation failed inside the node
    #[error("node '{node}': {source}")]
    Port {
        /// Node name
        node: String,
        /// Port failure
        source: PortError,
    },
}

/// Errors found while turning a syntax tree into flow definitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Two flows share a name
    #[error("duplicate flow '{flow}'")]
    DuplicateFlow {
        /// Flow name
        flow: String,
    },

    /// Two nodes in one flow share a name
    #[error("flow '{flow}': duplicate node '{node}'")]
    DuplicateNode {
        /// Flow name
        flow: String,
        /// Node name
        node: String,
    },

    /// An edge names a node that does not exist
    #[error("flow '{flow}': node '{node}' references unknown node '{target}'")]
    UnknownNode {
        /// Flow name
        flow: String,
        /// Node holding the reference
        node: String,
        /// Missing node
        target: String,
    },

    /// Edges form a cycle
    #[error("flow '{flow}': cycle through node '{node}'")]
    Cycle {
        /// Flow name
        flow: String,
        /// A node on the cycle
        node: String,
    },

    /// A statement appears where it has no meaning
    #[error("{message} ({position})")]
    Misplaced {
        /// What is wrong
        message: String,
        /// Where the statement starts
        position: crate::token::Position,
    },

    /// A setting has an unusable value
    #[error("flow '{flow}': invalid setting '{setting}': {message}")]
    InvalidSetting {
        /// Flow name
        flow: String,
        /// Setting name
        setting: String,
        /// What is wrong
        message: String,
    },
}
