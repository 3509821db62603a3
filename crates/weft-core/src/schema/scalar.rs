use std::fmt;
use std::str::FromStr;

use super::{BUILTIN_VERSION, Schema, mismatch, require_non_null};
use crate::error::SchemaError;
use crate::value::Value;

/// The builtin scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// UTF-8 string
    String,
    /// Any fixed-width integer
    Int,
    /// 32- or 64-bit float
    Float,
    /// Boolean
    Bool,
    /// Timestamp
    Time,
    /// Any non-null value
    Any,
}

impl ScalarKind {
    /// Every scalar kind, in registration order
    pub const ALL: [ScalarKind; 6] = [
        ScalarKind::String,
        ScalarKind::Int,
        ScalarKind::Float,
        ScalarKind::Bool,
        ScalarKind::Time,
        ScalarKind::Any,
    ];

    /// Type name of the kind
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Bool => "bool",
            ScalarKind::Time => "time",
            ScalarKind::Any => "any",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ScalarKind::String => matches!(value, Value::String(_)),
            ScalarKind::Int => matches!(value, Value::Int(_) | Value::UInt(_)),
            ScalarKind::Float => matches!(value, Value::Float(_)),
            ScalarKind::Bool => matches!(value, Value::Bool(_)),
            ScalarKind::Time => matches!(value, Value::Time(_)),
            ScalarKind::Any => true,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalarKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScalarKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or(())
    }
}

/// Schema matching exactly one scalar type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarSchema {
    kind: ScalarKind,
    version: String,
}

impl ScalarSchema {
    /// Builtin schema for `kind`
    pub fn new(kind: ScalarKind) -> Self {
        Self::with_version(kind, BUILTIN_VERSION)
    }

    /// Schema for `kind` at a specific version
    pub fn with_version(kind: ScalarKind, version: impl Into<String>) -> Self {
        Self {
            kind,
            version: version.into(),
        }
    }

    /// The scalar kind
    pub fn kind(&self) -> ScalarKind {
        self.kind
    }
}

impl Schema for ScalarSchema {
    fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        require_non_null(value, self.kind.name())?;
        if self.kind.accepts(value) {
            Ok(())
        } else {
            Err(mismatch(self.kind.name(), value))
        }
    }

    fn type_name(&self) -> String {
        self.kind.name().to_string()
    }

    fn version(&self) -> &str {
        &self.version
    }
}
