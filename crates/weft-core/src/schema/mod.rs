//! Payload schemas
//!
//! A schema is a named, versioned validator for the dynamic shape of a
//! [`Value`]. Scalar schemas match a single dynamic type, [`ArraySchema`]
//! checks every element against one element schema, and [`ObjectSchema`]
//! checks named properties.
//!
//! `Null` never validates, not even against `any`.

mod composite;
mod scalar;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

pub use composite::{ArraySchema, ObjectSchema};
pub use scalar::{ScalarKind, ScalarSchema};

use crate::error::SchemaError;
use crate::value::Value;

/// Version given to the builtin scalar schemas
pub const BUILTIN_VERSION: &str = "1.0.0";

/// Capability shared by every schema variant
pub trait Schema: fmt::Debug + Send + Sync {
    /// Check that `value` has the shape this schema describes
    fn validate(&self, value: &Value) -> Result<(), SchemaError>;

    /// Type name, e.g. `string` or `array<int>`
    fn type_name(&self) -> String;

    /// Version string
    fn version(&self) -> &str;
}

/// Shared handle to a schema
pub type SchemaRef = Arc<dyn Schema>;

/// Whether two schemas describe the same type at the same major version
pub fn is_compatible(a: &dyn Schema, b: &dyn Schema) -> bool {
    a.type_name() == b.type_name() && major_version(a.version()) == major_version(b.version())
}

/// First dot-separated segment of a version string
pub fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// Order two version strings.
///
/// Versions are split on `.` and compared segment by segment. Segments that
/// are both numeric compare as numbers, anything else compares as text, and
/// when one version is a prefix of the other the shorter one sorts first.
/// So `10.0` sorts after `9.0` and `1.0` before `1.0.1`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

pub(crate) fn require_non_null(value: &Value, expected: &str) -> Result<(), SchemaError> {
    if value.is_null() {
        return Err(SchemaError::Null {
            expected: expected.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn mismatch(expected: impl Into<String>, value: &Value) -> SchemaError {
    SchemaError::TypeMismatch {
        expected: expected.into(),
        actual: value.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.0.0", "1.0.0", Ordering::Equal)]
    #[case("10.0", "9.0", Ordering::Greater)]
    #[case("1.2.0", "1.10.0", Ordering::Less)]
    #[case("1.0", "1.0.1", Ordering::Less)]
    #[case("2.0.0-beta", "2.0.0-alpha", Ordering::Greater)]
    #[case("v2", "v10", Ordering::Greater)]
    fn test_compare_versions(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(compare_versions(a, b), expected);
    }

    #[test]
    fn test_major_version() {
        assert_eq!(major_version("12.3.4"), "12");
        assert_eq!(major_version("1"), "1");
        assert_eq!(major_version(""), "");
    }

    #[test]
    fn test_compatibility_uses_full_major_segment() {
        let v1 = ScalarSchema::with_version(ScalarKind::String, "1.4.0");
        let v1_later = ScalarSchema::with_version(ScalarKind::String, "1.9.2");
        let v10 = ScalarSchema::with_version(ScalarKind::String, "10.0.0");
        let int = ScalarSchema::with_version(ScalarKind::Int, "1.4.0");

        assert!(is_compatible(&v1, &v1_later));
        assert!(!is_compatible(&v1, &v10));
        assert!(!is_compatible(&v1, &int));
    }
}
