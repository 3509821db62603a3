//! Versioned schema registry
//!
//! The registry maps a type name to every registered version of that type.
//! One registry is built per process (or per test) and shared as
//! `Arc<Registry>`; it starts out holding the six builtin scalar schemas.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::RegistryError;
use crate::schema::{ArraySchema, ScalarKind, ScalarSchema, SchemaRef, compare_versions};

/// Deepest `array<...>` nesting [`Registry::resolve`] builds
pub const MAX_ARRAY_DEPTH: usize = 32;

type Versions = BTreeMap<String, SchemaRef>;

/// Thread-safe store of schemas keyed by (type name, version)
#[derive(Debug)]
pub struct Registry {
    schemas: RwLock<BTreeMap<String, Versions>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a registry holding the builtin scalar schemas
    pub fn new() -> Self {
        let mut schemas = BTreeMap::new();
        for kind in ScalarKind::ALL {
            let schema: SchemaRef = Arc::new(ScalarSchema::new(kind));
            let mut versions = Versions::new();
            versions.insert(schema.version().to_string(), schema);
            schemas.insert(kind.name().to_string(), versions);
        }
        Self {
            schemas: RwLock::new(schemas),
        }
    }

    /// Add a schema; fails if its (type, version) pair is already present
    pub fn register(&self, schema: SchemaRef) -> Result<(), RegistryError> {
        let type_name = schema.type_name();
        let version = schema.version().to_string();

        let mut schemas = self.schemas.write();
        let versions = schemas.entry(type_name.clone()).or_default();
        if versions.contains_key(&version) {
            return Err(RegistryError::Duplicate { type_name, version });
        }
        versions.insert(version.clone(), schema);
        drop(schemas);

        debug!(type_name = %type_name, version = %version, "Registered schema");
        Ok(())
    }

    /// Look up one exact version of a type
    pub fn get(&self, type_name: &str, version: &str) -> Result<SchemaRef, RegistryError> {
        let schemas = self.schemas.read();
        let versions = schemas
            .get(type_name)
            .ok_or_else(|| RegistryError::UnknownType {
                type_name: type_name.to_string(),
            })?;
        versions
            .get(version)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownVersion {
                type_name: type_name.to_string(),
                version: version.to_string(),
            })
    }

    /// Greatest registered version of a type
    pub fn get_latest(&self, type_name: &str) -> Result<SchemaRef, RegistryError> {
        let schemas = self.schemas.read();
        schemas
            .get(type_name)
            .and_then(|versions| {
                versions
                    .iter()
                    .max_by(|(a, _), (b, _)| compare_versions(a, b))
                    .map(|(_, schema)| Arc::clone(schema))
            })
            .ok_or_else(|| RegistryError::UnknownType {
                type_name: type_name.to_string(),
            })
    }

    /// Registered type names, sorted
    pub fn list_types(&self) -> Vec<String> {
        self.schemas.read().keys().cloned().collect()
    }

    /// Registered versions of a type, oldest first
    pub fn list_versions(&self, type_name: &str) -> Result<Vec<String>, RegistryError> {
        let schemas = self.schemas.read();
        let versions = schemas
            .get(type_name)
            .ok_or_else(|| RegistryError::UnknownType {
                type_name: type_name.to_string(),
            })?;
        let mut list: Vec<String> = versions.keys().cloned().collect();
        list.sort_by(|a, b| compare_versions(a, b));
        Ok(list)
    }

    /// Resolve a type expression such as `int` or `array<array<string>>`.
    ///
    /// Named types resolve to their latest version. An `array<T>` that is not
    /// registered under its own name is built from the resolved element type,
    /// at most [`MAX_ARRAY_DEPTH`] levels deep.
    pub fn resolve(&self, expression: &str) -> Result<SchemaRef, RegistryError> {
        let invalid = || RegistryError::InvalidTypeExpression {
            expression: expression.trim().to_string(),
        };

        // peel `array<...>` layers until a registered name is reached
        let mut current = expression.trim();
        let mut layers = 0usize;
        let element = loop {
            if current.is_empty() {
                return Err(invalid());
            }
            let array_body = current
                .strip_prefix("array")
                .map(str::trim_start)
                .and_then(|rest| rest.strip_prefix('<'));
            match (self.get_latest(current), array_body) {
                (Ok(schema), _) => break schema,
                (Err(err), None) => return Err(err),
                (Err(_), Some(body)) => {
                    if layers == MAX_ARRAY_DEPTH {
                        return Err(invalid());
                    }
                    current = body.strip_suffix('>').ok_or_else(invalid)?.trim();
                    layers += 1;
                }
            }
        };

        Ok((0..layers).fold(element, |element, _| {
            Arc::new(ArraySchema::new(element)) as SchemaRef
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BUILTIN_VERSION, ObjectSchema, Schema};
    use crate::value::Value;
    use std::thread;

    fn versioned_string(version: &str) -> SchemaRef {
        Arc::new(ScalarSchema::with_version(ScalarKind::String, version))
    }

    #[test]
    fn test_builtins_are_preloaded() {
        let registry = Registry::new();
        assert_eq!(
            registry.list_types(),
            vec!["any", "bool", "float", "int", "string", "time"]
        );
        let latest = registry.get_latest("string").unwrap();
        assert_eq!(latest.type_name(), "string");
        assert_eq!(latest.version(), BUILTIN_VERSION);
    }

    #[test]
    fn test_reregistering_builtin_fails() {
        let registry = Registry::new();
        let err = registry
            .register(Arc::new(ScalarSchema::new(ScalarKind::Int)))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                type_name: "int".to_string(),
                version: BUILTIN_VERSION.to_string()
            }
        );
    }

    #[test]
    fn test_get_distinguishes_unknown_type_and_version() {
        let registry = Registry::new();
        assert!(matches!(
            registry.get("money", "1.0.0"),
            Err(RegistryError::UnknownType { .. })
        ));
        assert!(matches!(
            registry.get("string", "2.0.0"),
            Err(RegistryError::UnknownVersion { .. })
        ));
        assert!(registry.get("string", "1.0.0").is_ok());
    }

    #[test]
    fn test_latest_orders_versions_numerically() {
        let registry = Registry::new();
        registry.register(versioned_string("9.0")).unwrap();
        registry.register(versioned_string("10.0")).unwrap();
        registry.register(versioned_string("2.5.1")).unwrap();

        assert_eq!(registry.get_latest("string").unwrap().version(), "10.0");
        assert_eq!(
            registry.list_versions("string").unwrap(),
            vec!["1.0.0", "2.5.1", "9.0", "10.0"]
        );
    }

    #[test]
    fn test_register_object_schema() {
        let registry = Registry::new();
        let order = ObjectSchema::with_version("2.0.0")
            .required_property("id", registry.get_latest("string").unwrap());
        registry.register(Arc::new(order)).unwrap();

        assert!(registry.list_types().contains(&"object".to_string()));
        let schema = registry.get("object", "2.0.0").unwrap();
        let value: Value = [("id", "o-1")].into_iter().collect();
        assert!(schema.validate(&value).is_ok());
    }

    #[test]
    fn test_resolve_type_expressions() {
        let registry = Registry::new();
        let nested = registry.resolve("array<array<int>>").unwrap();
        assert_eq!(nested.type_name(), "array<array<int>>");
        assert!(nested
            .validate(&Value::Array(vec![Value::from(vec![1i32, 2])]))
            .is_ok());

        assert_eq!(registry.resolve(" float ").unwrap().type_name(), "float");
        assert!(matches!(
            registry.resolve("array<money>"),
            Err(RegistryError::UnknownType { .. })
        ));
        assert!(matches!(
            registry.resolve("array<int"),
            Err(RegistryError::InvalidTypeExpression { .. })
        ));
        assert!(matches!(
            registry.resolve(""),
            Err(RegistryError::InvalidTypeExpression { .. })
        ));
    }

    fn nested_array(depth: usize) -> String {
        format!("{}int{}", "array<".repeat(depth), ">".repeat(depth))
    }

    #[test]
    fn test_resolve_limits_array_nesting() {
        let registry = Registry::new();
        let schema = registry.resolve(&nested_array(MAX_ARRAY_DEPTH)).unwrap();
        assert_eq!(schema.type_name(), nested_array(MAX_ARRAY_DEPTH));

        for depth in [MAX_ARRAY_DEPTH + 1, 100_000] {
            assert!(matches!(
                registry.resolve(&nested_array(depth)),
                Err(RegistryError::InvalidTypeExpression { .. })
            ));
        }
    }

    #[test]
    fn test_resolve_array_lookalikes_are_unknown_types() {
        let registry = Registry::new();
        for name in ["arrayish", "array", "arrays<int>"] {
            let err = registry.resolve(name).err();
            assert!(
                matches!(&err, Some(RegistryError::UnknownType { type_name }) if type_name == name),
                "{name}: {err:?}"
            );
        }
    }

    #[test]
    fn test_resolve_prefers_registered_array_schema() {
        let registry = Registry::new();
        let element = registry.get_latest("int").unwrap();
        registry
            .register(Arc::new(ArraySchema::with_version(element, "3.0.0")))
            .unwrap();
        assert_eq!(registry.resolve("array<int>").unwrap().version(), "3.0.0");
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry.register(versioned_string(&format!("2.{i}"))).unwrap();
                    registry.get_latest("string").unwrap();
                    registry.list_types();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.list_versions("string").unwrap().len(), 9);
        assert_eq!(registry.get_latest("string").unwrap().version(), "2.7");
    }
}
