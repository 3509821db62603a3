use std::collections::{BTreeMap, BTreeSet};

use super::{BUILTIN_VERSION, Schema, SchemaRef, mismatch, require_non_null};
use crate::error::SchemaError;
use crate::value::Value;

/// Homogeneous list; every element must match `element`
#[derive(Debug, Clone)]
pub struct ArraySchema {
    element: SchemaRef,
    version: String,
}

impl ArraySchema {
    /// Array of `element` at the builtin version
    pub fn new(element: SchemaRef) -> Self {
        Self::with_version(element, BUILTIN_VERSION)
    }

    /// Array of `element` at a specific version
    pub fn with_version(element: SchemaRef, version: impl Into<String>) -> Self {
        Self {
            element,
            version: version.into(),
        }
    }

    /// Schema applied to each element
    pub fn element(&self) -> &SchemaRef {
        &self.element
    }
}

impl Schema for ArraySchema {
    fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        let type_name = self.type_name();
        require_non_null(value, &type_name)?;
        let Value::Array(items) = value else {
            return Err(mismatch(type_name, value));
        };
        for (index, item) in items.iter().enumerate() {
            self.element
                .validate(item)
                .map_err(|err| SchemaError::Element {
                    index,
                    source: Box::new(err),
                })?;
        }
        Ok(())
    }

    fn type_name(&self) -> String {
        format!("array<{}>", self.element.type_name())
    }

    fn version(&self) -> &str {
        &self.version
    }
}

/// Named properties with a set of required names.
///
/// Properties the schema does not declare are ignored. The type name is
/// always `object`, whatever the property set.
#[derive(Debug, Clone)]
pub struct ObjectSchema {
    properties: BTreeMap<String, SchemaRef>,
    required: BTreeSet<String>,
    version: String,
}

impl ObjectSchema {
    /// Empty object schema at the builtin version
    pub fn new() -> Self {
        Self::with_version(BUILTIN_VERSION)
    }

    /// Empty object schema at a specific version
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            properties: BTreeMap::new(),
            required: BTreeSet::new(),
            version: version.into(),
        }
    }

    /// Declare an optional property
    pub fn property(mut self, name: impl Into<String>, schema: SchemaRef) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Declare a required property
    pub fn required_property(mut self, name: impl Into<String>, schema: SchemaRef) -> Self {
        let name = name.into();
        self.required.insert(name.clone());
        self.properties.insert(name, schema);
        self
    }

    /// Declared properties
    pub fn properties(&self) -> &BTreeMap<String, SchemaRef> {
        &self.properties
    }

    /// Names that must be present
    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }
}

impl Default for ObjectSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema for ObjectSchema {
    fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        require_non_null(value, "object")?;
        let Value::Object(map) = value else {
            return Err(mismatch("object", value));
        };

        if let Some(missing) = self.required.iter().find(|name| !map.contains_key(*name)) {
            return Err(SchemaError::MissingProperty {
                property: missing.clone(),
            });
        }

        for (name, property) in map {
            let Some(schema) = self.properties.get(name) else {
                continue;
            };
            schema
                .validate(property)
                .map_err(|err| SchemaError::Property {
                    property: name.clone(),
                    source: Box::new(err),
                })?;
        }
        Ok(())
    }

    fn type_name(&self) -> String {
        "object".to_string()
    }

    fn version(&self) -> &str {
        &self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ScalarKind, ScalarSchema};
    use serde::Serialize;
    use serde_json::json;
    use std::sync::Arc;

    fn scalar(kind: ScalarKind) -> SchemaRef {
        Arc::new(ScalarSchema::new(kind))
    }

    fn order_schema() -> ObjectSchema {
        ObjectSchema::new()
            .required_property("id", scalar(ScalarKind::String))
            .required_property("total", scalar(ScalarKind::Float))
            .property("tags", Arc::new(ArraySchema::new(scalar(ScalarKind::String))))
    }

    #[test]
    fn test_array_type_name() {
        let nested = ArraySchema::new(Arc::new(ArraySchema::new(scalar(ScalarKind::Int))));
        assert_eq!(nested.type_name(), "array<array<int>>");
    }

    #[test]
    fn test_array_of_ints_against_strings_names_index_zero() {
        let schema = ArraySchema::new(scalar(ScalarKind::String));
        let err = schema.validate(&Value::from(vec![1i32, 2, 3])).unwrap_err();
        match err {
            SchemaError::Element { index, .. } => assert_eq!(index, 0),
            other => panic!("Expected element error, got {other:?}"),
        }
    }

    #[test]
    fn test_array_stops_at_first_bad_element() {
        let schema = ArraySchema::new(scalar(ScalarKind::Int));
        let value = Value::Array(vec![
            Value::from(1i32),
            Value::from("two"),
            Value::from("three"),
        ]);
        let err = schema.validate(&value).unwrap_err();
        assert!(err.to_string().starts_with("element 1:"));
    }

    #[test]
    fn test_array_accepts_empty_and_matching() {
        let schema = ArraySchema::new(scalar(ScalarKind::Int));
        assert!(schema.validate(&Value::Array(vec![])).is_ok());
        assert!(schema.validate(&Value::from(vec![1u8, 2, 3])).is_ok());
        assert!(schema.validate(&Value::from("not a list")).is_err());
        assert!(schema.validate(&Value::Null).is_err());
    }

    #[test]
    fn test_object_with_required_properties() {
        let value = Value::from(json!({"id": "o-1", "total": 9.5, "tags": ["new"]}));
        assert!(order_schema().validate(&value).is_ok());
    }

    #[test]
    fn test_object_missing_required_property() {
        let value = Value::from(json!({"id": "o-1"}));
        let err = order_schema().validate(&value).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingProperty {
                property: "total".to_string()
            }
        );
    }

    #[test]
    fn test_object_tolerates_unknown_properties() {
        let value = Value::from(json!({"id": "o-1", "total": 1.0, "channel": "web"}));
        assert!(order_schema().validate(&value).is_ok());
    }

    #[test]
    fn test_object_property_type_error_names_property() {
        let value = Value::from(json!({"id": "o-1", "total": 1.0, "tags": [1]}));
        let err = order_schema().validate(&value).unwrap_err();
        assert_eq!(err.to_string(), "property 'tags': element 0: expected string, got int");
    }

    #[test]
    fn test_object_from_struct() {
        #[derive(Serialize)]
        struct Order {
            id: String,
            #[serde(rename = "total")]
            amount: f64,
        }
        let value = Value::from_serialize(&Order {
            id: "o-2".to_string(),
            amount: 3.25,
        })
        .unwrap();
        assert!(order_schema().validate(&value).is_ok());
    }

    #[test]
    fn test_object_type_name_ignores_properties() {
        assert_eq!(order_schema().type_name(), "object");
        assert_eq!(ObjectSchema::new().type_name(), "object");
    }

    #[test]
    fn test_object_rejects_non_objects() {
        assert!(order_schema().validate(&Value::from(1i32)).is_err());
        assert!(order_schema().validate(&Value::Null).is_err());
    }
}
