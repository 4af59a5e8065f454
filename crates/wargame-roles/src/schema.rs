//! Declared field schemas for stored workspace records
//!
//! Each declared field has a type, an optional default and a required flag.
//! [`Mode::Lenient`] replaces missing or mistyped fields with their default
//! (dropping them when there is none); [`Mode::Strict`] refuses the whole
//! record. A value of the wrong type is never passed through. Fields the
//! schema does not declare are kept as stored.

use crate::error::SchemaError;
use serde_json::{Map, Value};
use tracing::warn;

/// JSON value kinds a field can be declared as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// JSON array
    Array,
    /// JSON number
    Number,
    /// JSON string
    String,
    /// JSON boolean
    Boolean,
    /// JSON object
    Object,
}

impl FieldType {
    /// Kind of a value; `None` for null
    #[must_use]
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Array(_) => Some(Self::Array),
            Value::Number(_) => Some(Self::Number),
            Value::String(_) => Some(Self::String),
            Value::Bool(_) => Some(Self::Boolean),
            Value::Object(_) => Some(Self::Object),
        }
    }

    /// Lowercase name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Object => "object",
        }
    }
}

/// How to treat a record that does not match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Substitute defaults
    #[default]
    Lenient,
    /// Refuse the record
    Strict,
}

/// One declared field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Expected kind
    pub kind: FieldType,
    /// Whether the field must be present
    pub required: bool,
    /// Replacement for missing or mistyped values
    pub default: Option<Value>,
}

/// Result of validating a record
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    /// Sanitized record
    pub record: Map<String, Value>,
    /// Declared fields that were replaced or dropped
    pub repaired: Vec<String>,
}

impl Validated {
    /// Whether the record matched the schema as stored
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.repaired.is_empty()
    }
}

/// Declared shape of a stored record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: Vec<(String, FieldSpec)>,
}

impl Schema {
    /// Empty schema
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Optional field without default
    #[must_use]
    pub fn field(self, name: &str, kind: FieldType) -> Self {
        self.declare(name, kind, false, None)
    }

    /// Optional field with default
    #[must_use]
    pub fn field_or(self, name: &str, kind: FieldType, default: Value) -> Self {
        self.declare(name, kind, false, Some(default))
    }

    /// Required field, with the default used in lenient mode
    #[must_use]
    pub fn required(self, name: &str, kind: FieldType, default: Option<Value>) -> Self {
        self.declare(name, kind, true, default)
    }

    fn declare(mut self, name: &str, kind: FieldType, required: bool, default: Option<Value>) -> Self {
        self.fields.push((
            name.to_string(),
            FieldSpec {
                kind,
                required,
                default,
            },
        ));
        self
    }

    /// Declared spec of a field
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, spec)| spec)
    }

    /// Validate `data` against the declared fields
    pub fn validate(&self, data: &Value, mode: Mode) -> Result<Validated, SchemaError> {
        let Value::Object(stored) = data else {
            return match mode {
                Mode::Strict => Err(SchemaError::NotAnObject),
                Mode::Lenient => Ok(self.defaults_only()),
            };
        };

        let mut record = stored.clone();
        let mut repaired = Vec::new();
        for (name, spec) in &self.fields {
            match stored.get(name) {
                None | Some(Value::Null) if spec.required => {
                    if mode == Mode::Strict {
                        return Err(SchemaError::MissingField(name.clone()));
                    }
                    warn!(field = %name, "required field missing or null, using default");
                    Self::substitute(&mut record, name, spec);
                    repaired.push(name.clone());
                }
                None | Some(Value::Null) => {
                    Self::substitute(&mut record, name, spec);
                }
                Some(value) => {
                    let actual = FieldType::of(value);
                    if actual != Some(spec.kind) {
                        let actual = actual.map_or("null", FieldType::name);
                        if mode == Mode::Strict {
                            return Err(SchemaError::TypeMismatch {
                                field: name.clone(),
                                expected: spec.kind.name(),
                                actual,
                            });
                        }
                        warn!(field = %name, expected = spec.kind.name(), actual, "field type mismatch, using default");
                        Self::substitute(&mut record, name, spec);
                        repaired.push(name.clone());
                    }
                }
            }
        }
        Ok(Validated { record, repaired })
    }

    fn substitute(record: &mut Map<String, Value>, name: &str, spec: &FieldSpec) {
        match &spec.default {
            Some(default) => {
                record.insert(name.to_string(), default.clone());
            }
            None => {
                record.remove(name);
            }
        }
    }

    fn defaults_only(&self) -> Validated {
        let mut record = Map::new();
        for (name, spec) in &self.fields {
            Self::substitute(&mut record, name, spec);
        }
        Validated {
            record,
            repaired: self.fields.iter().map(|(name, _)| name.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .field_or("actions", FieldType::Array, json!([]))
            .field_or("observations", FieldType::Array, json!([]))
            .field("move", FieldType::Number)
    }

    #[test]
    fn lenient_replaces_mistyped_field_and_keeps_the_rest() {
        let stored = json!({
            "actions": "oops",
            "observations": [{"id": 1}],
            "move": 2,
            "note": "kept"
        });
        let out = schema().validate(&stored, Mode::Lenient).unwrap();
        assert_eq!(out.record["actions"], json!([]));
        assert_eq!(out.record["observations"], json!([{"id": 1}]));
        assert_eq!(out.record["move"], json!(2));
        assert_eq!(out.record["note"], json!("kept"));
        assert_eq!(out.repaired, vec!["actions".to_string()]);
    }

    #[test]
    fn strict_refuses_mistyped_field() {
        let err = schema()
            .validate(&json!({"actions": "oops"}), Mode::Strict)
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::TypeMismatch {
                field: "actions".into(),
                expected: "array",
                actual: "string"
            }
        );
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let out = schema().validate(&json!({}), Mode::Strict).unwrap();
        assert_eq!(out.record["actions"], json!([]));
        assert!(!out.record.contains_key("move"));
        assert!(out.is_clean());
    }

    #[test]
    fn mistyped_field_without_default_is_dropped() {
        let out = schema().validate(&json!({"move": "two"}), Mode::Lenient).unwrap();
        assert!(!out.record.contains_key("move"));
    }

    #[test]
    fn required_fields() {
        let s = Schema::new().required("phase", FieldType::Number, Some(json!(1)));
        assert_eq!(
            s.validate(&json!({}), Mode::Strict).unwrap_err(),
            SchemaError::MissingField("phase".into())
        );
        let out = s.validate(&json!({}), Mode::Lenient).unwrap();
        assert_eq!(out.record["phase"], json!(1));
        assert!(!out.is_clean());
    }

    #[test]
    fn required_null_is_refused_strictly_and_repaired_leniently() {
        let s = Schema::new().required("phase", FieldType::Number, Some(json!(1)));
        assert_eq!(
            s.validate(&json!({"phase": null}), Mode::Strict).unwrap_err(),
            SchemaError::MissingField("phase".into())
        );
        let out = s.validate(&json!({"phase": null}), Mode::Lenient).unwrap();
        assert_eq!(out.record["phase"], json!(1));
        assert_eq!(out.repaired, vec!["phase".to_string()]);
    }

    #[test]
    fn non_object_records() {
        assert_eq!(
            schema().validate(&json!([1]), Mode::Strict).unwrap_err(),
            SchemaError::NotAnObject
        );
        let out = schema().validate(&json!("x"), Mode::Lenient).unwrap();
        assert_eq!(out.record["actions"], json!([]));
    }
}
