//! Field, value and column definitions
//!
//! A `FieldSpec` is what the operator writes in configuration. A
//! `ColumnMeta` is what the live storage engine reports back. `SqlValue`
//! is the typed value handed to storage as a bind parameter.

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::errors::{SchemaError, SchemaResult};
use super::registry::{self, TypeMapping};

/// Column names no field may use, besides the timestamp column
pub const RESERVED_FIELD_NAMES: &[&str] = &["id"];

/// Type of a field: a registry descriptor or a pre-built mapping
#[derive(Clone)]
pub enum TypeSpec {
    /// Descriptor such as `"number"` or `"string(64)"`
    Named(String),
    /// Mapping supplied directly by the embedding program
    Explicit(TypeMapping),
}

impl TypeSpec {
    /// Resolve into a storage mapping
    pub fn resolve(&self) -> SchemaResult<TypeMapping> {
        match self {
            TypeSpec::Named(descriptor) => registry::resolve(descriptor),
            TypeSpec::Explicit(mapping) => Ok(mapping.clone()),
        }
    }
}

impl fmt::Debug for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Named(descriptor) => f.debug_tuple("Named").field(descriptor).finish(),
            TypeSpec::Explicit(mapping) => f.debug_tuple("Explicit").field(mapping).finish(),
        }
    }
}

impl<'de> Deserialize<'de> for TypeSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(TypeSpec::Named)
    }
}

/// One configured field of the managed record
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    /// Column name
    pub name: String,
    /// Field type
    #[serde(rename = "type")]
    pub type_spec: TypeSpec,
}

impl FieldSpec {
    /// Field typed by a registry descriptor
    pub fn named(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_spec: TypeSpec::Named(descriptor.into()),
        }
    }

    /// Field typed by an explicit mapping
    pub fn explicit(name: impl Into<String>, mapping: TypeMapping) -> Self {
        Self {
            name: name.into(),
            type_spec: TypeSpec::Explicit(mapping),
        }
    }
}

/// A column as reported by the live storage engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: String,
    pub max_length: Option<u32>,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, max_length: Option<u32>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            max_length,
        }
    }

    /// The column a mapping produces once applied
    pub fn from_mapping(name: impl Into<String>, mapping: &TypeMapping) -> Self {
        Self::new(name, mapping.storage_type(), mapping.length())
    }

    /// Column type as written in DDL, e.g. `VARCHAR(64)`
    pub fn type_sql(&self) -> String {
        match self.max_length {
            Some(length) => format!("{}({})", self.data_type, length),
            None => self.data_type.clone(),
        }
    }
}

/// Typed bind parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// JSON view of the value, as a client would send it back
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Integer(i) => Value::from(*i),
            SqlValue::Real(r) => serde_json::Number::from_f64(*r)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
}

/// Whether `name` can be spliced into SQL text unquoted. Without a pattern
/// nothing is safe.
pub fn is_safe_identifier(name: &str) -> bool {
    identifier_pattern().is_some_and(|pattern| pattern.is_match(name))
}

/// Check a field list before it reaches storage.
///
/// Names must be unique, safe identifiers, and must not shadow `id` or the
/// timestamp column; every type must resolve. Returns the resolved mappings
/// in field order.
pub fn validate_fields(fields: &[FieldSpec], timestamp_column: &str) -> SchemaResult<Vec<TypeMapping>> {
    let mut seen = HashSet::new();
    let mut mappings = Vec::with_capacity(fields.len());

    for field in fields {
        if RESERVED_FIELD_NAMES.contains(&field.name.as_str()) || field.name == timestamp_column {
            return Err(SchemaError::ReservedName(field.name.clone()));
        }
        if !is_safe_identifier(&field.name) {
            return Err(SchemaError::InvalidIdentifier(field.name.clone()));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateName(field.name.clone()));
        }
        mappings.push(field.type_spec.resolve()?);
    }

    Ok(mappings)
}
