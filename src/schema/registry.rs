//! Field type registry
//!
//! Resolves a type descriptor (`"number"`, `"string(64)"`) into the storage
//! type a column is created with, plus the rules used to validate and
//! convert raw request values for that type.
//!
//! Supported base types:
//! - `string`: `VARCHAR`, default length 255
//! - `number`: `DOUBLE`
//! - `boolean`: `BOOLEAN`
//! - `float`: `FLOAT`
//! - `integer`: `INT`
//! - `date`: `DATETIME`
//! - `decimal`: `DECIMAL`

use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;

use super::errors::{SchemaError, SchemaResult};
use super::types::SqlValue;

/// Canonical rendering of parsed dates
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Built-in field kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    Float,
    Integer,
    Date,
    Decimal,
}

impl FieldKind {
    /// Every built-in kind, in registry order
    pub const ALL: [FieldKind; 7] = [
        FieldKind::Text,
        FieldKind::Number,
        FieldKind::Boolean,
        FieldKind::Float,
        FieldKind::Integer,
        FieldKind::Date,
        FieldKind::Decimal,
    ];

    /// Look up a base type name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(FieldKind::Text),
            "number" => Some(FieldKind::Number),
            "boolean" => Some(FieldKind::Boolean),
            "float" => Some(FieldKind::Float),
            "integer" => Some(FieldKind::Integer),
            "date" => Some(FieldKind::Date),
            "decimal" => Some(FieldKind::Decimal),
            _ => None,
        }
    }

    /// Descriptor name
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Float => "float",
            FieldKind::Integer => "integer",
            FieldKind::Date => "date",
            FieldKind::Decimal => "decimal",
        }
    }

    pub fn storage_type(&self) -> &'static str {
        match self {
            FieldKind::Text => "VARCHAR",
            FieldKind::Number => "DOUBLE",
            FieldKind::Boolean => "BOOLEAN",
            FieldKind::Float => "FLOAT",
            FieldKind::Integer => "INT",
            FieldKind::Date => "DATETIME",
            FieldKind::Decimal => "DECIMAL",
        }
    }

    pub fn default_length(&self) -> Option<u32> {
        match self {
            FieldKind::Text => Some(255),
            _ => None,
        }
    }

    /// Whether a raw value belongs to this kind
    pub fn validate(&self, value: &Value) -> bool {
        match self {
            FieldKind::Text => value.is_string(),
            FieldKind::Number | FieldKind::Decimal => parse_real(value).is_some(),
            FieldKind::Float => parse_single(value).is_some(),
            FieldKind::Integer => parse_integer(value).is_some(),
            FieldKind::Boolean => parse_bool(value).is_some(),
            FieldKind::Date => parse_datetime(value).is_some(),
        }
    }

    /// Convert a raw value into its typed form
    pub fn parse(&self, value: &Value) -> SchemaResult<SqlValue> {
        let parsed = match self {
            FieldKind::Text => Some(match value {
                Value::String(s) => SqlValue::Text(s.clone()),
                other => SqlValue::Text(other.to_string()),
            }),
            FieldKind::Number | FieldKind::Decimal => parse_real(value).map(SqlValue::Real),
            FieldKind::Float => parse_single(value).map(|r| SqlValue::Real(f64::from(r))),
            FieldKind::Integer => parse_integer(value).map(SqlValue::Integer),
            FieldKind::Boolean => parse_bool(value).map(SqlValue::Bool),
            FieldKind::Date => parse_datetime(value)
                .map(|dt| SqlValue::Text(dt.format(DATETIME_FORMAT).to_string())),
        };

        parsed.ok_or_else(|| SchemaError::InvalidValue {
            storage_type: self.storage_type().to_string(),
            value: match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        })
    }
}

fn parse_real(value: &Value) -> Option<f64> {
    let real = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    real.is_finite().then_some(real)
}

/// Single precision; values that overflow `f32` are out of domain
fn parse_single(value: &Value) -> Option<f32> {
    let single = parse_real(value)? as f32;
    single.is_finite().then_some(single)
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s == "true" => Some(true),
        Value::String(s) if s == "false" => Some(false),
        _ => None,
    }
}

fn parse_datetime(value: &Value) -> Option<NaiveDateTime> {
    let raw = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Custom validation hook for explicit mappings
pub type ValidateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Custom conversion hook for explicit mappings
pub type ParseFn = Arc<dyn Fn(&Value) -> SchemaResult<SqlValue> + Send + Sync>;

#[derive(Clone)]
enum Behavior {
    Builtin(FieldKind),
    Custom { validate: ValidateFn, parse: ParseFn },
}

/// Storage type of a field plus its value rules
#[derive(Clone)]
pub struct TypeMapping {
    storage_type: String,
    length: Option<u32>,
    behavior: Behavior,
}

impl TypeMapping {
    /// Mapping of a built-in kind with its default length
    pub fn builtin(kind: FieldKind) -> Self {
        Self {
            storage_type: kind.storage_type().to_string(),
            length: kind.default_length(),
            behavior: Behavior::Builtin(kind),
        }
    }

    /// Mapping with caller-provided rules
    pub fn custom<V, P>(storage_type: impl Into<String>, length: Option<u32>, validate: V, parse: P) -> Self
    where
        V: Fn(&Value) -> bool + Send + Sync + 'static,
        P: Fn(&Value) -> SchemaResult<SqlValue> + Send + Sync + 'static,
    {
        Self {
            storage_type: storage_type.into(),
            length,
            behavior: Behavior::Custom {
                validate: Arc::new(validate),
                parse: Arc::new(parse),
            },
        }
    }

    /// Same mapping with a different length
    pub fn with_length(mut self, length: Option<u32>) -> Self {
        self.length = length;
        self
    }

    pub fn storage_type(&self) -> &str {
        &self.storage_type
    }

    pub fn length(&self) -> Option<u32> {
        self.length
    }

    /// Built-in kind, if this mapping came from the registry
    pub fn kind(&self) -> Option<FieldKind> {
        match &self.behavior {
            Behavior::Builtin(kind) => Some(*kind),
            Behavior::Custom { .. } => None,
        }
    }

    pub fn validate(&self, value: &Value) -> bool {
        match &self.behavior {
            Behavior::Builtin(kind) => kind.validate(value),
            Behavior::Custom { validate, .. } => validate(value),
        }
    }

    pub fn parse(&self, value: &Value) -> SchemaResult<SqlValue> {
        match &self.behavior {
            Behavior::Builtin(kind) => kind.parse(value),
            Behavior::Custom { parse, .. } => parse(value),
        }
    }

    /// Validate a raw request string
    pub fn validate_str(&self, raw: &str) -> bool {
        self.validate(&Value::String(raw.to_string()))
    }

    /// Parse a raw request string
    pub fn parse_str(&self, raw: &str) -> SchemaResult<SqlValue> {
        self.parse(&Value::String(raw.to_string()))
    }
}

impl fmt::Debug for TypeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMapping")
            .field("storage_type", &self.storage_type)
            .field("length", &self.length)
            .field("kind", &self.kind())
            .finish()
    }
}

fn descriptor_pattern() -> SchemaResult<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(.*?)\((.*?)\)$"))
        .as_ref()
        .map_err(|e| SchemaError::Pattern(e.to_string()))
}

/// Resolve a type descriptor.
///
/// `base(N)` overrides the default length of `base`; `N` must be an integer.
pub fn resolve(descriptor: &str) -> SchemaResult<TypeMapping> {
    let descriptor = descriptor.trim();

    if let Some(captures) = descriptor_pattern()?.captures(descriptor) {
        let base = captures.get(1).map_or("", |m| m.as_str()).trim();
        let raw_length = captures.get(2).map_or("", |m| m.as_str()).trim();

        let kind = FieldKind::from_name(base)
            .ok_or_else(|| SchemaError::TypeResolution(descriptor.to_string()))?;
        let length = raw_length
            .parse::<u32>()
            .map_err(|_| SchemaError::InvalidLength {
                descriptor: descriptor.to_string(),
                length: raw_length.to_string(),
            })?;

        return Ok(TypeMapping::builtin(kind).with_length(Some(length)));
    }

    FieldKind::from_name(descriptor)
        .map(TypeMapping::builtin)
        .ok_or_else(|| SchemaError::TypeResolution(descriptor.to_string()))
}
