//! Query definitions
//!
//! A definition is the operator's view of a query: the raw template plus
//! optional per-field validators and preprocessors and an optional result
//! serializer. Definitions come from configuration (`QuerySpec`, where hooks
//! are named declaratively) or from code (closures via the builder methods).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::errors::{TemplateError, TemplateResult};
use crate::schema::{self, SqlValue};
use crate::storage::Row;

/// Accepts or refuses a raw request value
pub type Validator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Turns a raw request value into the bound parameter
pub type Preprocessor = Arc<dyn Fn(&str) -> Result<SqlValue, String> + Send + Sync>;

/// Shapes result rows into the response payload
pub type Serializer = Arc<dyn Fn(Vec<Row>) -> Value + Send + Sync>;

/// A query as written in the configuration file.
///
/// Either a bare template string or an object whose `validators` and
/// `preprocessor` map request fields to registry type descriptors.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QuerySpec {
    Template(String),
    Detailed {
        query: String,
        #[serde(default)]
        validators: BTreeMap<String, String>,
        #[serde(default)]
        preprocessor: BTreeMap<String, String>,
        #[serde(default)]
        serializer: Option<String>,
    },
}

/// Built-in result serializers selectable from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerializerKind {
    /// Rows unchanged
    Rows,
    /// First row, or null
    First,
    /// Number of rows
    Count,
    /// Values of one column
    Column(String),
}

impl SerializerKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "rows" => Some(SerializerKind::Rows),
            "first" => Some(SerializerKind::First),
            "count" => Some(SerializerKind::Count),
            other => other
                .strip_prefix("column:")
                .filter(|column| !column.is_empty())
                .map(|column| SerializerKind::Column(column.to_string())),
        }
    }

    pub fn into_serializer(self) -> Serializer {
        match self {
            SerializerKind::Rows => {
                Arc::new(|rows: Vec<Row>| Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            SerializerKind::First => Arc::new(|rows: Vec<Row>| {
                rows.into_iter().next().map(Value::Object).unwrap_or(Value::Null)
            }),
            SerializerKind::Count => Arc::new(|rows: Vec<Row>| Value::from(rows.len())),
            SerializerKind::Column(column) => Arc::new(move |rows: Vec<Row>| {
                Value::Array(
                    rows.into_iter()
                        .map(|mut row| row.remove(&column).unwrap_or(Value::Null))
                        .collect(),
                )
            }),
        }
    }
}

/// A user-authored query
#[derive(Clone)]
pub struct QueryDefinition {
    pub template: String,
    pub(crate) validators: HashMap<String, Validator>,
    pub(crate) preprocessor: HashMap<String, Preprocessor>,
    pub(crate) serializer: Option<Serializer>,
}

impl QueryDefinition {
    /// Definition with no hooks
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            validators: HashMap::new(),
            preprocessor: HashMap::new(),
            serializer: None,
        }
    }

    pub fn with_validator<F>(mut self, field: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.validators.insert(field.into(), Arc::new(validator));
        self
    }

    pub fn with_preprocessor<F>(mut self, field: impl Into<String>, preprocessor: F) -> Self
    where
        F: Fn(&str) -> Result<SqlValue, String> + Send + Sync + 'static,
    {
        self.preprocessor.insert(field.into(), Arc::new(preprocessor));
        self
    }

    pub fn with_serializer<F>(mut self, serializer: F) -> Self
    where
        F: Fn(Vec<Row>) -> Value + Send + Sync + 'static,
    {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    /// Build a definition from configuration, resolving every declarative
    /// hook through the type registry
    pub fn from_spec(name: &str, spec: &QuerySpec) -> TemplateResult<Self> {
        let (template, validators, preprocessor, serializer) = match spec {
            QuerySpec::Template(template) => return Ok(Self::new(template.clone())),
            QuerySpec::Detailed {
                query,
                validators,
                preprocessor,
                serializer,
            } => (query, validators, preprocessor, serializer),
        };

        let hook_error = |message: String| TemplateError::InvalidHook {
            query: name.to_string(),
            message,
        };

        let mut definition = Self::new(template.clone());

        for (field, descriptor) in validators {
            let mapping = schema::resolve(descriptor)
                .map_err(|e| hook_error(format!("validator for '{}': {}", field, e)))?;
            definition = definition.with_validator(field.clone(), move |raw| mapping.validate_str(raw));
        }

        for (field, descriptor) in preprocessor {
            let mapping = schema::resolve(descriptor)
                .map_err(|e| hook_error(format!("preprocessor for '{}': {}", field, e)))?;
            definition = definition.with_preprocessor(field.clone(), move |raw| {
                mapping.parse_str(raw).map_err(|e| e.to_string())
            });
        }

        if let Some(name) = serializer {
            let kind = SerializerKind::parse(name)
                .ok_or_else(|| hook_error(format!("unknown serializer '{}'", name)))?;
            definition.serializer = Some(kind.into_serializer());
        }

        Ok(definition)
    }
}

impl fmt::Debug for QueryDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut validators: Vec<&String> = self.validators.keys().collect();
        validators.sort();
        let mut preprocessor: Vec<&String> = self.preprocessor.keys().collect();
        preprocessor.sort();
        f.debug_struct("QueryDefinition")
            .field("template", &self.template)
            .field("validators", &validators)
            .field("preprocessor", &preprocessor)
            .field("serializer", &self.serializer.is_some())
            .finish()
    }
}
