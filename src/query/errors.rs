//! Query error types
//!
//! `TemplateError` is raised while compiling a configured query and is
//! fatal to startup. `BindError` is raised per request and aborts only
//! that request.

use thiserror::Error;

/// Result type for query compilation
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Result type for parameter binding
pub type BindResult<T> = Result<T, BindError>;

/// Compile-time template defects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// `{fields[i]}` with `i` past the end of the field list
    #[error("Query '{query}': {{fields[{index}]}} is out of range ({count} fields configured)")]
    FieldIndexOutOfRange {
        query: String,
        index: usize,
        count: usize,
    },

    /// `{fields[...]}` whose index is not a number
    #[error("Query '{query}': malformed field reference {{{token}}}")]
    MalformedFieldReference { query: String, token: String },

    /// `{}` with nothing inside
    #[error("Query '{query}': empty placeholder {{}}")]
    EmptyPlaceholder { query: String },

    /// A brace left over after every token was resolved
    #[error("Query '{query}': unbalanced brace in template")]
    UnbalancedBrace { query: String },

    /// The placeholder pattern failed to compile
    #[error("Query '{query}': invalid placeholder pattern: {message}")]
    Pattern { query: String, message: String },

    /// Declarative validator, preprocessor or serializer that cannot be built
    #[error("Query '{query}': {message}")]
    InvalidHook { query: String, message: String },
}

impl TemplateError {
    /// Name of the query that failed to compile
    pub fn query(&self) -> &str {
        match self {
            TemplateError::FieldIndexOutOfRange { query, .. }
            | TemplateError::MalformedFieldReference { query, .. }
            | TemplateError::EmptyPlaceholder { query }
            | TemplateError::UnbalancedBrace { query }
            | TemplateError::Pattern { query, .. }
            | TemplateError::InvalidHook { query, .. } => query,
        }
    }
}

/// Per-request binding failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// Bind variable absent or empty in the request
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Validator refused the raw value
    #[error("Invalid field value: {0}")]
    InvalidField(String),

    /// Preprocessor failed to transform the raw value
    #[error("{message}")]
    Preprocess { field: String, message: String },
}

impl BindError {
    /// Field that caused the failure
    pub fn field(&self) -> &str {
        match self {
            BindError::MissingField(field) | BindError::InvalidField(field) => field,
            BindError::Preprocess { field, .. } => field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_messages() {
        assert_eq!(
            BindError::MissingField("temp".into()).to_string(),
            "Missing field: temp"
        );
        assert_eq!(
            BindError::InvalidField("temp".into()).to_string(),
            "Invalid field value: temp"
        );
        assert_eq!(BindError::InvalidField("temp".into()).field(), "temp");
    }

    #[test]
    fn test_template_error_names_query() {
        let err = TemplateError::FieldIndexOutOfRange {
            query: "latest".into(),
            index: 4,
            count: 2,
        };
        assert_eq!(err.query(), "latest");
        assert_eq!(
            err.to_string(),
            "Query 'latest': {fields[4]} is out of range (2 fields configured)"
        );
    }
}
