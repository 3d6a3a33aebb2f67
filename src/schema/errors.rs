//! Schema error types
//!
//! Every variant here is raised at startup, before the gateway accepts
//! traffic, and aborts initialization. `InvalidValue` is the exception:
//! it comes from a type mapping's `parse` and surfaces per request when a
//! registry-backed preprocessor rejects its input.

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Base type name is not known to the registry
    #[error("Invalid field type: {0}")]
    TypeResolution(String),

    /// `base(N)` descriptor whose `N` is not an integer
    #[error("Invalid length in field type '{descriptor}': '{length}' is not an integer")]
    InvalidLength { descriptor: String, length: String },

    /// Field name collides with a reserved column
    #[error("Invalid field name: {0} is reserved")]
    ReservedName(String),

    /// Two fields share one name
    #[error("Duplicate field name: {0}")]
    DuplicateName(String),

    /// Name cannot be used verbatim as a SQL identifier
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Raw value could not be converted by a type mapping
    #[error("Cannot parse '{value}' as {storage_type}")]
    InvalidValue { storage_type: String, value: String },

    /// A built-in pattern failed to compile
    #[error("Invalid pattern: {0}")]
    Pattern(String),

    /// Storage rejected a DDL statement
    #[error("Schema migration failed on `{statement}`: {message}")]
    Migration { statement: String, message: String },
}

impl SchemaError {
    /// Stable error code for logs
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::TypeResolution(_) | SchemaError::InvalidLength { .. } => {
                "GATE_TYPE_RESOLUTION"
            }
            SchemaError::ReservedName(_)
            | SchemaError::DuplicateName(_)
            | SchemaError::InvalidIdentifier(_) => "GATE_INVALID_FIELD_SPEC",
            SchemaError::InvalidValue { .. } => "GATE_INVALID_VALUE",
            SchemaError::Pattern(_) => "GATE_PATTERN",
            SchemaError::Migration { .. } => "GATE_SCHEMA_MIGRATION",
        }
    }

    /// Whether this error must abort startup
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SchemaError::InvalidValue { .. })
    }
}
