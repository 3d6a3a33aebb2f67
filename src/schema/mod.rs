//! Schema subsystem for tablegate
//!
//! The managed table is derived from a declarative field list. This module
//! owns that derivation:
//!
//! - `registry`: type descriptor to storage type, validation and parsing
//! - `reconciler`: minimal Add/Modify/Drop statements against a live table
//! - `types`: field specs, reported columns, typed values
//!
//! # Invariants
//!
//! - Field names are unique and never shadow `id` or the timestamp column
//! - Every field type resolves, or startup fails
//! - Reconciling a table that already matches yields no statements

mod errors;
pub mod reconciler;
pub mod registry;
mod types;

pub use errors::{SchemaError, SchemaResult};
pub use reconciler::{
    columns_after_applying, compute_migration, create_table_sql, MigrationStatement,
};
pub use registry::{resolve, FieldKind, TypeMapping};
pub use types::{
    is_safe_identifier, validate_fields, ColumnMeta, FieldSpec, SqlValue, TypeSpec,
    RESERVED_FIELD_NAMES,
};
