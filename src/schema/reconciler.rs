//! Schema reconciliation
//!
//! Diffs the configured field list against the columns the storage engine
//! reports and produces the statements that bring the table in line.
//! Columns are always paired by name; field order and column order are
//! independent.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use super::errors::SchemaResult;
use super::types::{ColumnMeta, FieldSpec};

/// One corrective DDL action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum MigrationStatement {
    Add {
        name: String,
        storage_type: String,
        length: Option<u32>,
    },
    Modify {
        name: String,
        storage_type: String,
        length: Option<u32>,
    },
    Drop {
        name: String,
    },
}

impl MigrationStatement {
    /// Column the statement touches
    pub fn column(&self) -> &str {
        match self {
            MigrationStatement::Add { name, .. }
            | MigrationStatement::Modify { name, .. }
            | MigrationStatement::Drop { name } => name,
        }
    }

    /// Target column definition, for Add and Modify
    pub fn target(&self) -> Option<ColumnMeta> {
        match self {
            MigrationStatement::Add {
                name,
                storage_type,
                length,
            }
            | MigrationStatement::Modify {
                name,
                storage_type,
                length,
            } => Some(ColumnMeta::new(name.clone(), storage_type.clone(), *length)),
            MigrationStatement::Drop { .. } => None,
        }
    }

    /// DDL verb
    pub fn verb(&self) -> &'static str {
        match self {
            MigrationStatement::Add { .. } => "ADD",
            MigrationStatement::Modify { .. } => "MODIFY",
            MigrationStatement::Drop { .. } => "DROP",
        }
    }

    /// Render as an `ALTER TABLE` statement against `table`
    pub fn to_sql(&self, table: &str) -> String {
        format!("ALTER TABLE {} {} COLUMN {}", table, self.verb(), self.definition())
    }

    fn definition(&self) -> String {
        match self.target() {
            Some(target) => format!("{} {}", target.name, target.type_sql()),
            None => self.column().to_string(),
        }
    }
}

impl fmt::Display for MigrationStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb(), self.definition())
    }
}

/// Compute the statements that turn `actual` into `desired`.
///
/// Add/Modify statements for fields come first, in field order, followed
/// by Drop statements in reported column order. Columns named in
/// `preserved` and the timestamp column are never dropped. An unresolvable
/// field type aborts the whole pass.
pub fn compute_migration(
    desired: &[FieldSpec],
    actual: &[ColumnMeta],
    preserved: &HashSet<String>,
    timestamp_column: &str,
) -> SchemaResult<Vec<MigrationStatement>> {
    let mut statements = Vec::new();

    for field in desired {
        let mapping = field.type_spec.resolve()?;
        let storage_type = mapping.storage_type().to_string();
        let length = mapping.length();

        match actual.iter().find(|column| column.name == field.name) {
            None => statements.push(MigrationStatement::Add {
                name: field.name.clone(),
                storage_type,
                length,
            }),
            Some(column) => {
                let same_type = column.data_type.eq_ignore_ascii_case(&storage_type);
                if !same_type || column.max_length != length {
                    statements.push(MigrationStatement::Modify {
                        name: field.name.clone(),
                        storage_type,
                        length,
                    });
                }
            }
        }
    }

    for column in actual {
        if preserved.contains(&column.name) || column.name == timestamp_column {
            continue;
        }
        if !desired.iter().any(|field| field.name == column.name) {
            statements.push(MigrationStatement::Drop {
                name: column.name.clone(),
            });
        }
    }

    Ok(statements)
}

/// DDL creating `table` with an auto-increment `id`, `columns`, and a
/// timestamp column defaulting to the insertion time
pub fn create_table_sql(table: &str, columns: &[ColumnMeta], timestamp_column: &str) -> String {
    let mut sql = format!("CREATE TABLE {} (id INTEGER PRIMARY KEY AUTOINCREMENT", table);
    for column in columns {
        sql.push_str(&format!(", {} {}", column.name, column.type_sql()));
    }
    sql.push_str(&format!(
        ", {} TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
        timestamp_column
    ));
    sql
}

/// Columns a table holds once `desired` has been applied, in field order
pub fn columns_after_applying(desired: &[FieldSpec]) -> SchemaResult<Vec<ColumnMeta>> {
    desired
        .iter()
        .map(|field| Ok(ColumnMeta::from_mapping(field.name.clone(), &field.type_spec.resolve()?)))
        .collect()
}
