//! Startup schema reconciliation
//!
//! Runs before the listener binds and is awaited statement by statement.
//! A missing table is created; an existing one is diffed against the field
//! list and the resulting statements are applied in order. The first
//! statement the engine rejects aborts startup.

use std::collections::HashSet;
use std::fmt;

use crate::observability::{log_event, Event, Logger, MetricsRegistry};
use crate::schema::{
    columns_after_applying, compute_migration, create_table_sql, validate_fields, ColumnMeta,
    FieldSpec, MigrationStatement, SchemaError, RESERVED_FIELD_NAMES,
};
use crate::storage::Storage;

use super::errors::StartupResult;

/// Where the managed table lives and what it should look like
#[derive(Debug, Clone, Copy)]
pub struct TableTarget<'a> {
    pub table: &'a str,
    pub timestamp_column: &'a str,
    pub fields: &'a [FieldSpec],
}

/// What reconciliation found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaPlan {
    /// Table is absent and will be created with these columns
    Create(Vec<ColumnMeta>),
    /// Table exists and differs
    Migrate(Vec<MigrationStatement>),
    /// Table exists and matches
    InSync,
}

impl SchemaPlan {
    /// SQL the engine would run for this plan, in order. Statements the
    /// engine emulates are expanded the way `apply_migration` runs them.
    pub async fn sql<S: Storage>(&self, storage: &S, target: &TableTarget<'_>) -> StartupResult<Vec<String>> {
        match self {
            SchemaPlan::Create(columns) => {
                Ok(vec![create_table_sql(target.table, columns, target.timestamp_column)])
            }
            SchemaPlan::Migrate(statements) => {
                let mut sql = Vec::new();
                for statement in statements {
                    sql.extend(storage.migration_sql(target.table, statement).await?);
                }
                Ok(sql)
            }
            SchemaPlan::InSync => Ok(Vec::new()),
        }
    }
}

impl fmt::Display for SchemaPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaPlan::Create(columns) => write!(f, "create ({} columns)", columns.len()),
            SchemaPlan::Migrate(statements) => write!(f, "migrate ({} statements)", statements.len()),
            SchemaPlan::InSync => f.write_str("in sync"),
        }
    }
}

fn preserved_names() -> HashSet<String> {
    RESERVED_FIELD_NAMES.iter().map(|name| name.to_string()).collect()
}

/// Compute the plan without changing anything
pub async fn plan_schema<S: Storage>(storage: &S, target: &TableTarget<'_>) -> StartupResult<SchemaPlan> {
    validate_fields(target.fields, target.timestamp_column)?;

    let Some(actual) = storage.describe_table(target.table).await? else {
        return Ok(SchemaPlan::Create(columns_after_applying(target.fields)?));
    };

    let statements = compute_migration(
        target.fields,
        &actual,
        &preserved_names(),
        target.timestamp_column,
    )?;

    if statements.is_empty() {
        Ok(SchemaPlan::InSync)
    } else {
        Ok(SchemaPlan::Migrate(statements))
    }
}

/// Bring the table in line with the field list.
///
/// With `allow_alter` false an existing table is left untouched and any
/// drift is only reported.
pub async fn reconcile<S: Storage>(
    storage: &S,
    target: &TableTarget<'_>,
    allow_alter: bool,
    metrics: &MetricsRegistry,
) -> StartupResult<SchemaPlan> {
    let plan = plan_schema(storage, target).await?;

    match &plan {
        SchemaPlan::Create(columns) => {
            let sql = create_table_sql(target.table, columns, target.timestamp_column);
            storage
                .create_table(target.table, columns, target.timestamp_column)
                .await
                .map_err(|e| migration_failed(sql.clone(), e.to_string()))?;
            log_event(
                Event::SchemaTableCreated,
                &[("statement", sql.as_str()), ("table", target.table)],
            );
        }
        SchemaPlan::Migrate(statements) if !allow_alter => {
            for statement in statements {
                Logger::warn(
                    Event::SchemaDriftIgnored.as_str(),
                    &[
                        ("statement", statement.to_sql(target.table).as_str()),
                        ("table", target.table),
                    ],
                );
            }
        }
        SchemaPlan::Migrate(statements) => {
            for statement in statements {
                let sql = statement.to_sql(target.table);
                storage
                    .apply_migration(target.table, statement)
                    .await
                    .map_err(|e| migration_failed(sql.clone(), e.to_string()))?;
                metrics.increment_migrations_applied();
                log_event(
                    Event::SchemaMigrationApplied,
                    &[("statement", sql.as_str()), ("table", target.table)],
                );
            }
        }
        SchemaPlan::InSync => {
            log_event(Event::SchemaInSync, &[("table", target.table)]);
        }
    }

    Ok(plan)
}

fn migration_failed(statement: String, message: String) -> SchemaError {
    log_event(
        Event::SchemaMigrationFailed,
        &[("message", message.as_str()), ("statement", statement.as_str())],
    );
    SchemaError::Migration { statement, message }
}
