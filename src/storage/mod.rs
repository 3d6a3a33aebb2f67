//! Storage subsystem for tablegate
//!
//! The gateway needs very little from its relational engine: describe a
//! table, create it, apply one migration statement, and run one
//! parameterized statement. `Storage` captures exactly that surface so the
//! schema and query layers never see a driver type.
//!
//! Every call is asynchronous. Once issued, a call runs to completion or
//! failure; there is no cancellation and no per-statement timeout.

mod errors;
mod sqlite;

pub use errors::{StorageError, StorageResult};
pub use sqlite::SqliteStorage;

use std::future::Future;

use serde_json::{Map, Value};

use crate::schema::{ColumnMeta, MigrationStatement, SqlValue};

/// One result row, keyed by column name
pub type Row = Map<String, Value>;

/// Relational engine capability used by the gateway
pub trait Storage: Send + Sync + 'static {
    /// Columns of `table` in engine order, or `None` when it does not exist
    fn describe_table(
        &self,
        table: &str,
    ) -> impl Future<Output = StorageResult<Option<Vec<ColumnMeta>>>> + Send;

    /// Create `table` with an auto-increment `id`, the given columns, and a
    /// timestamp column defaulting to the insertion time
    fn create_table(
        &self,
        table: &str,
        columns: &[ColumnMeta],
        timestamp_column: &str,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    /// Apply a single migration statement to `table`
    fn apply_migration(
        &self,
        table: &str,
        statement: &MigrationStatement,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    /// The SQL `apply_migration` runs for `statement`, in order, without
    /// running it
    fn migration_sql(
        &self,
        table: &str,
        statement: &MigrationStatement,
    ) -> impl Future<Output = StorageResult<Vec<String>>> + Send;

    /// Run one statement with positional parameters
    fn query(
        &self,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> impl Future<Output = StorageResult<Vec<Row>>> + Send;

    /// Release the connection; later calls fail with `StorageError::Closed`
    fn close(&self) -> impl Future<Output = StorageResult<()>> + Send;
}
