//! SQLite backend
//!
//! A single connection guarded by a mutex. Statements run on tokio's
//! blocking pool so the request worker is free while the engine works.
//!
//! SQLite has no `ALTER TABLE ... MODIFY COLUMN`; a Modify statement is
//! applied by rebuilding the table inside one transaction.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension, ToSql};
use serde_json::Value;

use super::errors::{StorageError, StorageResult};
use super::{Row, Storage};
use crate::schema::{create_table_sql, ColumnMeta, MigrationStatement, SqlValue};

/// Path that selects a private in-memory database
pub const MEMORY_PATH: &str = ":memory:";

/// `Storage` over an embedded SQLite database
#[derive(Clone)]
pub struct SqliteStorage {
    connection: Arc<Mutex<Option<Connection>>>,
}

/// A column as `pragma_table_info` reports it
#[derive(Debug, Clone)]
struct TableColumn {
    name: String,
    declared_type: String,
    not_null: bool,
    default: Option<String>,
    primary_key: bool,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`; `:memory:` opens a private
    /// in-memory database
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let connection = if path == Path::new(MEMORY_PATH) {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Ok(Self::from_connection(connection))
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(connection: Connection) -> Self {
        Self {
            connection: Arc::new(Mutex::new(Some(connection))),
        }
    }

    /// Run `work` against the connection on the blocking pool
    async fn run<T, F>(&self, work: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut guard = connection
                .lock()
                .map_err(|_| StorageError::Backend("sqlite connection mutex poisoned".into()))?;
            let conn = guard.as_mut().ok_or(StorageError::Closed)?;
            work(conn)
        })
        .await
        .map_err(|e| StorageError::Join(e.to_string()))?
    }
}

impl Storage for SqliteStorage {
    async fn describe_table(&self, table: &str) -> StorageResult<Option<Vec<ColumnMeta>>> {
        let table = table.to_string();
        self.run(move |conn| {
            let columns = table_info(conn, &table)?;
            if columns.is_empty() {
                return Ok(None);
            }
            Ok(Some(
                columns
                    .into_iter()
                    .map(|column| {
                        let (data_type, max_length) = split_declared_type(&column.declared_type);
                        ColumnMeta::new(column.name, data_type, max_length)
                    })
                    .collect(),
            ))
        })
        .await
    }

    async fn create_table(
        &self,
        table: &str,
        columns: &[ColumnMeta],
        timestamp_column: &str,
    ) -> StorageResult<()> {
        let sql = create_table_sql(table, columns, timestamp_column);
        self.run(move |conn| {
            conn.execute(&sql, [])?;
            Ok(())
        })
        .await
    }

    async fn apply_migration(&self, table: &str, statement: &MigrationStatement) -> StorageResult<()> {
        let table = table.to_string();
        let statement = statement.clone();
        self.run(move |conn| match &statement {
            MigrationStatement::Add { .. } | MigrationStatement::Drop { .. } => {
                conn.execute(&statement.to_sql(&table), [])?;
                Ok(())
            }
            MigrationStatement::Modify { .. } => match statement.target() {
                Some(target) => rebuild_with_column(conn, &table, &target),
                None => Ok(()),
            },
        })
        .await
    }

    async fn migration_sql(&self, table: &str, statement: &MigrationStatement) -> StorageResult<Vec<String>> {
        let table = table.to_string();
        let statement = statement.clone();
        self.run(move |conn| match &statement {
            MigrationStatement::Add { .. } | MigrationStatement::Drop { .. } => {
                Ok(vec![statement.to_sql(&table)])
            }
            MigrationStatement::Modify { .. } => match statement.target() {
                Some(target) => rebuild_statements(conn, &table, &target),
                None => Ok(Vec::new()),
            },
        })
        .await
    }

    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> StorageResult<Vec<Row>> {
        let sql = sql.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&sql)?;

            if stmt.column_count() == 0 {
                let affected = stmt.execute(params_from_iter(params.iter()))?;
                let mut row = Row::new();
                row.insert("affected_rows".into(), Value::from(affected));
                row.insert("last_insert_id".into(), Value::from(conn.last_insert_rowid()));
                return Ok(vec![row]);
            }

            let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = Row::new();
                for (index, name) in names.iter().enumerate() {
                    record.insert(name.clone(), value_to_json(row.get_ref(index)?));
                }
                out.push(record);
            }
            Ok(out)
        })
        .await
    }

    async fn close(&self) -> StorageResult<()> {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut guard = connection
                .lock()
                .map_err(|_| StorageError::Backend("sqlite connection mutex poisoned".into()))?;
            match guard.take() {
                Some(conn) => conn.close().map_err(|(_, e)| StorageError::from(e)),
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| StorageError::Join(e.to_string()))?
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            SqlValue::Bool(b) => ToSqlOutput::from(*b),
            SqlValue::Integer(i) => ToSqlOutput::from(*i),
            SqlValue::Real(r) => ToSqlOutput::from(*r),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(r) => serde_json::Number::from_f64(r)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Split `VARCHAR(64)` into `("VARCHAR", Some(64))`
fn split_declared_type(declared: &str) -> (String, Option<u32>) {
    match declared.split_once('(') {
        Some((base, rest)) => {
            let length = rest.trim_end_matches(')').trim().parse::<u32>().ok();
            (base.trim().to_string(), length)
        }
        None => (declared.trim().to_string(), None),
    }
}

fn table_info(conn: &Connection, table: &str) -> StorageResult<Vec<TableColumn>> {
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let columns = stmt
        .query_map([table], |row| {
            Ok(TableColumn {
                name: row.get(0)?,
                declared_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
                default: row.get(3)?,
                primary_key: row.get::<_, i64>(4)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Statements that recreate `table` with `target` replacing the column of
/// the same name. Indexes and triggers are dropped with the old table, so
/// their definitions are replayed after the rename.
fn rebuild_statements(conn: &Connection, table: &str, target: &ColumnMeta) -> StorageResult<Vec<String>> {
    let columns = table_info(conn, table)?;
    let table_sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    let autoincrement = table_sql
        .map(|sql| sql.to_uppercase().contains("AUTOINCREMENT"))
        .unwrap_or(false);

    let definitions: Vec<String> = columns
        .iter()
        .map(|column| {
            let mut definition = if column.name == target.name {
                format!("{} {}", column.name, target.type_sql())
            } else {
                format!("{} {}", column.name, column.declared_type)
            };
            if column.primary_key {
                definition.push_str(" PRIMARY KEY");
                if autoincrement {
                    definition.push_str(" AUTOINCREMENT");
                }
            }
            if column.not_null {
                definition.push_str(" NOT NULL");
            }
            if let Some(default) = &column.default {
                definition.push_str(&format!(" DEFAULT {}", default));
            }
            definition
        })
        .collect();
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let names = names.join(", ");
    let staging = format!("{}__reshape", table);

    let mut statements = vec![
        format!("CREATE TABLE {} ({})", staging, definitions.join(", ")),
        format!("INSERT INTO {} ({}) SELECT {} FROM {}", staging, names, names, table),
        format!("DROP TABLE {}", table),
        format!("ALTER TABLE {} RENAME TO {}", staging, table),
    ];
    statements.extend(dependent_objects(conn, table)?);
    Ok(statements)
}

/// `CREATE` statements of the indexes and triggers attached to `table`.
/// Automatic indexes have no SQL and come back with the table itself.
fn dependent_objects(conn: &Connection, table: &str) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT sql FROM sqlite_master \
         WHERE tbl_name = ?1 AND type IN ('index', 'trigger') AND sql IS NOT NULL \
         ORDER BY CASE type WHEN 'index' THEN 0 ELSE 1 END, rowid",
    )?;
    let sql = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sql)
}

/// Apply a rebuild in one transaction
fn rebuild_with_column(conn: &mut Connection, table: &str, target: &ColumnMeta) -> StorageResult<()> {
    let statements = rebuild_statements(conn, table, target)?;
    let tx = conn.transaction()?;
    for statement in &statements {
        tx.execute_batch(statement)?;
    }
    tx.commit()?;
    Ok(())
}
