//! SQLite driver
//!
//! rusqlite is blocking, so every call runs on tokio's blocking pool with the connection
//! behind an `Arc<Mutex<_>>`. A cursor keeps one blocking task alive that steps the
//! statement and hands rows over a bounded channel; dropping the cursor closes the channel,
//! which ends the task and finalizes the statement.

use crate::core::{
    database::{BoundParams, ConnectConfig, Connector, Cursor, DriverRows, ExecOutcome, Session},
    database_types::DatabaseType,
    error::{DatabaseError, Result},
    value::DatabaseValue,
};
use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, Row, Statement};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};

/// Rows buffered ahead of the consumer by a cursor
const CURSOR_BUFFER: usize = 64;

/// Opens SQLite sessions; `ConnectConfig::database` is the file path (`:memory:` when empty)
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

/// One open SQLite database
pub struct SqliteSession {
    connection: Arc<Mutex<Connection>>,
}

fn join_error(e: tokio::task::JoinError) -> DatabaseError {
    DatabaseError::other(format!("Task join error: {}", e))
}

fn to_sqlite(value: &DatabaseValue) -> Value {
    match value {
        DatabaseValue::Null => Value::Null,
        DatabaseValue::Bool(v) => Value::Integer(i64::from(*v)),
        DatabaseValue::Int(v) => Value::Integer(i64::from(*v)),
        DatabaseValue::Long(v) => Value::Integer(*v),
        DatabaseValue::Float(v) => Value::Real(f64::from(*v)),
        DatabaseValue::Double(v) => Value::Real(*v),
        DatabaseValue::String(v) => Value::Text(v.clone()),
        DatabaseValue::Bytes(v) => Value::Blob(v.clone()),
        DatabaseValue::Timestamp(v) => Value::Integer(*v),
    }
}

fn read_row(row: &Row<'_>, width: usize) -> Result<Vec<DatabaseValue>> {
    (0..width)
        .map(|i| {
            Ok(match row.get_ref(i)? {
                ValueRef::Null => DatabaseValue::Null,
                ValueRef::Integer(v) => DatabaseValue::Long(v),
                ValueRef::Real(v) => DatabaseValue::Double(v),
                ValueRef::Text(v) => DatabaseValue::String(String::from_utf8_lossy(v).to_string()),
                ValueRef::Blob(v) => DatabaseValue::Bytes(v.to_vec()),
            })
        })
        .collect()
}

fn bind_params(stmt: &mut Statement<'_>, params: &BoundParams) -> Result<()> {
    match params {
        BoundParams::Positional(values) => {
            if values.len() != stmt.parameter_count() {
                return Err(
                    rusqlite::Error::InvalidParameterCount(values.len(), stmt.parameter_count())
                        .into(),
                );
            }
            for (index, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(index + 1, to_sqlite(value))?;
            }
        }
        BoundParams::Named(pairs) => {
            for (name, value) in pairs {
                let key = if name.starts_with([':', '@', '$']) {
                    name.clone()
                } else {
                    format!(":{}", name)
                };
                let index = stmt
                    .parameter_index(&key)?
                    .ok_or_else(|| rusqlite::Error::InvalidParameterName(key.clone()))?;
                stmt.raw_bind_parameter(index, to_sqlite(value))?;
            }
        }
    }
    Ok(())
}

fn prepare_bound<'c>(
    conn: &'c Connection,
    sql: &str,
    params: &BoundParams,
) -> Result<Statement<'c>> {
    let mut stmt = conn.prepare(sql)?;
    bind_params(&mut stmt, params)?;
    Ok(stmt)
}

fn column_names(stmt: &Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(String::from).collect()
}

impl SqliteSession {
    /// Run `f` against the connection on the blocking pool
    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let conn = connection.blocking_lock();
            f(&conn)
        })
        .await
        .map_err(join_error)?
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    async fn connect(&self, config: &ConnectConfig) -> Result<Box<dyn Session>> {
        let path = config.connection_string(DatabaseType::Sqlite);
        let opened = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
                let conn = Connection::open(&path)?;
                conn.execute_batch("PRAGMA foreign_keys = ON")?;
                Ok(conn)
            })
            .await
            .map_err(join_error)?
        };

        let conn = opened.map_err(|e| {
            DatabaseError::connection_failed_with_source(
                path,
                0,
                "cannot open SQLite database",
                Box::new(e),
            )
        })?;

        Ok(Box::new(SqliteSession {
            connection: Arc::new(Mutex::new(conn)),
        }))
    }
}

#[async_trait]
impl Session for SqliteSession {
    async fn execute(&mut self, sql: &str, params: BoundParams) -> Result<ExecOutcome> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            let mut stmt = prepare_bound(conn, &sql, &params)?;
            let changes = stmt.raw_execute()?;
            let id = conn.last_insert_rowid();
            Ok(ExecOutcome {
                last_insert_id: u64::try_from(id).ok().filter(|id| *id > 0),
                rows_affected: changes as u64,
                row_number: None,
            })
        })
        .await
    }

    async fn execute_many(
        &mut self,
        sql: &str,
        rows: Vec<Vec<DatabaseValue>>,
    ) -> Result<ExecOutcome> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut total = 0u64;
            for row in rows {
                bind_params(&mut stmt, &BoundParams::Positional(row))?;
                total += stmt.raw_execute()? as u64;
            }
            let id = conn.last_insert_rowid();
            Ok(ExecOutcome {
                last_insert_id: u64::try_from(id).ok().filter(|id| *id > 0),
                rows_affected: total,
                row_number: None,
            })
        })
        .await
    }

    async fn query(&mut self, sql: &str, params: BoundParams) -> Result<DriverRows> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            let mut stmt = prepare_bound(conn, &sql, &params)?;
            let columns = column_names(&stmt);
            let width = columns.len();

            let mut rows = stmt.raw_query();
            let mut fetched = Vec::new();
            while let Some(row) = rows.next()? {
                fetched.push(read_row(row, width)?);
            }
            Ok(DriverRows {
                columns,
                rows: fetched,
            })
        })
        .await
    }

    async fn cursor<'a>(
        &'a mut self,
        sql: &'a str,
        params: BoundParams,
    ) -> Result<Box<dyn Cursor + 'a>> {
        let (columns_tx, columns_rx) = oneshot::channel::<Result<Vec<String>>>();
        let (rows_tx, rows_rx) = mpsc::channel::<Result<Vec<DatabaseValue>>>(CURSOR_BUFFER);
        let connection = Arc::clone(&self.connection);
        let sql = sql.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = connection.blocking_lock();
            let mut stmt = match prepare_bound(&conn, &sql, &params) {
                Ok(stmt) => stmt,
                Err(e) => {
                    let _ = columns_tx.send(Err(e));
                    return;
                }
            };
            let columns = column_names(&stmt);
            let width = columns.len();
            if columns_tx.send(Ok(columns)).is_err() {
                return;
            }

            let mut rows = stmt.raw_query();
            loop {
                let item = match rows.next() {
                    Ok(Some(row)) => read_row(row, width),
                    Ok(None) => break,
                    Err(e) => Err(e.into()),
                };
                let failed = item.is_err();
                // A send error means the cursor was dropped.
                if rows_tx.blocking_send(item).is_err() || failed {
                    break;
                }
            }
        });

        let columns = columns_rx
            .await
            .map_err(|_| DatabaseError::other("SQLite cursor task ended before reporting columns"))??;

        Ok(Box::new(SqliteCursor {
            columns,
            rows: rows_rx,
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let connection = self.connection;
        tokio::task::spawn_blocking(move || match Arc::try_unwrap(connection) {
            Ok(mutex) => mutex
                .into_inner()
                .close()
                .map_err(|(_, e)| DatabaseError::from(e)),
            // A finishing cursor task still holds a reference; it closes on drop.
            Err(_) => Ok(()),
        })
        .await
        .map_err(join_error)?
    }
}

/// Rows streamed from a blocking task
struct SqliteCursor {
    columns: Vec<String>,
    rows: mpsc::Receiver<Result<Vec<DatabaseValue>>>,
}

#[async_trait]
impl Cursor for SqliteCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<DatabaseValue>>> {
        self.rows.recv().await.transpose()
    }
}
