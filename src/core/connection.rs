//! Connection manager
//!
//! [`Connection`] owns at most one live driver [`Session`] and reopens it when needed.
//! A new session is opened when:
//!
//! - there is no session yet (lazy construction, failed eager connect, explicit close);
//! - the session sat idle longer than [`ConnectConfig::max_idle_time`];
//! - the previous statement failed.
//!
//! A failed statement is logged with the host and the display form of the query, the
//! session is dropped and the error is returned. Nothing is retried within the same call.

use super::database::{Connector, ConnectConfig, Cursor, Params, Session};
use super::database_types::DatabaseType;
use super::error::{DatabaseError, Result};
use super::value::{DatabaseRow, DatabaseValue, ExecResult, QueryResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// A single self-healing database handle
pub struct Connection {
    connector: Box<dyn Connector>,
    config: ConnectConfig,
    session: Option<Box<dyn Session>>,
    last_use: Instant,
    // Set by row iterators that hit a driver error; checked before the next statement.
    broken: AtomicBool,
}

impl Connection {
    /// Create a manager that connects on first use
    pub fn new<C: Connector + 'static>(connector: C, config: ConnectConfig) -> Self {
        Self {
            connector: Box::new(connector),
            config,
            session: None,
            last_use: Instant::now(),
            broken: AtomicBool::new(false),
        }
    }

    /// Create a manager and connect right away.
    ///
    /// A failed connect is logged and swallowed; the first statement tries again.
    pub async fn open<C: Connector + 'static>(connector: C, config: ConnectConfig) -> Self {
        let mut connection = Self::new(connector, config);
        match connection.connector.connect(&connection.config).await {
            Ok(session) => connection.session = Some(session),
            Err(e) => {
                tracing::warn!(
                    host = %connection.config.host,
                    port = connection.port(),
                    error = %e,
                    "cannot connect to database"
                );
            }
        }
        connection
    }

    /// Engine behind this connection
    pub fn database_type(&self) -> DatabaseType {
        self.connector.database_type()
    }

    /// Settings this connection was created with
    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    /// Target host, used in log records
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Whether a session is currently held
    pub fn is_connected(&self) -> bool {
        self.session.is_some() && !self.broken.load(Ordering::Acquire)
    }

    fn port(&self) -> u16 {
        self.config.port_or_default(self.database_type())
    }

    /// Drop the current session, if any, and connect again
    pub async fn reconnect(&mut self) -> Result<()> {
        self.release().await;
        self.broken.store(false, Ordering::Release);
        match self.connector.connect(&self.config).await {
            Ok(session) => {
                self.session = Some(session);
                self.last_use = Instant::now();
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    host = %self.config.host,
                    port = self.port(),
                    error = %e,
                    "reconnect failed"
                );
                Err(e)
            }
        }
    }

    /// Close the session. The next statement reconnects.
    pub async fn close(&mut self) -> Result<()> {
        self.broken.store(false, Ordering::Release);
        match self.session.take() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }

    async fn release(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::debug!(host = %self.config.host, error = %e, "error while closing session");
            }
        }
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if self.broken.swap(false, Ordering::AcqRel) {
            tracing::debug!(host = %self.config.host, "previous statement failed, reconnecting");
            self.session = None;
        }

        let idle = self.last_use.elapsed();
        if self.session.is_some() && idle > self.config.max_idle_time {
            tracing::debug!(
                host = %self.config.host,
                idle_secs = idle.as_secs(),
                "connection idle too long, reconnecting"
            );
            self.release().await;
        }

        if self.session.is_none() {
            self.reconnect().await?;
        }

        self.last_use = Instant::now();
        Ok(())
    }

    fn session_mut(&mut self) -> Result<&mut Box<dyn Session>> {
        self.session
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("no live database session"))
    }

    fn display_sql(&self, sql: &str, params: &[DatabaseValue]) -> String {
        self.database_type()
            .placeholder_style()
            .render_for_display(sql, params)
    }

    fn echo(&self, rendered: String) -> String {
        if self.config.echo_sql {
            rendered
        } else {
            String::new()
        }
    }

    fn fail(&mut self, query: &str, error: DatabaseError) -> DatabaseError {
        tracing::error!(
            host = %self.config.host,
            query = %query,
            error = %error,
            "database statement failed"
        );
        self.session = None;
        error
    }

    /// Run a write statement and return the generated id, if any
    pub async fn execute(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Option<u64>> {
        Ok(self.execute_return_detail(sql, params).await?.last_insert_id)
    }

    /// Run a write statement and return everything the driver reports
    pub async fn execute_return_detail(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<ExecResult> {
        let params = params.into();
        self.ensure_connected().await?;
        let rendered = self.display_sql(sql, &params.display_values());

        let outcome = self.session_mut()?.execute(sql, params.resolve()).await;
        match outcome {
            Ok(outcome) => Ok(ExecResult {
                last_insert_id: outcome.last_insert_id,
                row_count: outcome.rows_affected,
                row_number: outcome.row_number,
                sql: self.echo(rendered),
            }),
            Err(e) => Err(self.fail(&rendered, e)),
        }
    }

    /// Run one write statement per parameter row and return the last generated id
    pub async fn execute_many(
        &mut self,
        sql: &str,
        rows: Vec<Vec<DatabaseValue>>,
    ) -> Result<Option<u64>> {
        Ok(self.execute_many_return_detail(sql, rows).await?.last_insert_id)
    }

    /// Batch variant of [`Connection::execute_return_detail`].
    ///
    /// The rendered form substitutes the first row only.
    pub async fn execute_many_return_detail(
        &mut self,
        sql: &str,
        rows: Vec<Vec<DatabaseValue>>,
    ) -> Result<ExecResult> {
        self.ensure_connected().await?;
        let rendered = self.display_sql(sql, rows.first().map(Vec::as_slice).unwrap_or(&[]));

        let outcome = self.session_mut()?.execute_many(sql, rows).await;
        match outcome {
            Ok(outcome) => Ok(ExecResult {
                last_insert_id: outcome.last_insert_id,
                row_count: outcome.rows_affected,
                row_number: outcome.row_number,
                sql: self.echo(rendered),
            }),
            Err(e) => Err(self.fail(&rendered, e)),
        }
    }

    /// Run a query and fetch all rows
    pub async fn query(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Vec<DatabaseRow>> {
        Ok(self.query_return_detail(sql, params).await?.data)
    }

    /// Run a query and return rows, column names and the echoed statement
    pub async fn query_return_detail(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<QueryResult> {
        let params = params.into();
        self.ensure_connected().await?;
        let rendered = self.display_sql(sql, &params.display_values());

        let fetched = self.session_mut()?.query(sql, params.resolve()).await;
        match fetched {
            Ok(fetched) => {
                let data = fetched
                    .rows
                    .into_iter()
                    .map(|values| DatabaseRow::from_columns(&fetched.columns, values))
                    .collect();
                Ok(QueryResult {
                    data,
                    column_names: fetched.columns,
                    sql: self.echo(rendered),
                })
            }
            Err(e) => Err(self.fail(&rendered, e)),
        }
    }

    /// Run a query and stream its rows.
    ///
    /// The cursor stays open until the iterator is exhausted or dropped, and it borrows
    /// the connection for that long. Calling this again re-executes the query.
    ///
    /// ```no_run
    /// # async fn demo(conn: &mut chaindb::Connection) -> chaindb::Result<()> {
    /// let mut rows = conn.iter("SELECT id, name FROM users", ()).await?;
    /// while let Some(row) = rows.next().await? {
    ///     println!("{}", row["name"]);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn iter<'a>(
        &'a mut self,
        sql: &'a str,
        params: impl Into<Params>,
    ) -> Result<RowIter<'a>> {
        let params = params.into();
        self.ensure_connected().await?;
        let rendered = self.display_sql(sql, &params.display_values());
        let host = self.config.host.clone();

        let Connection {
            session, broken, ..
        } = self;
        let session = session
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("no live database session"))?;

        match session.cursor(sql, params.resolve()).await {
            Ok(cursor) => Ok(RowIter {
                columns: cursor.columns().to_vec(),
                cursor: Some(cursor),
                broken,
                host,
                query: rendered,
            }),
            Err(e) => {
                tracing::error!(host = %host, query = %rendered, error = %e, "database statement failed");
                broken.store(true, Ordering::Release);
                Err(e)
            }
        }
    }
}

/// Lazy rows from [`Connection::iter`].
///
/// Not restartable. Dropping it closes the underlying cursor.
pub struct RowIter<'a> {
    cursor: Option<Box<dyn Cursor + 'a>>,
    columns: Vec<String>,
    broken: &'a AtomicBool,
    host: String,
    query: String,
}

impl RowIter<'_> {
    /// Column names of the result set
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Next row, `Ok(None)` once exhausted.
    ///
    /// A driver error closes the cursor and marks the connection for reconnect.
    pub async fn next(&mut self) -> Result<Option<DatabaseRow>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        match cursor.next_row().await {
            Ok(Some(values)) => Ok(Some(DatabaseRow::from_columns(&self.columns, values))),
            Ok(None) => {
                self.cursor = None;
                Ok(None)
            }
            Err(e) => {
                tracing::error!(
                    host = %self.host,
                    query = %self.query,
                    error = %e,
                    "database statement failed"
                );
                self.cursor = None;
                self.broken.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Drain the remaining rows
    pub async fn collect(mut self) -> Result<Vec<DatabaseRow>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}
