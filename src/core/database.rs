//! Driver seam and connection configuration
//!
//! The raw engine drivers live behind three small traits. A [`Connector`] opens a
//! [`Session`]; a session runs statements and opens [`Cursor`]s. The connection manager
//! in [`crate::core::connection`] owns exactly one session at a time and decides when
//! to throw it away and connect again.

use super::database_types::DatabaseType;
use super::error::Result;
use super::value::DatabaseValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default idle time after which a handle is considered stale (7 hours).
///
/// MySQL drops idle clients after 8 hours without telling them.
pub const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(7 * 3600);

/// Statement parameters: positional values and, optionally, named ones.
///
/// When any named parameter is present the named set is sent and the positional
/// values are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    positional: Vec<DatabaseValue>,
    named: Vec<(String, DatabaseValue)>,
}

/// Parameters as they are handed to a driver
#[derive(Debug, Clone, PartialEq)]
pub enum BoundParams {
    /// Bound in placeholder order
    Positional(Vec<DatabaseValue>),
    /// Bound by name
    Named(Vec<(String, DatabaseValue)>),
}

impl Params {
    /// No parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional parameters in placeholder order
    pub fn positional(values: Vec<DatabaseValue>) -> Self {
        Self {
            positional: values,
            named: Vec::new(),
        }
    }

    /// Add a named parameter
    #[must_use]
    pub fn with_named(mut self, name: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }

    /// Whether neither positional nor named values are set
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Values in the order they appear in the statement, for display
    pub fn display_values(&self) -> Vec<DatabaseValue> {
        if self.named.is_empty() {
            self.positional.clone()
        } else {
            self.named.iter().map(|(_, v)| v.clone()).collect()
        }
    }

    /// Pick the set that will be sent: named wins when present
    pub fn resolve(self) -> BoundParams {
        if self.named.is_empty() {
            BoundParams::Positional(self.positional)
        } else {
            BoundParams::Named(self.named)
        }
    }
}

impl From<Vec<DatabaseValue>> for Params {
    fn from(values: Vec<DatabaseValue>) -> Self {
        Params::positional(values)
    }
}

impl From<&[DatabaseValue]> for Params {
    fn from(values: &[DatabaseValue]) -> Self {
        Params::positional(values.to_vec())
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::new()
    }
}

/// Rows fetched eagerly by a driver
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverRows {
    /// Column names, known even for an empty result
    pub columns: Vec<String>,
    /// Row values in column order
    pub rows: Vec<Vec<DatabaseValue>>,
}

/// What a driver reports after a write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Generated key of the last inserted row, if the engine reports it
    pub last_insert_id: Option<u64>,
    /// Rows affected
    pub rows_affected: u64,
    /// Cursor position after the statement, if the engine tracks one
    pub row_number: Option<u64>,
}

/// Opens driver sessions for one kind of engine
#[async_trait]
pub trait Connector: Send + Sync {
    /// Engine this connector talks to
    fn database_type(&self) -> DatabaseType;

    /// Open a fresh session
    ///
    /// # Errors
    ///
    /// Returns [`crate::DatabaseError::ConnectionFailed`] when the server cannot be reached
    /// or rejects the credentials.
    async fn connect(&self, config: &ConnectConfig) -> Result<Box<dyn Session>>;
}

/// One live driver session.
///
/// Sessions autocommit every statement. A session that returned an error may be
/// unusable; the connection manager drops it and connects again on the next call.
#[async_trait]
pub trait Session: Send {
    /// Run a write statement
    async fn execute(&mut self, sql: &str, params: BoundParams) -> Result<ExecOutcome>;

    /// Run one write statement once per parameter row
    async fn execute_many(
        &mut self,
        sql: &str,
        rows: Vec<Vec<DatabaseValue>>,
    ) -> Result<ExecOutcome>;

    /// Run a row-returning statement and fetch everything
    async fn query(&mut self, sql: &str, params: BoundParams) -> Result<DriverRows>;

    /// Run a row-returning statement and hand back a lazy cursor.
    ///
    /// Dropping the cursor releases the server-side result set.
    async fn cursor<'a>(
        &'a mut self,
        sql: &'a str,
        params: BoundParams,
    ) -> Result<Box<dyn Cursor + 'a>>;

    /// Close the session
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A lazily consumed result set
#[async_trait]
pub trait Cursor: Send {
    /// Column names of the result set
    fn columns(&self) -> &[String];

    /// Next row, `None` once the result set is exhausted
    async fn next_row(&mut self) -> Result<Option<Vec<DatabaseValue>>>;
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_max_idle_time() -> Duration {
    DEFAULT_MAX_IDLE_TIME
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Connection settings for one target server.
///
/// Deserializable from any serde format; `max_idle_time` is given in seconds.
///
/// ```
/// use chaindb::ConnectConfig;
/// use std::time::Duration;
///
/// let config = ConnectConfig::new()
///     .host("db1.internal")
///     .port(3306)
///     .database("shop")
///     .user("app")
///     .password("secret")
///     .max_idle_time(Duration::from_secs(600));
/// assert_eq!(config.max_idle_time, Duration::from_secs(600));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectConfig {
    /// Server host name
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port; the engine default when unset
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name, or file path for SQLite
    #[serde(default)]
    pub database: String,
    /// User name
    #[serde(default)]
    pub user: Option<String>,
    /// Password
    #[serde(default)]
    pub password: Option<String>,
    /// Idle time after which the handle is reopened before the next statement
    #[serde(default = "default_max_idle_time", with = "duration_secs")]
    pub max_idle_time: Duration,
    /// Return the display form of each statement in results
    #[serde(default)]
    pub echo_sql: bool,
    /// Extra driver options appended to the connection string
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            database: String::new(),
            user: None,
            password: None,
            max_idle_time: DEFAULT_MAX_IDLE_TIME,
            echo_sql: false,
            options: BTreeMap::new(),
        }
    }
}

impl ConnectConfig {
    /// Settings with defaults: localhost, engine default port, 7 hour idle limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }

    /// Set the database port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the database name (file path for SQLite)
    pub fn database<S: Into<String>>(mut self, database: S) -> Self {
        self.database = database.into();
        self
    }

    /// Set the user name
    pub fn user<S: Into<String>>(mut self, user: S) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the password
    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the idle limit
    pub fn max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.max_idle_time = max_idle_time;
        self
    }

    /// Enable or disable SQL echo
    pub fn echo_sql(mut self, echo_sql: bool) -> Self {
        self.echo_sql = echo_sql;
        self
    }

    /// Add a custom driver option
    pub fn option<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Port to dial for the given engine
    pub fn port_or_default(&self, db_type: DatabaseType) -> u16 {
        self.port
            .or_else(|| db_type.default_port())
            .unwrap_or_default()
    }

    /// Build the connection string the engine's driver understands
    pub fn connection_string(&self, db_type: DatabaseType) -> String {
        match db_type {
            DatabaseType::Sqlite => {
                if self.database.is_empty() {
                    ":memory:".to_string()
                } else {
                    self.database.clone()
                }
            }
            DatabaseType::Mysql => {
                let username = self.user.as_deref().unwrap_or("root");
                let password = self.password.as_deref().unwrap_or("");
                let mut url = format!(
                    "mysql://{}:{}@{}:{}/{}",
                    username,
                    password,
                    self.host,
                    self.port_or_default(db_type),
                    self.database
                );
                if !self.options.is_empty() {
                    let query: Vec<String> = self
                        .options
                        .iter()
                        .map(|(key, value)| format!("{}={}", key, value))
                        .collect();
                    url.push('?');
                    url.push_str(&query.join("&"));
                }
                url
            }
            DatabaseType::SqlServer => {
                let mut parts = vec![format!(
                    "server=tcp:{},{}",
                    self.host,
                    self.port_or_default(db_type)
                )];
                if !self.database.is_empty() {
                    parts.push(format!("database={}", self.database));
                }
                if let Some(user) = &self.user {
                    parts.push(format!("user={}", user));
                }
                if let Some(password) = &self.password {
                    parts.push(format!("password={}", password));
                }
                for (key, value) in &self.options {
                    parts.push(format!("{}={}", key, value));
                }
                parts.join(";")
            }
        }
    }
}
