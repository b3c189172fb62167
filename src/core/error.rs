//! Error types for the query layer
//!
//! Every failure surfaces as a [`DatabaseError`]. [`DatabaseError::kind`] folds the
//! variants into the three categories callers usually branch on: connection
//! failures, execution failures and configuration misuse.

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Coarse classification of a [`DatabaseError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connecting or reconnecting to the server failed
    Connection,
    /// A statement was rejected by the driver or the server
    Execution,
    /// The caller handed the builder something it cannot compile
    Configuration,
    /// Anything else (task join failures, internal channel errors)
    Other,
}

/// Error types for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Connection failed with details
    #[error("Connection failed to {host}:{port} - {message}")]
    ConnectionFailed {
        host: String,
        port: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No live handle to run a statement on
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Statement execution failed on the given host
    #[error("Execution failed on {host}: {message}")]
    Execution { host: String, message: String },

    /// Malformed where / assignment / insert specification
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// Builder or dialect misconfiguration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Column not found in a result row
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Invalid connection string
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// MySQL error
    #[cfg(feature = "mysql")]
    #[error("MySQL error: {0}")]
    MysqlError(#[from] mysql_async::Error),

    /// SQL Server error
    #[cfg(feature = "mssql")]
    #[error("SQL Server error: {0}")]
    MssqlError(#[from] tiberius::error::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DatabaseError {
    /// Create a connection failed error with host/port details
    pub fn connection_failed(
        host: impl Into<String>,
        port: u16,
        message: impl Into<String>,
    ) -> Self {
        DatabaseError::ConnectionFailed {
            host: host.into(),
            port,
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source error
    pub fn connection_failed_with_source(
        host: impl Into<String>,
        port: u16,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        DatabaseError::ConnectionFailed {
            host: host.into(),
            port,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a new connection error (generic)
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        DatabaseError::ConnectionError(msg.into())
    }

    /// Create an execution error
    pub fn execution(host: impl Into<String>, message: impl Into<String>) -> Self {
        DatabaseError::Execution {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create an invalid condition error
    pub fn invalid_condition<S: Into<String>>(msg: S) -> Self {
        DatabaseError::InvalidCondition(msg.into())
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Configuration(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Other(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatabaseError::ConnectionFailed { .. } | DatabaseError::ConnectionError(_) => {
                ErrorKind::Connection
            }
            DatabaseError::Execution { .. } => ErrorKind::Execution,
            DatabaseError::InvalidCondition(_)
            | DatabaseError::Configuration(_)
            | DatabaseError::InvalidConnectionString(_) => ErrorKind::Configuration,
            #[cfg(feature = "sqlite")]
            DatabaseError::SqliteError(_) => ErrorKind::Execution,
            #[cfg(feature = "mysql")]
            DatabaseError::MysqlError(_) => ErrorKind::Execution,
            #[cfg(feature = "mssql")]
            DatabaseError::MssqlError(_) => ErrorKind::Execution,
            DatabaseError::ColumnNotFound(_) | DatabaseError::Other(_) => ErrorKind::Other,
        }
    }
}
