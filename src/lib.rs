//! # chaindb
//!
//! A chainable query builder over MySQL-family and SQL Server dialects, backed by a
//! self-healing single connection.
//!
//! ## Features
//!
//! - **Fluent builder**: `table().where_().order_by().limit().select()` and friends
//! - **Where mini-language**: comparison signs, `in` / `not in` / `is not`, `between`,
//!   `or` markers and backtick-escaped native expressions, all compiled to parameterized SQL
//! - **Dialects**: `LIMIT` for MySQL-family engines, `TOP` and `NOT IN` paging for SQL Server
//! - **Connection manager**: lazy connect, reconnect after idle timeout or a failed statement
//! - **Graceful rows**: absent and null columns read as empty strings when enabled
//!
//! ## Supported Databases
//!
//! | Database   | Feature  | Driver        | Placeholders |
//! |------------|----------|---------------|--------------|
//! | SQLite     | `sqlite` | rusqlite      | `?`          |
//! | MySQL      | `mysql`  | mysql_async   | `?`          |
//! | SQL Server | `mssql`  | tiberius      | `@P1`        |
//!
//! `sqlite` is on by default; `all-databases` enables every driver.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chaindb::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let conn = Connection::open(SqliteConnector, ConnectConfig::new().database(":memory:")).await;
//!     let mut db = ChainDb::new(conn);
//!
//!     db.connection_mut()
//!         .execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)", ())
//!         .await?;
//!
//!     db.table("users").insert(&json!({"name": "Alice", "age": 30})).await?;
//!
//!     let row = db.where_(json!({"age": [">=", 18]})).get("*").await?;
//!     println!("{}", row["name"]);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through [`tracing`] and never installs a subscriber. Failed statements
//! are logged at `error` with the host and the statement with parameters substituted;
//! reconnects are logged at `debug`.

/// Core query layer types
pub mod core;

/// Driver implementations of the connection seam
pub mod backends;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::core::{
        ChainDb, ChainOptions, Clause, ConnectConfig, Connection, DatabaseError, DatabaseRow,
        DatabaseType, DatabaseValue, ExecResult, QueryResult, Result, WhereSpec,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::backends::SqliteConnector;
    #[cfg(feature = "mysql")]
    pub use crate::backends::MysqlConnector;
    #[cfg(feature = "mssql")]
    pub use crate::backends::MssqlConnector;
}

// Re-export at root level for convenience
pub use core::{
    ChainDb, ChainOptions, Clause, ConnectConfig, Connection, Connector, DatabaseError,
    DatabaseRow, DatabaseType, DatabaseValue, ErrorKind, ExecResult, Params, PlaceholderStyle,
    QueryResult, Record, Result, WhereSpec,
};
