//! Driver implementations of the connection seam
//!
//! Each backend provides a [`Connector`](crate::core::Connector) that opens
//! [`Session`](crate::core::Session)s for one server family. Backends are feature gated.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "mssql")]
pub mod mssql;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConnector;

#[cfg(feature = "mysql")]
pub use mysql::MysqlConnector;

#[cfg(feature = "mssql")]
pub use mssql::MssqlConnector;
