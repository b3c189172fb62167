//! Core query layer types
//!
//! Values and rows, the driver seam, the connection manager, the condition compiler, the
//! dialect generators and the chain builder that ties them together.

pub mod condition;
pub mod connection;
pub mod database;
pub mod database_types;
pub mod dialect;
pub mod error;
pub mod query_builder;
pub mod value;

// Re-export commonly used types
pub use condition::{Clause, Conjunction, Limit, LimitSpec, WhereSpec};
pub use connection::{Connection, RowIter};
pub use database::{
    BoundParams, ConnectConfig, Connector, Cursor, DriverRows, ExecOutcome, Params, Session,
};
pub use database_types::{DatabaseType, PlaceholderStyle};
pub use dialect::{create_dialect, DialectGenerator, MysqlDialect, SqlServerDialect};
pub use error::{DatabaseError, ErrorKind, Result};
pub use query_builder::{ChainDb, ChainOptions};
pub use value::{DatabaseRow, DatabaseValue, ExecResult, QueryResult, Record};
