//! Database type definitions
//!
//! This module defines the engines the query layer can talk to and the few syntactic
//! traits that follow from the engine: the dialect family and the placeholder style.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported database types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DatabaseType {
    /// MySQL/MariaDB database
    Mysql = 2,
    /// SQLite database (speaks the MySQL-family subset this crate emits)
    Sqlite = 3,
    /// Microsoft SQL Server
    SqlServer = 7,
}

/// How positional parameters are spelled in statement text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceholderStyle {
    /// `?` for every parameter
    QuestionMark,
    /// `@P1`, `@P2`, ... numbered from one
    AtNumbered,
}

impl PlaceholderStyle {
    /// Placeholder text for the parameter at 1-based `position`
    pub fn token(&self, position: usize) -> String {
        match self {
            PlaceholderStyle::QuestionMark => "?".to_string(),
            PlaceholderStyle::AtNumbered => format!("@P{}", position),
        }
    }

    /// Substitute parameters into `sql` for logging and SQL echo.
    ///
    /// The output is for humans only; statements always travel with separate parameters.
    pub fn render_for_display(&self, sql: &str, params: &[super::value::DatabaseValue]) -> String {
        match self {
            PlaceholderStyle::QuestionMark => {
                let mut out = String::with_capacity(sql.len());
                let mut values = params.iter();
                for ch in sql.chars() {
                    if ch != '?' {
                        out.push(ch);
                        continue;
                    }
                    match values.next() {
                        Some(value) => out.push_str(&value.display_literal()),
                        None => out.push(ch),
                    }
                }
                out
            }
            PlaceholderStyle::AtNumbered => {
                // Highest index first so @P1 never clobbers the prefix of @P10.
                let mut out = sql.to_string();
                for (idx, value) in params.iter().enumerate().rev() {
                    out = out.replace(&format!("@P{}", idx + 1), &value.display_literal());
                }
                out
            }
        }
    }
}

impl DatabaseType {
    /// Convert database type to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            DatabaseType::Mysql => "mysql",
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::SqlServer => "sqlserver",
        }
    }

    /// Whether pagination goes into the SELECT prefix as `TOP` instead of a `LIMIT` clause
    pub fn uses_top_pagination(&self) -> bool {
        matches!(self, DatabaseType::SqlServer)
    }

    /// Placeholder spelling the engine's driver expects
    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self {
            DatabaseType::Mysql | DatabaseType::Sqlite => PlaceholderStyle::QuestionMark,
            DatabaseType::SqlServer => PlaceholderStyle::AtNumbered,
        }
    }

    /// Default TCP port, `None` for file databases
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DatabaseType::Mysql => Some(3306),
            DatabaseType::Sqlite => None,
            DatabaseType::SqlServer => Some(1433),
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DatabaseType::Mysql),
            "sqlite" | "sqlite3" => Ok(DatabaseType::Sqlite),
            "sqlserver" | "mssql" => Ok(DatabaseType::SqlServer),
            _ => Err(format!("Invalid database type: '{}'", s)),
        }
    }
}
