//! MySQL-family dialect (MySQL, MariaDB, SQLite)

use super::DialectGenerator;
use crate::core::condition::Limit;
use crate::core::database_types::DatabaseType;

/// MySQL-family generator: `LIMIT` as a trailing clause
#[derive(Debug, Clone, Copy)]
pub struct MysqlDialect {
    database_type: DatabaseType,
}

impl MysqlDialect {
    /// Generator for a MySQL-family engine
    pub fn new(database_type: DatabaseType) -> Self {
        Self { database_type }
    }
}

impl Default for MysqlDialect {
    fn default() -> Self {
        Self::new(DatabaseType::Mysql)
    }
}

impl DialectGenerator for MysqlDialect {
    fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    fn limit_clause(&self, limit: &Limit) -> Option<String> {
        Some(match limit {
            Limit::Count(n) => format!("LIMIT {}", n),
            Limit::Range(m, n) => format!("LIMIT {},{}", m, n),
        })
    }

    fn fields_name_statement(&self, table: &str) -> String {
        format!("SELECT * FROM {} LIMIT 1;", table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::condition::{Bindings, LimitSpec, QueryState, WhereSpec};
    use serde_json::json;

    fn select(state: QueryState) -> (String, Bindings) {
        let dialect = MysqlDialect::default();
        let mut bindings = Bindings::new(dialect.placeholder_style());
        let sql = dialect
            .select_with_fields("users", "*", None, state, &mut bindings, true)
            .unwrap();
        (sql, bindings)
    }

    #[test]
    fn test_bare_select() {
        let (sql, bindings) = select(QueryState::default());
        assert_eq!(sql, "SELECT * FROM users;");
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_range_limit_is_trailing() {
        let (sql, _) = select(QueryState {
            limit: Some(LimitSpec::from("5,10")),
            ..Default::default()
        });
        assert_eq!(sql, "SELECT * FROM users LIMIT 5,10;");
    }

    #[test]
    fn test_where_and_limit() {
        let (sql, bindings) = select(QueryState {
            where_spec: Some(WhereSpec::from(json!({"name": "Alice"}))),
            limit: Some(LimitSpec::from(1)),
            ..Default::default()
        });
        assert_eq!(sql, "SELECT * FROM users WHERE name=? LIMIT 1;");
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn test_fields_name_statement() {
        assert_eq!(
            MysqlDialect::default().fields_name_statement("users"),
            "SELECT * FROM users LIMIT 1;"
        );
    }
}
