//! SQL Server dialect
//!
//! SQL Server has no `LIMIT`. A row count becomes `SELECT TOP n`; an `m,n` range (rows
//! `m` through `n`, 1-based) becomes a `NOT IN` subquery over the primary key:
//!
//! ```text
//! SELECT TOP (n-m+1) <fields> FROM <table>
//! WHERE <pk> NOT IN (SELECT TOP (m-1) <pk> FROM <table>) [AND (<where>)] ...
//! ```
//!
//! UPDATE and DELETE accept a row count only, rendered as `UPDATE TOP (n)` and
//! `DELETE TOP (n)`.

use super::{statement, DialectGenerator};
use crate::core::condition::{
    compile_condition, compile_where_body, Bindings, Limit, QueryState, WhereSpec,
};
use crate::core::database_types::DatabaseType;
use crate::core::error::{DatabaseError, Result};

/// SQL Server generator: `TOP` pagination in the SELECT prefix
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlServerDialect {
    /// Create the generator
    pub fn new() -> Self {
        Self
    }
}

impl DialectGenerator for SqlServerDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }

    fn limit_clause(&self, _limit: &Limit) -> Option<String> {
        None
    }

    fn select_with_fields(
        &self,
        table: &str,
        fields: &str,
        primary_key: Option<&str>,
        mut state: QueryState,
        bindings: &mut Bindings,
        native_escape: bool,
    ) -> Result<String> {
        let limit = state.limit.take().map(|spec| spec.resolve()).transpose()?;

        let head = match limit {
            None => format!("SELECT {} FROM {}", fields, table),
            Some(Limit::Count(n)) => format!("SELECT TOP {} {} FROM {}", n, fields, table),
            Some(Limit::Range(m, n)) => {
                let pk = primary_key.filter(|pk| !pk.is_empty()).ok_or_else(|| {
                    DatabaseError::configuration(format!(
                        "range limit {},{} on `{}` needs a primary key; bind it with table_with_key",
                        m, n, table
                    ))
                })?;
                if m == 0 || n < m {
                    return Err(DatabaseError::configuration(format!(
                        "invalid row range {},{}: rows are numbered from 1",
                        m, n
                    )));
                }

                let skip = format!("{} NOT IN (SELECT TOP {} {} FROM {})", pk, m - 1, pk, table);
                let existing =
                    compile_where_body(state.where_spec.as_ref(), bindings, native_escape)?;
                let predicate = if existing.is_empty() {
                    skip
                } else {
                    format!("{} AND ({})", skip, existing)
                };
                state.where_spec = Some(WhereSpec::Raw(predicate));

                format!("SELECT TOP {} {} FROM {}", n - m + 1, fields, table)
            }
        };

        let condition = compile_condition(&state, self, bindings, native_escape)?;
        Ok(statement(&head, &condition))
    }

    fn take_write_limit(&self, state: &mut QueryState) -> Result<Option<u64>> {
        match state.limit.take().map(|spec| spec.resolve()).transpose()? {
            None => Ok(None),
            Some(Limit::Count(n)) => Ok(Some(n)),
            Some(Limit::Range(m, n)) => Err(DatabaseError::configuration(format!(
                "row range {},{} only applies to SELECT; UPDATE and DELETE take a row count",
                m, n
            ))),
        }
    }

    fn fields_name_statement(&self, table: &str) -> String {
        format!("SELECT TOP 1 * FROM {};", table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::condition::LimitSpec;
    use crate::core::value::DatabaseValue;
    use serde_json::json;

    fn select(pk: Option<&str>, state: QueryState) -> Result<(String, Vec<DatabaseValue>)> {
        let dialect = SqlServerDialect::new();
        let mut bindings = Bindings::new(dialect.placeholder_style());
        let sql = dialect.select_with_fields("users", "id,name", pk, state, &mut bindings, true)?;
        Ok((sql, bindings.into_values()))
    }

    #[test]
    fn test_count_limit_becomes_top() {
        let (sql, params) = select(
            None,
            QueryState {
                where_spec: Some(WhereSpec::from(json!({"age": [">", 18]}))),
                limit: Some(LimitSpec::from(10)),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(sql, "SELECT TOP 10 id,name FROM users WHERE age>@P1;");
        assert_eq!(params, vec![DatabaseValue::Long(18)]);
    }

    #[test]
    fn test_range_limit_uses_not_in_subquery() {
        let (sql, params) = select(
            Some("id"),
            QueryState {
                limit: Some(LimitSpec::from("5,10")),
                order_by: Some("id".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT TOP 6 id,name FROM users WHERE id NOT IN (SELECT TOP 4 id FROM users) ORDER BY id;"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_range_limit_keeps_existing_where() {
        let (sql, params) = select(
            Some("id"),
            QueryState {
                where_spec: Some(WhereSpec::from(json!({"status": 1, "age": [">", 18]}))),
                limit: Some(LimitSpec::from("1,3")),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT TOP 3 id,name FROM users WHERE id NOT IN (SELECT TOP 0 id FROM users) AND (status=@P1 AND age>@P2);"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_range_limit_needs_primary_key() {
        let err = select(
            None,
            QueryState {
                limit: Some(LimitSpec::from("5,10")),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::Configuration(_)));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let err = select(
            Some("id"),
            QueryState {
                limit: Some(LimitSpec::from("10,5")),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::Configuration(_)));
    }

    #[test]
    fn test_fields_name_statement() {
        assert_eq!(
            SqlServerDialect::new().fields_name_statement("users"),
            "SELECT TOP 1 * FROM users;"
        );
    }

    #[test]
    fn test_write_limit_count_and_range() {
        let dialect = SqlServerDialect::new();

        let mut state = QueryState {
            limit: Some(LimitSpec::from(3)),
            ..Default::default()
        };
        assert_eq!(dialect.take_write_limit(&mut state).unwrap(), Some(3));
        assert!(state.limit.is_none());

        let mut state = QueryState {
            limit: Some(LimitSpec::from("2,4")),
            ..Default::default()
        };
        let err = dialect.take_write_limit(&mut state).unwrap_err();
        assert!(matches!(err, DatabaseError::Configuration(_)));

        let mut state = QueryState::default();
        assert_eq!(dialect.take_write_limit(&mut state).unwrap(), None);
    }
}
