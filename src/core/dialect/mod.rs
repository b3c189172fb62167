//! Dialect SQL generators
//!
//! Each engine family gets one [`DialectGenerator`]. The trait's default methods hold the
//! statement text every family shares; implementations override what differs, which in
//! practice is pagination and the fields-introspection statement.

use super::condition::{compile_condition, Bindings, Limit, QueryState};
use super::database_types::{DatabaseType, PlaceholderStyle};
use super::error::Result;

pub mod mysql;
pub mod sqlserver;

pub use mysql::MysqlDialect;
pub use sqlserver::SqlServerDialect;

/// Glue a statement head and an optional condition, terminated with `;`
pub(crate) fn statement(head: &str, condition: &str) -> String {
    if condition.is_empty() {
        format!("{};", head)
    } else {
        format!("{} {};", head, condition)
    }
}

fn top_prefix(top: Option<u64>) -> String {
    top.map(|n| format!("TOP ({}) ", n)).unwrap_or_default()
}

/// SQL text generation for one engine family
pub trait DialectGenerator: Send + Sync {
    /// Engine this generator emits SQL for
    fn database_type(&self) -> DatabaseType;

    /// Placeholder spelling for bound values
    fn placeholder_style(&self) -> PlaceholderStyle {
        self.database_type().placeholder_style()
    }

    /// Trailing limit clause, `None` when the dialect paginates elsewhere
    fn limit_clause(&self, limit: &Limit) -> Option<String>;

    /// Full `SELECT <fields> FROM <table> ...;` statement for the given state.
    ///
    /// Takes the state by value so dialects that fold the limit into the SELECT prefix can
    /// clear it before the condition is compiled. `primary_key` is only consulted by
    /// dialects that need it for pagination.
    fn select_with_fields(
        &self,
        table: &str,
        fields: &str,
        primary_key: Option<&str>,
        state: QueryState,
        bindings: &mut Bindings,
        native_escape: bool,
    ) -> Result<String> {
        let _ = primary_key;
        let condition = compile_condition(&state, self, bindings, native_escape)?;
        Ok(statement(&format!("SELECT {} FROM {}", fields, table), &condition))
    }

    /// `SELECT <expr>;` for native expressions without a table
    fn select_bare(&self, expr: &str) -> String {
        format!("SELECT {};", expr)
    }

    /// Pull the row cap for UPDATE and DELETE out of the state.
    ///
    /// Dialects that render the limit in the trailing condition leave the state alone and
    /// return `None`.
    fn take_write_limit(&self, state: &mut QueryState) -> Result<Option<u64>> {
        let _ = state;
        Ok(None)
    }

    /// `UPDATE [TOP (n)] <table> SET <assignments> <condition>;`
    fn update(&self, table: &str, assignments: &str, condition: &str, top: Option<u64>) -> String {
        statement(
            &format!("UPDATE {}{} SET {}", top_prefix(top), table, assignments),
            condition,
        )
    }

    /// `INSERT INTO <table> (<fields>) VALUES (<placeholders>);`
    fn insert_with_fields(&self, table: &str, fields: &str, placeholders: &str) -> String {
        format!("INSERT INTO {} ({}) VALUES ({});", table, fields, placeholders)
    }

    /// `INSERT INTO <table> VALUES (<placeholders>);`
    fn insert_without_fields(&self, table: &str, placeholders: &str) -> String {
        format!("INSERT INTO {} VALUES ({});", table, placeholders)
    }

    /// Batch insert with fields; one statement executed per row
    fn insert_many_with_fields(&self, table: &str, fields: &str, placeholders: &str) -> String {
        self.insert_with_fields(table, fields, placeholders)
    }

    /// Batch insert without fields; one statement executed per row
    fn insert_many_without_fields(&self, table: &str, placeholders: &str) -> String {
        self.insert_without_fields(table, placeholders)
    }

    /// `DELETE [TOP (n)] FROM <table> <condition>;`
    fn delete(&self, table: &str, condition: &str, top: Option<u64>) -> String {
        statement(&format!("DELETE {}FROM {}", top_prefix(top), table), condition)
    }

    /// `UPDATE [TOP (n)] <table> SET f=f+<step> <condition>;`
    fn increase(
        &self,
        table: &str,
        field: &str,
        step: &str,
        condition: &str,
        top: Option<u64>,
    ) -> String {
        statement(
            &format!("UPDATE {}{} SET {}={}+{}", top_prefix(top), table, field, field, step),
            condition,
        )
    }

    /// `UPDATE [TOP (n)] <table> SET f=f-<step> <condition>;`
    fn decrease(
        &self,
        table: &str,
        field: &str,
        step: &str,
        condition: &str,
        top: Option<u64>,
    ) -> String {
        statement(
            &format!("UPDATE {}{} SET {}={}-{}", top_prefix(top), table, field, field, step),
            condition,
        )
    }

    /// Statement returning at most one row, used to read a table's column names
    fn fields_name_statement(&self, table: &str) -> String;
}

/// Pick the generator for an engine
pub fn create_dialect(database_type: DatabaseType) -> Box<dyn DialectGenerator> {
    if database_type.uses_top_pagination() {
        Box::new(SqlServerDialect::new())
    } else {
        Box::new(MysqlDialect::new(database_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_picks_family() {
        assert_eq!(
            create_dialect(DatabaseType::Sqlite).database_type(),
            DatabaseType::Sqlite
        );
        assert_eq!(
            create_dialect(DatabaseType::Sqlite).placeholder_style(),
            PlaceholderStyle::QuestionMark
        );
        assert_eq!(
            create_dialect(DatabaseType::SqlServer).placeholder_style(),
            PlaceholderStyle::AtNumbered
        );

        for database_type in [DatabaseType::Mysql, DatabaseType::Sqlite, DatabaseType::SqlServer] {
            let dialect = create_dialect(database_type);
            assert_eq!(dialect.database_type(), database_type);
            assert_eq!(
                dialect.limit_clause(&Limit::Count(1)).is_none(),
                database_type.uses_top_pagination()
            );
        }
    }

    #[test]
    fn test_shared_statements() {
        let dialect = create_dialect(DatabaseType::Mysql);
        assert_eq!(dialect.select_bare("NOW()"), "SELECT NOW();");
        assert_eq!(
            dialect.update("users", "name=?,age=?", "WHERE id=?", None),
            "UPDATE users SET name=?,age=? WHERE id=?;"
        );
        assert_eq!(
            dialect.insert_with_fields("users", "name,age", "?,?"),
            "INSERT INTO users (name,age) VALUES (?,?);"
        );
        assert_eq!(
            dialect.insert_many_without_fields("users", "?,?"),
            "INSERT INTO users VALUES (?,?);"
        );
        assert_eq!(dialect.delete("users", "", None), "DELETE FROM users;");
        assert_eq!(
            dialect.increase("users", "visits", "?", "WHERE id=?", None),
            "UPDATE users SET visits=visits+? WHERE id=?;"
        );
        assert_eq!(
            dialect.decrease("users", "stock", "?", "", None),
            "UPDATE users SET stock=stock-?;"
        );
    }

    #[test]
    fn test_write_statements_with_row_cap() {
        let dialect = create_dialect(DatabaseType::SqlServer);
        assert_eq!(
            dialect.delete("users", "WHERE id=@P1", Some(1)),
            "DELETE TOP (1) FROM users WHERE id=@P1;"
        );
        assert_eq!(
            dialect.update("users", "a=@P1", "", Some(5)),
            "UPDATE TOP (5) users SET a=@P1;"
        );
        assert_eq!(
            dialect.increase("users", "n", "@P1", "", Some(2)),
            "UPDATE TOP (2) users SET n=n+@P1;"
        );
    }
}
