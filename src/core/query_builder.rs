//! Chain query builder
//!
//! [`ChainDb`] accumulates query state through fluent calls and executes it on a terminal
//! call. Every terminal call consumes the where/join/order/limit/group state, whether the
//! statement succeeds, fails or is refused; only the table binding survives, so one
//! builder can run back-to-back unrelated queries on the same table.
//!
//! ```no_run
//! use chaindb::{ChainDb, Connection, ConnectConfig};
//! use chaindb::backends::SqliteConnector;
//! use serde_json::json;
//!
//! # async fn demo() -> chaindb::Result<()> {
//! let conn = Connection::open(SqliteConnector, ConnectConfig::new().database("app.db")).await;
//! let mut db = ChainDb::new(conn);
//!
//! let adults = db
//!     .table("users")
//!     .where_(json!({"age": [">=", 18], "status": ["in", [1, 2]]}))
//!     .order_by("id DESC")
//!     .limit(10)
//!     .select("id,name")
//!     .await?;
//!
//! db.where_(json!({"id": 7})).update(&json!({"visits": ["`visits+?", 1]})).await?;
//! # Ok(())
//! # }
//! ```

use super::condition::{
    compile_condition, Bindings, Join, JoinKind, LimitSpec, QueryState, WhereSpec, NATIVE_MARKER,
};
use super::connection::Connection;
use super::database_types::DatabaseType;
use super::dialect::{create_dialect, DialectGenerator};
use super::error::{DatabaseError, Result};
use super::value::{DatabaseRow, DatabaseValue, ExecResult, QueryResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Placeholder for the table prefix inside join clauses
pub const TABLE_PREFIX_TOKEN: &str = "###";

/// Builder behaviour switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainOptions {
    /// Prepended to table names that do not already carry it
    pub table_name_prefix: String,
    /// Log every rendered statement at debug level
    pub debug: bool,
    /// Refuse `delete()` without a where-specification
    pub strict: bool,
    /// Cache `get_fields_name()` per table
    pub cache_fields_name: bool,
    /// Return rows that read absent and null columns as empty strings
    pub grace_result: bool,
    /// Treat backtick-prefixed strings as native SQL expressions
    pub native_escape: bool,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            table_name_prefix: String::new(),
            debug: false,
            strict: true,
            cache_fields_name: true,
            grace_result: true,
            native_escape: true,
        }
    }
}

impl ChainOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_name_prefix = prefix.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_cache_fields_name(mut self, cache: bool) -> Self {
        self.cache_fields_name = cache;
        self
    }

    pub fn with_grace_result(mut self, grace: bool) -> Self {
        self.grace_result = grace;
        self
    }

    pub fn with_native_escape(mut self, native_escape: bool) -> Self {
        self.native_escape = native_escape;
        self
    }
}

/// Fluent query builder over one [`Connection`]
pub struct ChainDb {
    connection: Connection,
    dialect: Box<dyn DialectGenerator>,
    options: ChainOptions,
    table: String,
    primary_key: Option<String>,
    state: QueryState,
    fields_cache: HashMap<String, Vec<String>>,
    last_query: String,
}

impl ChainDb {
    /// Builder with default options; the dialect follows the connection's engine
    pub fn new(connection: Connection) -> Self {
        Self::with_options(connection, ChainOptions::default())
    }

    /// Builder with explicit options
    pub fn with_options(connection: Connection, options: ChainOptions) -> Self {
        let dialect = create_dialect(connection.database_type());
        Self {
            connection,
            dialect,
            options,
            table: String::new(),
            primary_key: None,
            state: QueryState::default(),
            fields_cache: HashMap::new(),
            last_query: String::new(),
        }
    }

    /// Engine the statements are generated for
    pub fn database_type(&self) -> DatabaseType {
        self.dialect.database_type()
    }

    pub fn options(&self) -> &ChainOptions {
        &self.options
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Direct access to the connection for hand-written SQL
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub fn into_connection(self) -> Connection {
        self.connection
    }

    /// Currently bound table, prefix included
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Pending query state
    pub fn state(&self) -> &QueryState {
        &self.state
    }

    /// Display form of the last executed statement; empty unless SQL echo is on
    pub fn last_sql(&self) -> &str {
        &self.last_query
    }

    fn qualify(&self, name: &str) -> String {
        let prefix = &self.options.table_name_prefix;
        if prefix.is_empty() || name.starts_with(prefix.as_str()) {
            name.to_string()
        } else {
            format!("{}{}", prefix, name)
        }
    }

    /// Bind the target table. Does not touch the rest of the state.
    pub fn table(&mut self, name: &str) -> &mut Self {
        self.table = self.qualify(name);
        self.primary_key = None;
        self
    }

    /// Bind the target table along with its primary key, required for SQL Server range
    /// pagination
    pub fn table_with_key(&mut self, name: &str, primary_key: &str) -> &mut Self {
        self.table = self.qualify(name);
        self.primary_key = Some(primary_key.to_string());
        self
    }

    /// Set the where-specification: a raw fragment, a JSON object or typed clauses
    #[doc(alias = "where")]
    pub fn where_(&mut self, spec: impl Into<WhereSpec>) -> &mut Self {
        self.state.where_spec = Some(spec.into());
        self
    }

    pub fn order_by(&mut self, order: impl Into<String>) -> &mut Self {
        self.state.order_by = Some(order.into());
        self
    }

    /// Row count, or `"m,n"` range text
    pub fn limit(&mut self, limit: impl Into<LimitSpec>) -> &mut Self {
        self.state.limit = Some(limit.into());
        self
    }

    pub fn group_by(&mut self, group: impl Into<String>) -> &mut Self {
        self.state.group_by = Some(group.into());
        self
    }

    fn set_join(&mut self, kind: JoinKind, table: &str, on: &str) -> &mut Self {
        let prefix = self.options.table_name_prefix.as_str();
        self.state.join = Some(Join {
            kind,
            table: table.replace(TABLE_PREFIX_TOKEN, prefix),
            on: on.replace(TABLE_PREFIX_TOKEN, prefix),
        });
        self
    }

    /// Same as [`ChainDb::inner_join`]
    pub fn join(&mut self, table: &str, on: &str) -> &mut Self {
        self.set_join(JoinKind::Inner, table, on)
    }

    /// `INNER JOIN <table> ON <on>`; replaces any previous join. `###` becomes the table
    /// prefix.
    pub fn inner_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.set_join(JoinKind::Inner, table, on)
    }

    pub fn left_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.set_join(JoinKind::Left, table, on)
    }

    pub fn right_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.set_join(JoinKind::Right, table, on)
    }

    fn take_state(&mut self) -> QueryState {
        self.last_query.clear();
        std::mem::take(&mut self.state)
    }

    fn require_table(&self) -> Result<&str> {
        if self.table.is_empty() {
            Err(DatabaseError::configuration("no table bound; call table() first"))
        } else {
            Ok(&self.table)
        }
    }

    fn bindings(&self) -> Bindings {
        Bindings::new(self.dialect.placeholder_style())
    }

    fn trace(&self, sql: &str, params: &[DatabaseValue]) {
        if self.options.debug {
            tracing::debug!(sql = %sql, params = ?params, "chaindb statement");
        }
    }

    async fn run_query(&mut self, sql: &str, bindings: Bindings) -> Result<Vec<DatabaseRow>> {
        self.trace(sql, bindings.values());
        let QueryResult { data, sql: echoed, .. } = self
            .connection
            .query_return_detail(sql, bindings.into_values())
            .await?;
        self.last_query = echoed;

        if self.options.grace_result {
            Ok(data.into_iter().map(DatabaseRow::into_graceful).collect())
        } else {
            Ok(data)
        }
    }

    async fn run_execute(&mut self, sql: &str, bindings: Bindings) -> Result<ExecResult> {
        self.trace(sql, bindings.values());
        let result = self
            .connection
            .execute_return_detail(sql, bindings.into_values())
            .await?;
        self.last_query = result.sql.clone();
        Ok(result)
    }

    /// Run the SELECT described by the current state.
    ///
    /// `fields` is a column list such as `"*"` or `"id,name"`. With native escape on, a
    /// backtick-prefixed `fields` runs `SELECT <expr>;` instead.
    pub async fn select(&mut self, fields: &str) -> Result<Vec<DatabaseRow>> {
        let state = self.take_state();

        if self.options.native_escape {
            if let Some(expr) = fields.strip_prefix(NATIVE_MARKER) {
                let sql = self.dialect.select_bare(expr);
                let bindings = self.bindings();
                return self.run_query(&sql, bindings).await;
            }
        }

        let table = self.require_table()?;
        let mut bindings = self.bindings();
        let sql = self.dialect.select_with_fields(
            table,
            fields,
            self.primary_key.as_deref(),
            state,
            &mut bindings,
            self.options.native_escape,
        )?;
        self.run_query(&sql, bindings).await
    }

    /// Run `SELECT <expr>;`, e.g. `select_native("NOW()")`. Trusted input only.
    pub async fn select_native(&mut self, expr: &str) -> Result<Vec<DatabaseRow>> {
        self.take_state();
        let sql = self.dialect.select_bare(expr);
        let bindings = self.bindings();
        self.run_query(&sql, bindings).await
    }

    /// First row of the SELECT with the limit forced to 1, or an empty row
    pub async fn get(&mut self, fields: &str) -> Result<DatabaseRow> {
        self.state.limit = Some(LimitSpec::Count(1));
        let first = self.select(fields).await?.into_iter().next();
        Ok(match first {
            Some(row) => row,
            None if self.options.grace_result => DatabaseRow::new().into_graceful(),
            None => DatabaseRow::new(),
        })
    }

    fn assignments(&self, data: &Map<String, Value>, bindings: &mut Bindings) -> Result<String> {
        let native_escape = self.options.native_escape;
        let mut parts = Vec::with_capacity(data.len());

        for (field, value) in data {
            let rendered = match value {
                Value::String(s) if native_escape && s.starts_with(NATIVE_MARKER) => {
                    s[NATIVE_MARKER.len_utf8()..].to_string()
                }
                Value::Array(items) if native_escape => {
                    let (expr, args) = match items.split_first() {
                        Some((Value::String(expr), args)) => (expr, args),
                        _ => {
                            return Err(DatabaseError::invalid_condition(format!(
                                "`{}`: expression arrays start with the expression text",
                                field
                            )))
                        }
                    };
                    let expr = expr.strip_prefix(NATIVE_MARKER).unwrap_or(expr.as_str());
                    bind_expression(field, expr, args, bindings)?
                }
                Value::Object(_) => {
                    return Err(DatabaseError::invalid_condition(format!(
                        "`{}`: cannot assign an object",
                        field
                    )))
                }
                scalar => bindings.push(DatabaseValue::from_json(scalar)?),
            };
            parts.push(format!("{}={}", field, rendered));
        }

        Ok(parts.join(","))
    }

    /// Update the rows matched by the current state.
    ///
    /// `data` maps columns to values. A backtick-prefixed string is inlined as a native
    /// expression; an array `[expr, args...]` inlines `expr` with each `?` bound to the
    /// next argument. Both forms need `native_escape`; without it an array value is an
    /// `InvalidCondition` error. On SQL Server a row-count limit renders `UPDATE TOP (n)`.
    /// An empty mapping does nothing and returns `Ok(None)`.
    pub async fn update(&mut self, data: &Value) -> Result<Option<ExecResult>> {
        let mut state = self.take_state();
        let data = match data {
            Value::Object(map) if map.is_empty() => return Ok(None),
            Value::Null => return Ok(None),
            Value::Object(map) => map,
            other => {
                return Err(DatabaseError::invalid_condition(format!(
                    "update data must be an object, got {}",
                    other
                )))
            }
        };

        let table = self.require_table()?;
        let mut bindings = self.bindings();
        let assignments = self.assignments(data, &mut bindings)?;
        let top = self.dialect.take_write_limit(&mut state)?;
        let condition = compile_condition(
            &state,
            self.dialect.as_ref(),
            &mut bindings,
            self.options.native_escape,
        )?;
        let sql = self.dialect.update(table, &assignments, &condition, top);
        self.run_execute(&sql, bindings).await.map(Some)
    }

    /// Insert one row.
    ///
    /// Accepts `{"col": value, ...}`, `{"fields": [...], "values": [...]}` or
    /// `{"values": [...]}`. An empty mapping does nothing and returns `Ok(None)`.
    pub async fn insert(&mut self, data: &Value) -> Result<Option<ExecResult>> {
        self.take_state();
        let Some((fields, values)) = split_insert(data)? else {
            return Ok(None);
        };

        let table = self.require_table()?;
        let mut bindings = self.bindings();
        let placeholders = values
            .into_iter()
            .map(|value| bindings.push(value))
            .collect::<Vec<_>>()
            .join(",");
        let sql = match fields {
            Some(fields) => self.dialect.insert_with_fields(table, &fields, &placeholders),
            None => self.dialect.insert_without_fields(table, &placeholders),
        };
        self.run_execute(&sql, bindings).await.map(Some)
    }

    /// Insert several rows with one prepared statement.
    ///
    /// Accepts an array of objects (fields taken from the first one) or
    /// `{"fields": [...], "values": [[...], ...]}`, `fields` being optional.
    pub async fn insert_many(&mut self, data: &Value) -> Result<Option<ExecResult>> {
        self.take_state();
        let Some((fields, rows)) = split_insert_many(data)? else {
            return Ok(None);
        };

        let table = self.require_table()?;
        let style = self.dialect.placeholder_style();
        let width = rows.first().map(Vec::len).unwrap_or_default();
        let placeholders = (1..=width)
            .map(|position| style.token(position))
            .collect::<Vec<_>>()
            .join(",");
        let sql = match fields {
            Some(fields) => self.dialect.insert_many_with_fields(table, &fields, &placeholders),
            None => self.dialect.insert_many_without_fields(table, &placeholders),
        };

        if self.options.debug {
            tracing::debug!(sql = %sql, rows = rows.len(), "chaindb batch statement");
        }
        let result = self.connection.execute_many_return_detail(&sql, rows).await?;
        self.last_query = result.sql.clone();
        Ok(Some(result))
    }

    /// Delete the rows matched by the current state.
    ///
    /// In strict mode a missing where-specification is refused: a warning is logged,
    /// nothing is executed and `Ok(None)` is returned. On SQL Server a row-count limit
    /// renders `DELETE TOP (n)` and a row range is a configuration error.
    pub async fn delete(&mut self) -> Result<Option<ExecResult>> {
        let mut state = self.take_state();
        let table = self.require_table()?;

        if self.options.strict && !state.has_where() {
            tracing::warn!(table = %table, "refusing to delete without a where condition");
            return Ok(None);
        }

        let top = self.dialect.take_write_limit(&mut state)?;
        let mut bindings = self.bindings();
        let condition = compile_condition(
            &state,
            self.dialect.as_ref(),
            &mut bindings,
            self.options.native_escape,
        )?;
        let sql = self.dialect.delete(table, &condition, top);
        self.run_execute(&sql, bindings).await.map(Some)
    }

    /// `field = field + step` on the rows matched by the current state
    pub async fn increase(
        &mut self,
        field: &str,
        step: impl Into<DatabaseValue>,
    ) -> Result<ExecResult> {
        self.step(field, step.into(), true).await
    }

    /// `field = field - step` on the rows matched by the current state
    pub async fn decrease(
        &mut self,
        field: &str,
        step: impl Into<DatabaseValue>,
    ) -> Result<ExecResult> {
        self.step(field, step.into(), false).await
    }

    async fn step(&mut self, field: &str, step: DatabaseValue, up: bool) -> Result<ExecResult> {
        let mut state = self.take_state();
        let table = self.require_table()?;
        let top = self.dialect.take_write_limit(&mut state)?;
        let mut bindings = self.bindings();
        let step = bindings.push(step);
        let condition = compile_condition(
            &state,
            self.dialect.as_ref(),
            &mut bindings,
            self.options.native_escape,
        )?;
        let sql = if up {
            self.dialect.increase(table, field, &step, &condition, top)
        } else {
            self.dialect.decrease(table, field, &step, &condition, top)
        };
        self.run_execute(&sql, bindings).await
    }

    /// Column names of the bound table, in table order.
    ///
    /// Cached per table when `cache_fields_name` is on. Pending query state is left alone.
    pub async fn get_fields_name(&mut self) -> Result<Vec<String>> {
        if self.table.is_empty() {
            return Ok(Vec::new());
        }
        if self.options.cache_fields_name {
            if let Some(fields) = self.fields_cache.get(&self.table) {
                return Ok(fields.clone());
            }
        }

        let sql = self.dialect.fields_name_statement(&self.table);
        self.trace(&sql, &[]);
        let result = self.connection.query_return_detail(&sql, ()).await?;
        if self.options.cache_fields_name {
            self.fields_cache
                .insert(self.table.clone(), result.column_names.clone());
        }
        Ok(result.column_names)
    }
}

/// Inline `expr`, binding one argument per `?`
fn bind_expression(
    field: &str,
    expr: &str,
    args: &[Value],
    bindings: &mut Bindings,
) -> Result<String> {
    let expected = expr.matches('?').count();
    if expected != args.len() {
        return Err(DatabaseError::invalid_condition(format!(
            "`{}`: expression `{}` has {} placeholders but {} arguments",
            field,
            expr,
            expected,
            args.len()
        )));
    }

    let mut args = args.iter();
    let mut out = String::with_capacity(expr.len());
    for ch in expr.chars() {
        if ch != '?' {
            out.push(ch);
            continue;
        }
        if let Some(arg) = args.next() {
            out.push_str(&bindings.push(DatabaseValue::from_json(arg)?));
        }
    }
    Ok(out)
}

fn string_list(value: &Value, what: &str) -> Result<Vec<String>> {
    let Value::Array(items) = value else {
        return Err(DatabaseError::invalid_condition(format!("`{}` must be an array", what)));
    };
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                DatabaseError::invalid_condition(format!("`{}` must contain strings", what))
            })
        })
        .collect()
}

fn value_list(value: &Value) -> Result<Vec<DatabaseValue>> {
    let Value::Array(items) = value else {
        return Err(DatabaseError::invalid_condition("`values` must be an array"));
    };
    items.iter().map(DatabaseValue::from_json).collect()
}

type InsertParts = (Option<String>, Vec<DatabaseValue>);
type InsertManyParts = (Option<String>, Vec<Vec<DatabaseValue>>);

/// Split single-row insert data into an optional field list and the values
fn split_insert(data: &Value) -> Result<Option<InsertParts>> {
    let map = match data {
        Value::Null => return Ok(None),
        Value::Object(map) if map.is_empty() => return Ok(None),
        Value::Object(map) => map,
        other => {
            return Err(DatabaseError::invalid_condition(format!(
                "insert data must be an object, got {}",
                other
            )))
        }
    };

    match (map.get("fields"), map.get("values")) {
        (Some(fields), Some(values)) => {
            let fields = string_list(fields, "fields")?;
            let values = value_list(values)?;
            if fields.len() != values.len() {
                return Err(DatabaseError::invalid_condition(format!(
                    "{} fields but {} values",
                    fields.len(),
                    values.len()
                )));
            }
            Ok(Some((Some(fields.join(",")), values)))
        }
        (None, Some(values)) if map.len() == 1 => Ok(Some((None, value_list(values)?))),
        _ => {
            let fields = map.keys().cloned().collect::<Vec<_>>().join(",");
            let values = map
                .values()
                .map(DatabaseValue::from_json)
                .collect::<Result<Vec<_>>>()?;
            Ok(Some((Some(fields), values)))
        }
    }
}

/// Split batch insert data into an optional field list and equally wide rows
fn split_insert_many(data: &Value) -> Result<Option<InsertManyParts>> {
    let (fields, rows) = match data {
        Value::Null => return Ok(None),
        Value::Array(items) if items.is_empty() => return Ok(None),
        Value::Array(items) => {
            let Some(Value::Object(first)) = items.first() else {
                return Err(DatabaseError::invalid_condition(
                    "insert_many rows must be objects",
                ));
            };
            let keys: Vec<&String> = first.keys().collect();
            let rows = items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    let row = item.as_object().filter(|row| row.len() == keys.len());
                    let row = row.ok_or_else(|| {
                        DatabaseError::invalid_condition(format!(
                            "row {} does not have the same fields as the first row",
                            index
                        ))
                    })?;
                    keys.iter()
                        .map(|key| match row.get(key.as_str()) {
                            Some(value) => DatabaseValue::from_json(value),
                            None => Err(DatabaseError::invalid_condition(format!(
                                "row {} lacks field `{}`",
                                index, key
                            ))),
                        })
                        .collect::<Result<Vec<_>>>()
                })
                .collect::<Result<Vec<_>>>()?;
            let fields = keys
                .iter()
                .map(|key| key.as_str())
                .collect::<Vec<_>>()
                .join(",");
            (Some(fields), rows)
        }
        Value::Object(map) => {
            let fields = map
                .get("fields")
                .map(|fields| string_list(fields, "fields"))
                .transpose()?;
            let Some(Value::Array(values)) = map.get("values") else {
                return Err(DatabaseError::invalid_condition(
                    "insert_many data needs a `values` array of rows",
                ));
            };
            let rows = values.iter().map(value_list).collect::<Result<Vec<_>>>()?;
            (fields.map(|fields| fields.join(",")), rows)
        }
        other => {
            return Err(DatabaseError::invalid_condition(format!(
                "insert_many data must be an array or an object, got {}",
                other
            )))
        }
    };

    let Some(width) = rows.first().map(Vec::len) else {
        return Ok(None);
    };
    if let Some(index) = rows.iter().position(|row| row.len() != width) {
        return Err(DatabaseError::invalid_condition(format!(
            "row {} has {} values, expected {}",
            index,
            rows[index].len(),
            width
        )));
    }
    Ok(Some((fields, rows)))
}
