//! Condition compiler
//!
//! A where-specification comes in three shapes:
//!
//! - a raw SQL fragment, emitted after `WHERE` untouched;
//! - a JSON object mapping field names to values or operator arrays;
//! - typed [`Clause`]s built in Rust.
//!
//! JSON objects are parsed into [`Clause`]s first, so rendering only ever sees the typed
//! form. Every non-native value goes through [`Bindings`], which hands out the placeholder
//! token for the value's position; the placeholder count in the rendered text therefore
//! always equals the number of bound values.
//!
//! # Object grammar
//!
//! | value                         | rendered                    | bound      |
//! |-------------------------------|-----------------------------|------------|
//! | `"Alice"`                     | `name=?`                    | `"Alice"`  |
//! | `[">=", 18]`                  | `age>=?`                    | `18`       |
//! | `["in", [1, 2, 3]]`           | `status in (1,2,3)`         | -          |
//! | `["is not", null]`            | `deleted is not NULL`       | -          |
//! | `["between", 1, 9]`           | `id BETWEEN ? AND ?`        | `1`, `9`   |
//! | ``"`NOW()"``                  | `created=NOW()`             | -          |
//! | ``["`DATE_SUB(NOW(), INTERVAL ? DAY)", 7]`` | `d=DATE_SUB(NOW(), INTERVAL 7 DAY)` | - |
//! | `["or", ...]`                 | same, joined to the next clause with `OR` | |
//!
//! Values starting with a backtick are native expressions: they are inlined verbatim, and
//! so are membership lists. Both are trusted-input paths and must never carry user data.
//! [`ChainOptions::native_escape`](crate::ChainOptions) turns the backtick marker off.

use super::database_types::PlaceholderStyle;
use super::dialect::DialectGenerator;
use super::error::{DatabaseError, Result};
use super::value::DatabaseValue;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Prefix marking a native SQL expression
pub const NATIVE_MARKER: char = '`';

/// Boolean connector placed after a clause
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Conjunction {
    /// `AND`
    #[default]
    And,
    /// `OR`
    Or,
}

impl Conjunction {
    /// SQL keyword
    pub fn keyword(&self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

/// Right-hand side of an equality or comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Bound as a parameter
    Param(DatabaseValue),
    /// Inlined verbatim
    Native(String),
}

/// What a clause tests
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `field=operand`
    Equality(Operand),
    /// `field<sign>operand` for `<`, `<=`, `>`, `>=`, `!=` and friends
    Comparison { sign: String, operand: Operand },
    /// `field in (list)`, `field not in (list)`, `field is not literal`; never bound
    Membership {
        sign: String,
        literal: String,
        grouped: bool,
    },
    /// `field BETWEEN lower AND upper`
    Range {
        lower: DatabaseValue,
        upper: DatabaseValue,
    },
}

/// One `field <predicate>` term of a where-clause
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    /// Column or expression on the left
    pub field: String,
    /// The test
    pub predicate: Predicate,
    /// Connector to the following clause
    pub conjunction: Conjunction,
}

impl Clause {
    fn new(field: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            field: field.into(),
            predicate,
            conjunction: Conjunction::And,
        }
    }

    /// `field=?`
    pub fn eq(field: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        Self::new(field, Predicate::Equality(Operand::Param(value.into())))
    }

    /// `field<sign>?`
    pub fn cmp(
        field: impl Into<String>,
        sign: impl Into<String>,
        value: impl Into<DatabaseValue>,
    ) -> Self {
        Self::new(
            field,
            Predicate::Comparison {
                sign: sign.into(),
                operand: Operand::Param(value.into()),
            },
        )
    }

    /// `field=<expr>` with `expr` inlined unparameterized.
    ///
    /// Trusted input only.
    pub fn native(field: impl Into<String>, expr: impl Into<String>) -> Self {
        Self::new(field, Predicate::Equality(Operand::Native(expr.into())))
    }

    /// `field in (a,b,c)` with the items inlined as raw literals.
    ///
    /// Trusted input only: strings are not quoted.
    pub fn is_in<I, V>(field: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        Self::membership(field, "in", items)
    }

    /// `field not in (a,b,c)`, raw literals as for [`Clause::is_in`]
    pub fn not_in<I, V>(field: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        Self::membership(field, "not in", items)
    }

    fn membership<I, V>(field: impl Into<String>, sign: &str, items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        let literal = items
            .into_iter()
            .map(|item| raw_value_literal(&item.into()))
            .collect::<Vec<_>>()
            .join(",");
        Self::new(
            field,
            Predicate::Membership {
                sign: sign.to_string(),
                literal,
                grouped: true,
            },
        )
    }

    /// `field BETWEEN ? AND ?`
    pub fn between(
        field: impl Into<String>,
        lower: impl Into<DatabaseValue>,
        upper: impl Into<DatabaseValue>,
    ) -> Self {
        Self::new(
            field,
            Predicate::Range {
                lower: lower.into(),
                upper: upper.into(),
            },
        )
    }

    /// Join this clause to the next one with `OR`
    #[must_use]
    pub fn or(mut self) -> Self {
        self.conjunction = Conjunction::Or;
        self
    }

    fn render(&self, bindings: &mut Bindings) -> String {
        let field = &self.field;
        match &self.predicate {
            Predicate::Equality(operand) => format!("{}={}", field, bindings.operand(operand)),
            Predicate::Comparison { sign, operand } => {
                format!("{}{}{}", field, sign, bindings.operand(operand))
            }
            Predicate::Membership {
                sign,
                literal,
                grouped: true,
            } => format!("{} {} ({})", field, sign, literal),
            Predicate::Membership { sign, literal, .. } => {
                format!("{} {} {}", field, sign, literal)
            }
            Predicate::Range { lower, upper } => {
                let lower = bindings.push(lower.clone());
                let upper = bindings.push(upper.clone());
                format!("{} BETWEEN {} AND {}", field, lower, upper)
            }
        }
    }
}

/// A where-specification as handed to the builder
#[derive(Debug, Clone, PartialEq)]
pub enum WhereSpec {
    /// SQL fragment emitted verbatim after `WHERE`
    Raw(String),
    /// JSON object (or string, treated as raw), parsed when compiled
    Json(Value),
    /// Typed clauses
    Clauses(Vec<Clause>),
}

impl WhereSpec {
    /// Whether this would render no where-clause at all
    pub fn is_empty(&self) -> bool {
        match self {
            WhereSpec::Raw(raw) => raw.trim().is_empty(),
            WhereSpec::Json(Value::Null) => true,
            WhereSpec::Json(Value::String(raw)) => raw.trim().is_empty(),
            WhereSpec::Json(Value::Object(map)) => map.is_empty(),
            WhereSpec::Json(_) => false,
            WhereSpec::Clauses(clauses) => clauses.is_empty(),
        }
    }
}

impl From<&str> for WhereSpec {
    fn from(raw: &str) -> Self {
        WhereSpec::Raw(raw.to_string())
    }
}

impl From<String> for WhereSpec {
    fn from(raw: String) -> Self {
        WhereSpec::Raw(raw)
    }
}

impl From<Value> for WhereSpec {
    fn from(value: Value) -> Self {
        WhereSpec::Json(value)
    }
}

impl From<Vec<Clause>> for WhereSpec {
    fn from(clauses: Vec<Clause>) -> Self {
        WhereSpec::Clauses(clauses)
    }
}

impl From<Clause> for WhereSpec {
    fn from(clause: Clause) -> Self {
        WhereSpec::Clauses(vec![clause])
    }
}

/// Ordered parameter list plus the placeholder spelling of the target engine
#[derive(Debug, Clone)]
pub struct Bindings {
    style: PlaceholderStyle,
    values: Vec<DatabaseValue>,
}

impl Bindings {
    /// Empty list for the given placeholder style
    pub fn new(style: PlaceholderStyle) -> Self {
        Self {
            style,
            values: Vec::new(),
        }
    }

    /// Bind a value and return the placeholder that refers to it
    pub fn push(&mut self, value: DatabaseValue) -> String {
        self.values.push(value);
        self.style.token(self.values.len())
    }

    fn operand(&mut self, operand: &Operand) -> String {
        match operand {
            Operand::Param(value) => self.push(value.clone()),
            Operand::Native(expr) => expr.clone(),
        }
    }

    /// Placeholder spelling
    pub fn style(&self) -> PlaceholderStyle {
        self.style
    }

    /// Values bound so far
    pub fn values(&self) -> &[DatabaseValue] {
        &self.values
    }

    /// Number of values bound so far
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was bound
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Take the values
    pub fn into_values(self) -> Vec<DatabaseValue> {
        self.values
    }
}

/// Kind of join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        })
    }
}

/// The single active join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub on: String,
}

/// A parsed limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// First `n` rows
    Count(u64),
    /// `m,n` range; MySQL-family reads it as offset and count, SQL Server as rows `m..=n`
    Range(u64, u64),
}

impl FromStr for Limit {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DatabaseError::configuration(format!("invalid limit `{}`", s));
        match s.split_once(',') {
            Some((m, n)) => {
                let m = m.trim().parse().map_err(|_| invalid())?;
                let n = n.trim().parse().map_err(|_| invalid())?;
                Ok(Limit::Range(m, n))
            }
            None => s.trim().parse().map(Limit::Count).map_err(|_| invalid()),
        }
    }
}

/// A limit as handed to the builder: a row count or `"m,n"` text, parsed when compiled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitSpec {
    Count(u64),
    Text(String),
}

impl LimitSpec {
    /// Parse into a [`Limit`]
    pub fn resolve(&self) -> Result<Limit> {
        match self {
            LimitSpec::Count(n) => Ok(Limit::Count(*n)),
            LimitSpec::Text(text) => text.parse(),
        }
    }
}

impl From<u64> for LimitSpec {
    fn from(n: u64) -> Self {
        LimitSpec::Count(n)
    }
}

impl From<u32> for LimitSpec {
    fn from(n: u32) -> Self {
        LimitSpec::Count(u64::from(n))
    }
}

impl From<usize> for LimitSpec {
    fn from(n: usize) -> Self {
        LimitSpec::Count(n as u64)
    }
}

impl From<i32> for LimitSpec {
    fn from(n: i32) -> Self {
        match u64::try_from(n) {
            Ok(n) => LimitSpec::Count(n),
            Err(_) => LimitSpec::Text(n.to_string()),
        }
    }
}

impl From<&str> for LimitSpec {
    fn from(text: &str) -> Self {
        LimitSpec::Text(text.to_string())
    }
}

impl From<String> for LimitSpec {
    fn from(text: String) -> Self {
        LimitSpec::Text(text)
    }
}

/// Mutable state a builder accumulates between terminal operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    pub where_spec: Option<WhereSpec>,
    pub join: Option<Join>,
    pub order_by: Option<String>,
    pub limit: Option<LimitSpec>,
    pub group_by: Option<String>,
}

impl QueryState {
    /// Whether a non-empty where-specification is bound
    pub fn has_where(&self) -> bool {
        self.where_spec.as_ref().is_some_and(|spec| !spec.is_empty())
    }
}

fn native_body(value: &Value, native_escape: bool) -> Option<&str> {
    match value {
        Value::String(s) if native_escape => s.strip_prefix(NATIVE_MARKER),
        _ => None,
    }
}

/// Render a JSON scalar verbatim: strings unquoted, `null` as `NULL`
fn raw_json_literal(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Array(_) | Value::Object(_) => Err(DatabaseError::invalid_condition(format!(
            "cannot inline {} as a literal",
            value
        ))),
    }
}

fn raw_value_literal(value: &DatabaseValue) -> String {
    match value {
        DatabaseValue::Null => "NULL".to_string(),
        other => other.as_string(),
    }
}

/// Replace each `?` in a native expression with the next argument, inlined raw
fn substitute_native(expr: &str, args: &[&Value]) -> Result<String> {
    let mut out = String::with_capacity(expr.len());
    let mut args = args.iter();
    for ch in expr.chars() {
        if ch != '?' {
            out.push(ch);
            continue;
        }
        let arg = args.next().ok_or_else(|| {
            DatabaseError::invalid_condition(format!(
                "native expression `{}` has more placeholders than arguments",
                expr
            ))
        })?;
        out.push_str(&raw_json_literal(arg)?);
    }
    if args.next().is_some() {
        return Err(DatabaseError::invalid_condition(format!(
            "native expression `{}` has more arguments than placeholders",
            expr
        )));
    }
    Ok(out)
}

fn scalar_clause(field: &str, value: &Value, native_escape: bool) -> Result<Clause> {
    if let Some(expr) = native_body(value, native_escape) {
        return Ok(Clause::native(field, expr));
    }
    Ok(Clause::eq(field, DatabaseValue::from_json(value)?))
}

fn is_operator(sign: &str) -> bool {
    let sign = sign.trim();
    sign.starts_with(['<', '>', '!'])
        || matches!(
            sign.to_ascii_lowercase().as_str(),
            "in" | "not in" | "is not" | "between"
        )
}

fn array_clause(field: &str, items: &[Value], native_escape: bool) -> Result<Clause> {
    let invalid = |why: &str| {
        DatabaseError::invalid_condition(format!("`{}`: {}", field, why))
    };

    let mut items: Vec<&Value> = items.iter().collect();
    let mut conjunction = Conjunction::And;
    if items
        .first()
        .and_then(|v| v.as_str())
        .is_some_and(|s| s.trim().eq_ignore_ascii_case("or"))
    {
        conjunction = Conjunction::Or;
        items.remove(0);
    }

    let clause = match items.as_slice() {
        [] => return Err(invalid("empty operator array")),
        [single] if single.as_str().is_some_and(is_operator) => {
            return Err(invalid("operator without an operand"))
        }
        [single] => scalar_clause(field, single, native_escape)?,
        [first, rest @ ..] => {
            let sign = first.as_str().map(str::trim).unwrap_or("");
            let lowered = sign.to_ascii_lowercase();

            if sign.starts_with(['<', '>', '!']) {
                let operand = match (native_body(rest[0], native_escape), rest) {
                    (Some(expr), _) => Operand::Native(substitute_native(expr, &rest[1..])?),
                    (None, [value]) => Operand::Param(DatabaseValue::from_json(value)?),
                    (None, _) => {
                        return Err(invalid(&format!("`{}` takes exactly one operand", sign)))
                    }
                };
                Clause::new(
                    field,
                    Predicate::Comparison {
                        sign: sign.to_string(),
                        operand,
                    },
                )
            } else if matches!(lowered.as_str(), "in" | "not in" | "is not") {
                let [operand] = rest else {
                    return Err(invalid(&format!("`{}` takes exactly one operand", sign)));
                };
                let (literal, grouped) = match *operand {
                    Value::Array(list) => (
                        list.iter()
                            .map(raw_json_literal)
                            .collect::<Result<Vec<_>>>()?
                            .join(","),
                        true,
                    ),
                    other => (raw_json_literal(other)?, false),
                };
                Clause::new(
                    field,
                    Predicate::Membership {
                        sign: sign.to_string(),
                        literal,
                        grouped,
                    },
                )
            } else if lowered == "between" {
                let [lower, upper] = rest else {
                    return Err(invalid("between takes exactly two bounds"));
                };
                Clause::between(
                    field,
                    DatabaseValue::from_json(lower)?,
                    DatabaseValue::from_json(upper)?,
                )
            } else if let Some(expr) = native_body(first, native_escape) {
                Clause::native(field, substitute_native(expr, rest)?)
            } else {
                return Err(invalid(&format!("unknown operator `{}`", sign)));
            }
        }
    };

    Ok(Clause {
        conjunction,
        ..clause
    })
}

/// Parse a JSON where-object into clauses, keeping the object's key order
pub fn parse_where_object(value: &Value, native_escape: bool) -> Result<Vec<Clause>> {
    let Value::Object(map) = value else {
        return Err(DatabaseError::invalid_condition(format!(
            "where-specification must be an object or a string, got {}",
            value
        )));
    };

    map.iter()
        .map(|(field, value)| match value {
            Value::Array(items) => array_clause(field, items, native_escape),
            Value::Object(_) => Err(DatabaseError::invalid_condition(format!(
                "`{}`: nested objects are not supported",
                field
            ))),
            scalar => scalar_clause(field, scalar, native_escape),
        })
        .collect()
}

/// Remove the connector that follows the last clause.
///
/// Strips exactly the last clause's keyword (3 bytes for `AND`, 2 for `OR`) and the
/// space before it. A body not ending in that keyword is returned as is.
pub fn trim_trailing_connector(body: &str, last: Conjunction) -> &str {
    match body.strip_suffix(last.keyword()) {
        Some(rest) => rest.strip_suffix(' ').unwrap_or(rest),
        None => body,
    }
}

/// Render clauses without the `WHERE` keyword
pub fn render_clauses(clauses: &[Clause], bindings: &mut Bindings) -> String {
    let Some(last) = clauses.last() else {
        return String::new();
    };

    let mut body = String::new();
    for clause in clauses {
        if !body.is_empty() {
            body.push(' ');
        }
        body.push_str(&clause.render(bindings));
        body.push(' ');
        body.push_str(clause.conjunction.keyword());
    }
    trim_trailing_connector(&body, last.conjunction).to_string()
}

/// Render a where-specification without the `WHERE` keyword; empty when nothing is bound
pub fn compile_where_body(
    spec: Option<&WhereSpec>,
    bindings: &mut Bindings,
    native_escape: bool,
) -> Result<String> {
    match spec {
        None => Ok(String::new()),
        Some(WhereSpec::Raw(raw)) | Some(WhereSpec::Json(Value::String(raw))) => {
            Ok(raw.trim().to_string())
        }
        Some(WhereSpec::Json(Value::Null)) => Ok(String::new()),
        Some(WhereSpec::Json(value)) => {
            let clauses = parse_where_object(value, native_escape)?;
            Ok(render_clauses(&clauses, bindings))
        }
        Some(WhereSpec::Clauses(clauses)) => Ok(render_clauses(clauses, bindings)),
    }
}

/// Render a where-specification as `WHERE ...`, or an empty string
pub fn compile_where(
    spec: Option<&WhereSpec>,
    bindings: &mut Bindings,
    native_escape: bool,
) -> Result<String> {
    let body = compile_where_body(spec, bindings, native_escape)?;
    if body.is_empty() {
        Ok(body)
    } else {
        Ok(format!("WHERE {}", body))
    }
}

/// Compile a where-specification into its fragment and parameter list
///
/// ```
/// use chaindb::core::condition::{parse_where, WhereSpec};
/// use chaindb::{DatabaseValue, PlaceholderStyle};
/// use serde_json::json;
///
/// let spec = WhereSpec::from(json!({"age": [">=", 18], "name": "Alice"}));
/// let (sql, params) = parse_where(&spec, PlaceholderStyle::QuestionMark, true).unwrap();
/// assert_eq!(sql, "WHERE age>=? AND name=?");
/// assert_eq!(params, vec![DatabaseValue::Long(18), DatabaseValue::from("Alice")]);
/// ```
pub fn parse_where(
    spec: &WhereSpec,
    style: PlaceholderStyle,
    native_escape: bool,
) -> Result<(String, Vec<DatabaseValue>)> {
    let mut bindings = Bindings::new(style);
    let sql = compile_where(Some(spec), &mut bindings, native_escape)?;
    Ok((sql, bindings.into_values()))
}

fn push_part(sql: &mut String, part: &str) {
    if !sql.is_empty() {
        sql.push(' ');
    }
    sql.push_str(part);
}

/// Compile join, where, grouping, ordering and limit into the text that follows
/// `FROM <table>`.
///
/// Parts are emitted in standard SQL order. The limit goes through
/// [`DialectGenerator::limit_clause`]; dialects that paginate in the SELECT prefix
/// return `None` there.
pub fn compile_condition<D: DialectGenerator + ?Sized>(
    state: &QueryState,
    dialect: &D,
    bindings: &mut Bindings,
    native_escape: bool,
) -> Result<String> {
    let mut sql = String::new();

    if let Some(join) = &state.join {
        push_part(&mut sql, &format!("{} {} ON {}", join.kind, join.table, join.on));
    }

    let where_sql = compile_where(state.where_spec.as_ref(), bindings, native_escape)?;
    if !where_sql.is_empty() {
        push_part(&mut sql, &where_sql);
    }

    if let Some(group_by) = state.group_by.as_deref().filter(|g| !g.is_empty()) {
        push_part(&mut sql, &format!("GROUP BY {}", group_by));
    }

    if let Some(order_by) = state.order_by.as_deref().filter(|o| !o.is_empty()) {
        push_part(&mut sql, &format!("ORDER BY {}", order_by));
    }

    if let Some(limit) = &state.limit {
        if let Some(clause) = dialect.limit_clause(&limit.resolve()?) {
            push_part(&mut sql, &clause);
        }
    }

    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::database_types::DatabaseType;
    use crate::core::dialect::create_dialect;
    use serde_json::json;

    fn compile(value: Value) -> (String, Vec<DatabaseValue>) {
        parse_where(&WhereSpec::from(value), PlaceholderStyle::QuestionMark, true).unwrap()
    }

    #[test]
    fn test_comparison_and_equality() {
        let (sql, params) = compile(json!({"age": [">=", 18], "name": "Alice"}));
        assert_eq!(sql, "WHERE age>=? AND name=?");
        assert_eq!(params, vec![DatabaseValue::Long(18), DatabaseValue::from("Alice")]);
    }

    #[test]
    fn test_in_list_is_inlined() {
        let (sql, params) = compile(json!({"status": ["in", [1, 2, 3]]}));
        assert_eq!(sql, "WHERE status in (1,2,3)");
        assert!(params.is_empty());

        let (sql, _) = compile(json!({"kind": ["not in", ["a", "b"]]}));
        assert_eq!(sql, "WHERE kind not in (a,b)");

        let (sql, params) = compile(json!({"deleted_at": ["is not", null]}));
        assert_eq!(sql, "WHERE deleted_at is not NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_between_binds_two_values_in_order() {
        let (sql, params) = compile(json!({"a": 1, "id": ["between", 10, 20], "b": 2}));
        assert_eq!(sql, "WHERE a=? AND id BETWEEN ? AND ? AND b=?");
        assert_eq!(
            params,
            vec![
                DatabaseValue::Long(1),
                DatabaseValue::Long(10),
                DatabaseValue::Long(20),
                DatabaseValue::Long(2)
            ]
        );
    }

    #[test]
    fn test_or_marker_joins_with_next_clause() {
        let (sql, params) = compile(json!({"a": ["or", 1], "b": 2}));
        assert_eq!(sql, "WHERE a=? OR b=?");
        assert_eq!(params.len(), 2);

        let (sql, _) = compile(json!({"a": ["or", ">", 1], "b": 2, "c": 3}));
        assert_eq!(sql, "WHERE a>? OR b=? AND c=?");
    }

    #[test]
    fn test_trailing_or_is_trimmed_exactly() {
        let (sql, _) = compile(json!({"a": 1, "b": ["or", 2]}));
        assert_eq!(sql, "WHERE a=? AND b=?");

        // An OR-marked first clause followed by a non-OR operator clause.
        let (sql, _) = compile(json!({"b": ["or", 2], "c": [">", 1]}));
        assert_eq!(sql, "WHERE b=? OR c>?");
    }

    #[test]
    fn test_trim_trailing_connector() {
        assert_eq!(trim_trailing_connector("a=? AND", Conjunction::And), "a=?");
        assert_eq!(trim_trailing_connector("a=? OR", Conjunction::Or), "a=?");
        assert_eq!(trim_trailing_connector("a=? AND b=?", Conjunction::Or), "a=? AND b=?");
        assert_eq!(
            trim_trailing_connector("a=? OR b=? AND", Conjunction::And),
            "a=? OR b=?"
        );
    }

    #[test]
    fn test_native_values_are_inlined() {
        let (sql, params) = compile(json!({"created": "`NOW()", "id": 5}));
        assert_eq!(sql, "WHERE created=NOW() AND id=?");
        assert_eq!(params, vec![DatabaseValue::Long(5)]);

        let (sql, params) = compile(json!({"d": ["`DATE_SUB(NOW(), INTERVAL ? DAY)", 7]}));
        assert_eq!(sql, "WHERE d=DATE_SUB(NOW(), INTERVAL 7 DAY)");
        assert!(params.is_empty());

        let (sql, params) = compile(json!({"d": ["<", "`DATE_ADD(?, INTERVAL 1 DAY)", "2024-01-01"]}));
        assert_eq!(sql, "WHERE d<DATE_ADD(2024-01-01, INTERVAL 1 DAY)");
        assert!(params.is_empty());
    }

    #[test]
    fn test_native_escape_disabled_binds_backtick_strings() {
        let spec = WhereSpec::from(json!({"note": "`NOW()"}));
        let (sql, params) = parse_where(&spec, PlaceholderStyle::QuestionMark, false).unwrap();
        assert_eq!(sql, "WHERE note=?");
        assert_eq!(params, vec![DatabaseValue::from("`NOW()")]);
    }

    #[test]
    fn test_native_with_missing_arguments_fails() {
        let spec = WhereSpec::from(json!({"d": ["`FN(?, ?)", 1]}));
        let err = parse_where(&spec, PlaceholderStyle::QuestionMark, true).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidCondition(_)));
    }

    #[test]
    fn test_raw_string_is_verbatim() {
        let (sql, params) = compile(json!(" id > 3 AND name IS NULL"));
        assert_eq!(sql, "WHERE id > 3 AND name IS NULL");
        assert!(params.is_empty());

        let spec = WhereSpec::from("score = 10");
        let (sql, _) = parse_where(&spec, PlaceholderStyle::QuestionMark, true).unwrap();
        assert_eq!(sql, "WHERE score = 10");
    }

    #[test]
    fn test_empty_specs_render_nothing() {
        assert_eq!(compile(json!({})), (String::new(), vec![]));
        assert_eq!(compile(json!(null)), (String::new(), vec![]));
        assert!(WhereSpec::from("  ").is_empty());
        assert!(WhereSpec::Clauses(vec![]).is_empty());
    }

    #[test]
    fn test_malformed_specs_are_rejected() {
        for bad in [
            json!([1, 2]),
            json!({"a": []}),
            json!({"a": {"b": 1}}),
            json!({"a": ["between", 1]}),
            json!({"a": ["like", "x", "y"]}),
            json!({"a": [">", [1, 2]]}),
        ] {
            let spec = WhereSpec::from(bad.clone());
            assert!(
                parse_where(&spec, PlaceholderStyle::QuestionMark, true).is_err(),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn test_operand_count_mismatches_are_rejected() {
        for bad in [
            json!({"a": [">", 1, 2, 3]}),
            json!({"a": ["in", [1], [2]]}),
            json!({"a": ["`F(?)", 1, 2]}),
            json!({"a": ["<", "`F(?)", 1, 2]}),
            json!({"a": ["in"]}),
            json!({"a": ["or", ">="]}),
            json!({"a": ["between"]}),
        ] {
            let spec = WhereSpec::from(bad.clone());
            let err = parse_where(&spec, PlaceholderStyle::QuestionMark, true).unwrap_err();
            assert!(
                matches!(err, DatabaseError::InvalidCondition(_)),
                "{} gave {:?}",
                bad,
                err
            );
        }

        let (sql, params) = compile(json!({"a": ["<", "`F(?)", 1], "b": ["x"]}));
        assert_eq!(sql, "WHERE a<F(1) AND b=?");
        assert_eq!(params, vec![DatabaseValue::from("x")]);
    }

    #[test]
    fn test_typed_clauses() {
        let spec = WhereSpec::from(vec![
            Clause::cmp("age", ">", 30).or(),
            Clause::eq("name", "Bob"),
            Clause::is_in("status", [1, 2]),
            Clause::between("score", 1.5, 9.5),
        ]);
        let (sql, params) = parse_where(&spec, PlaceholderStyle::AtNumbered, true).unwrap();
        assert_eq!(
            sql,
            "WHERE age>@P1 OR name=@P2 AND status in (1,2) AND score BETWEEN @P3 AND @P4"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_limit_parsing() {
        assert_eq!("10".parse::<Limit>().unwrap(), Limit::Count(10));
        assert_eq!(" 5, 10 ".parse::<Limit>().unwrap(), Limit::Range(5, 10));
        assert!("ten".parse::<Limit>().is_err());
        assert!("5,".parse::<Limit>().is_err());
        assert_eq!(LimitSpec::from(-1).resolve().unwrap_err().kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_compile_condition_order() {
        let dialect = create_dialect(DatabaseType::Mysql);
        let state = QueryState {
            where_spec: Some(WhereSpec::from(json!({"u.age": [">", 18]}))),
            join: Some(Join {
                kind: JoinKind::Left,
                table: "orders o".to_string(),
                on: "o.user_id = u.id".to_string(),
            }),
            order_by: Some("u.id DESC".to_string()),
            limit: Some(LimitSpec::from("5,10")),
            group_by: Some("u.id".to_string()),
        };
        let mut bindings = Bindings::new(PlaceholderStyle::QuestionMark);
        let sql = compile_condition(&state, dialect.as_ref(), &mut bindings, true).unwrap();
        assert_eq!(
            sql,
            "LEFT JOIN orders o ON o.user_id = u.id WHERE u.age>? GROUP BY u.id ORDER BY u.id DESC LIMIT 5,10"
        );
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn test_compile_condition_sqlserver_omits_limit() {
        let dialect = create_dialect(DatabaseType::SqlServer);
        let state = QueryState {
            limit: Some(LimitSpec::from(3)),
            ..Default::default()
        };
        let mut bindings = Bindings::new(PlaceholderStyle::AtNumbered);
        let sql = compile_condition(&state, dialect.as_ref(), &mut bindings, true).unwrap();
        assert_eq!(sql, "");
    }
}
