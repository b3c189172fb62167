//! Database value and row types
//!
//! [`DatabaseValue`] is what gets bound as a statement parameter and what comes back in
//! result rows. [`DatabaseRow`] keeps columns in the order the server reported them.

use super::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// Database value that can hold different types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatabaseValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Timestamp (Unix timestamp in microseconds)
    Timestamp(i64),
}

/// Returned by graceful rows for absent or null columns.
static GRACE_EMPTY: DatabaseValue = DatabaseValue::String(String::new());

impl DatabaseValue {
    /// Get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DatabaseValue::Bool(v) => Some(*v),
            DatabaseValue::Int(v) => Some(*v != 0),
            DatabaseValue::Long(v) => Some(*v != 0),
            DatabaseValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Get the value as an i32
    pub fn as_int(&self) -> Option<i32> {
        match self {
            DatabaseValue::Int(v) => Some(*v),
            DatabaseValue::Long(v) => i32::try_from(*v).ok(),
            DatabaseValue::Float(v) => Some(*v as i32),
            DatabaseValue::Double(v) => Some(*v as i32),
            DatabaseValue::String(s) => s.parse().ok(),
            DatabaseValue::Bool(v) => Some(*v as i32),
            _ => None,
        }
    }

    /// Get the value as an i64
    pub fn as_long(&self) -> Option<i64> {
        match self {
            DatabaseValue::Long(v) => Some(*v),
            DatabaseValue::Int(v) => Some(*v as i64),
            DatabaseValue::Float(v) => Some(*v as i64),
            DatabaseValue::Double(v) => Some(*v as i64),
            DatabaseValue::String(s) => s.parse().ok(),
            DatabaseValue::Bool(v) => Some(*v as i64),
            DatabaseValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an f64
    pub fn as_double(&self) -> Option<f64> {
        match self {
            DatabaseValue::Double(v) => Some(*v),
            DatabaseValue::Float(v) => Some(*v as f64),
            DatabaseValue::Int(v) => Some(*v as f64),
            DatabaseValue::Long(v) => Some(*v as f64),
            DatabaseValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Get the value as a string (zero-copy for String values)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the value as a string (with conversion)
    pub fn as_string(&self) -> String {
        match self {
            DatabaseValue::Null => "null".to_string(),
            DatabaseValue::Bool(v) => v.to_string(),
            DatabaseValue::Int(v) => v.to_string(),
            DatabaseValue::Long(v) => v.to_string(),
            DatabaseValue::Float(v) => v.to_string(),
            DatabaseValue::Double(v) => v.to_string(),
            DatabaseValue::String(s) => s.clone(),
            DatabaseValue::Bytes(b) => format!("<{} bytes>", b.len()),
            DatabaseValue::Timestamp(v) => v.to_string(),
        }
    }

    /// Get the value as bytes (zero-copy)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DatabaseValue::Bytes(b) => Some(b),
            DatabaseValue::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Interpret a timestamp value as a UTC datetime
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            DatabaseValue::Timestamp(micros) => DateTime::from_timestamp(
                micros.div_euclid(1_000_000),
                (micros.rem_euclid(1_000_000) * 1_000) as u32,
            ),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            DatabaseValue::Null => "null",
            DatabaseValue::Bool(_) => "bool",
            DatabaseValue::Int(_) => "int",
            DatabaseValue::Long(_) => "long",
            DatabaseValue::Float(_) => "float",
            DatabaseValue::Double(_) => "double",
            DatabaseValue::String(_) => "string",
            DatabaseValue::Bytes(_) => "bytes",
            DatabaseValue::Timestamp(_) => "timestamp",
        }
    }

    /// Convert a scalar JSON value into a bindable value.
    ///
    /// Arrays and objects have no scalar meaning and are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(DatabaseValue::Null),
            Value::Bool(b) => Ok(DatabaseValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(DatabaseValue::Long(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(DatabaseValue::Double(f))
                } else {
                    Err(DatabaseError::invalid_condition(format!(
                        "number {} does not fit a 64-bit column",
                        n
                    )))
                }
            }
            Value::String(s) => Ok(DatabaseValue::String(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(DatabaseError::invalid_condition(format!(
                "expected a scalar value, got {}",
                value
            ))),
        }
    }

    /// Render the value as a SQL literal, for echoing statements only.
    ///
    /// Never feed the result back to the server: parameters travel separately.
    pub fn display_literal(&self) -> String {
        match self {
            DatabaseValue::Null => "NULL".to_string(),
            DatabaseValue::Bool(v) => u8::from(*v).to_string(),
            DatabaseValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            DatabaseValue::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02X}", byte)).collect();
                format!("X'{}'", hex)
            }
            other => other.as_string(),
        }
    }
}

impl fmt::Display for DatabaseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<bool> for DatabaseValue {
    fn from(v: bool) -> Self {
        DatabaseValue::Bool(v)
    }
}

impl From<i32> for DatabaseValue {
    fn from(v: i32) -> Self {
        DatabaseValue::Int(v)
    }
}

impl From<i64> for DatabaseValue {
    fn from(v: i64) -> Self {
        DatabaseValue::Long(v)
    }
}

impl From<f32> for DatabaseValue {
    fn from(v: f32) -> Self {
        DatabaseValue::Float(v)
    }
}

impl From<f64> for DatabaseValue {
    fn from(v: f64) -> Self {
        DatabaseValue::Double(v)
    }
}

impl From<String> for DatabaseValue {
    fn from(v: String) -> Self {
        DatabaseValue::String(v)
    }
}

impl From<&str> for DatabaseValue {
    fn from(v: &str) -> Self {
        DatabaseValue::String(v.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(v: Vec<u8>) -> Self {
        DatabaseValue::Bytes(v)
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(v: DateTime<Utc>) -> Self {
        DatabaseValue::Timestamp(v.timestamp_micros())
    }
}

impl<T: Into<DatabaseValue>> From<Option<T>> for DatabaseValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// Column name -> value mapping in column order, used for inserts and updates
pub type Record = IndexMap<String, DatabaseValue>;

/// A result row: columns in server order, accessible by name.
///
/// A graceful row (see `ChainOptions::grace_result`) answers absent and null columns with
/// an empty string instead of failing, which keeps templating code free of null checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatabaseRow {
    values: Record,
    #[serde(skip)]
    graceful: bool,
}

impl DatabaseRow {
    /// Create an empty strict row
    pub fn new() -> Self {
        Self::default()
    }

    /// Zip column names with one row of driver values
    pub fn from_columns(columns: &[String], values: Vec<DatabaseValue>) -> Self {
        Self {
            values: columns.iter().cloned().zip(values).collect(),
            graceful: false,
        }
    }

    /// Switch this row to graceful access
    #[must_use]
    pub fn into_graceful(mut self) -> Self {
        self.graceful = true;
        self
    }

    /// Whether absent or null columns read as empty strings
    pub fn is_graceful(&self) -> bool {
        self.graceful
    }

    /// Set a column value, keeping its position if it already exists
    pub fn insert(&mut self, column: impl Into<String>, value: DatabaseValue) {
        self.values.insert(column.into(), value);
    }

    /// Raw lookup, no graceful substitution
    pub fn get(&self, column: &str) -> Option<&DatabaseValue> {
        self.values.get(column)
    }

    /// Field access that honours the row's mode.
    ///
    /// Strict rows fail with [`DatabaseError::ColumnNotFound`] on an absent column and
    /// return nulls as stored. Graceful rows return an empty string for both.
    pub fn column(&self, column: &str) -> Result<&DatabaseValue> {
        match self.values.get(column) {
            Some(value) if self.graceful && value.is_null() => Ok(&GRACE_EMPTY),
            Some(value) => Ok(value),
            None if self.graceful => Ok(&GRACE_EMPTY),
            None => Err(DatabaseError::ColumnNotFound(column.to_string())),
        }
    }

    /// Whether the row has the column
    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Column names in order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterate `(column, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatabaseValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns (e.g. `get()` on an empty result)
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Take the underlying ordered map
    pub fn into_record(self) -> Record {
        self.values
    }
}

impl Index<&str> for DatabaseRow {
    type Output = DatabaseValue;

    /// Panics on an absent column unless the row is graceful.
    fn index(&self, column: &str) -> &DatabaseValue {
        match self.column(column) {
            Ok(value) => value,
            Err(_) => panic!("no column named `{}` in row", column),
        }
    }
}

impl From<Record> for DatabaseRow {
    fn from(values: Record) -> Self {
        Self {
            values,
            graceful: false,
        }
    }
}

impl IntoIterator for DatabaseRow {
    type Item = (String, DatabaseValue);
    type IntoIter = indexmap::map::IntoIter<String, DatabaseValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// Output of a row-returning statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Rows in server order
    pub data: Vec<DatabaseRow>,
    /// Column names as reported by the driver, even when no rows came back
    pub column_names: Vec<String>,
    /// Display form of the statement; empty unless SQL echo is enabled
    pub sql: String,
}

/// Output of a write statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Identifier generated by the last insert, when the driver reports one
    pub last_insert_id: Option<u64>,
    /// Rows affected
    pub row_count: u64,
    /// Cursor row number after execution, when the driver tracks one
    pub row_number: Option<u64>,
    /// Display form of the statement; empty unless SQL echo is enabled
    pub sql: String,
}
