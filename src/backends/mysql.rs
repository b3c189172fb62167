//! MySQL driver over mysql_async

use crate::core::{
    database::{BoundParams, ConnectConfig, Connector, Cursor, DriverRows, ExecOutcome, Session},
    database_types::DatabaseType,
    error::{DatabaseError, Result},
    value::DatabaseValue,
};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use mysql_async::prelude::*;
use mysql_async::{BinaryProtocol, Conn, Opts, Params as MyParams, QueryResult, Row, Value};
use std::collections::HashMap;

/// Opens MySQL sessions from the URL rendered by [`ConnectConfig::connection_string`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlConnector;

/// One MySQL connection
pub struct MysqlSession {
    conn: Conn,
}

fn to_mysql(value: DatabaseValue) -> Value {
    match value {
        DatabaseValue::Null => Value::NULL,
        DatabaseValue::Bool(v) => Value::Int(i64::from(v)),
        DatabaseValue::Int(v) => Value::Int(i64::from(v)),
        DatabaseValue::Long(v) => Value::Int(v),
        DatabaseValue::Float(v) => Value::Float(v),
        DatabaseValue::Double(v) => Value::Double(v),
        DatabaseValue::String(v) => Value::Bytes(v.into_bytes()),
        DatabaseValue::Bytes(v) => Value::Bytes(v),
        DatabaseValue::Timestamp(micros) => match DateTime::from_timestamp_micros(micros) {
            Some(ts) => {
                let ts = ts.naive_utc();
                Value::Date(
                    ts.year() as u16,
                    ts.month() as u8,
                    ts.day() as u8,
                    ts.hour() as u8,
                    ts.minute() as u8,
                    ts.second() as u8,
                    ts.nanosecond() / 1_000,
                )
            }
            None => Value::Int(micros),
        },
    }
}

fn from_mysql(value: Value) -> DatabaseValue {
    match value {
        Value::NULL => DatabaseValue::Null,
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => DatabaseValue::String(text),
            Err(e) => DatabaseValue::Bytes(e.into_bytes()),
        },
        Value::Int(v) => DatabaseValue::Long(v),
        Value::UInt(v) => match i64::try_from(v) {
            Ok(v) => DatabaseValue::Long(v),
            Err(_) => DatabaseValue::String(v.to_string()),
        },
        Value::Float(v) => DatabaseValue::Float(v),
        Value::Double(v) => DatabaseValue::Double(v),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        micros,
                    )
                })
                .map(|ts| DatabaseValue::Timestamp(ts.and_utc().timestamp_micros()))
                // Zero dates ('0000-00-00') have no calendar value.
                .unwrap_or_else(|| {
                    DatabaseValue::String(format!(
                        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                        year, month, day, hour, minute, second
                    ))
                })
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let hours = days * 24 + u32::from(hours);
            let sign = if negative { "-" } else { "" };
            let text = if micros > 0 {
                format!("{}{:02}:{:02}:{:02}.{:06}", sign, hours, minutes, seconds, micros)
            } else {
                format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds)
            };
            DatabaseValue::String(text)
        }
    }
}

fn to_params(params: BoundParams) -> MyParams {
    match params {
        BoundParams::Positional(values) if values.is_empty() => MyParams::Empty,
        BoundParams::Positional(values) => {
            MyParams::Positional(values.into_iter().map(to_mysql).collect())
        }
        BoundParams::Named(pairs) => MyParams::Named(
            pairs
                .into_iter()
                .map(|(name, value)| {
                    let name = name.trim_start_matches(':').as_bytes().to_vec();
                    (name, to_mysql(value))
                })
                .collect::<HashMap<_, _>>(),
        ),
    }
}

fn read_row(mut row: Row) -> Vec<DatabaseValue> {
    (0..row.len())
        .map(|index| from_mysql(row.take(index).unwrap_or(Value::NULL)))
        .collect()
}

#[async_trait]
impl Connector for MysqlConnector {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mysql
    }

    async fn connect(&self, config: &ConnectConfig) -> Result<Box<dyn Session>> {
        let url = config.connection_string(DatabaseType::Mysql);
        let opts =
            Opts::from_url(&url).map_err(|e| DatabaseError::InvalidConnectionString(e.to_string()))?;

        let conn = Conn::new(opts).await.map_err(|e| {
            DatabaseError::connection_failed_with_source(
                config.host.clone(),
                config.port_or_default(DatabaseType::Mysql),
                "cannot connect to MySQL",
                Box::new(e),
            )
        })?;

        Ok(Box::new(MysqlSession { conn }))
    }
}

#[async_trait]
impl Session for MysqlSession {
    async fn execute(&mut self, sql: &str, params: BoundParams) -> Result<ExecOutcome> {
        self.conn.exec_drop(sql, to_params(params)).await?;
        Ok(ExecOutcome {
            last_insert_id: self.conn.last_insert_id().filter(|id| *id > 0),
            rows_affected: self.conn.affected_rows(),
            row_number: None,
        })
    }

    async fn execute_many(
        &mut self,
        sql: &str,
        rows: Vec<Vec<DatabaseValue>>,
    ) -> Result<ExecOutcome> {
        let statement = self.conn.prep(sql).await?;
        let mut total = 0;
        let mut last_insert_id = None;
        for row in rows {
            self.conn
                .exec_drop(&statement, to_params(BoundParams::Positional(row)))
                .await?;
            total += self.conn.affected_rows();
            last_insert_id = self.conn.last_insert_id().filter(|id| *id > 0).or(last_insert_id);
        }
        Ok(ExecOutcome {
            last_insert_id,
            rows_affected: total,
            row_number: None,
        })
    }

    async fn query(&mut self, sql: &str, params: BoundParams) -> Result<DriverRows> {
        let mut result = self.conn.exec_iter(sql, to_params(params)).await?;
        let columns = column_names(&result);

        let mut rows = Vec::new();
        while let Some(row) = result.next().await? {
            rows.push(read_row(row));
        }
        Ok(DriverRows { columns, rows })
    }

    async fn cursor<'a>(
        &'a mut self,
        sql: &'a str,
        params: BoundParams,
    ) -> Result<Box<dyn Cursor + 'a>> {
        let result = self.conn.exec_iter(sql, to_params(params)).await?;
        let columns = column_names(&result);
        Ok(Box::new(MysqlCursor { result, columns }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.disconnect().await?;
        Ok(())
    }
}

fn column_names(result: &QueryResult<'_, 'static, BinaryProtocol>) -> Vec<String> {
    result
        .columns_ref()
        .iter()
        .map(|column| column.name_str().into_owned())
        .collect()
}

/// Streams a binary-protocol result set; an unread remainder is drained by the
/// connection before its next statement
struct MysqlCursor<'a> {
    result: QueryResult<'a, 'static, BinaryProtocol>,
    columns: Vec<String>,
}

#[async_trait]
impl Cursor for MysqlCursor<'_> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<DatabaseValue>>> {
        Ok(self.result.next().await?.map(read_row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_to_mysql() {
        assert_eq!(to_mysql(DatabaseValue::Null), Value::NULL);
        assert_eq!(to_mysql(DatabaseValue::Bool(true)), Value::Int(1));
        assert_eq!(
            to_mysql(DatabaseValue::from("abc")),
            Value::Bytes(b"abc".to_vec())
        );
        assert_eq!(
            to_mysql(DatabaseValue::Timestamp(1_000_000)),
            Value::Date(1970, 1, 1, 0, 0, 1, 0)
        );
    }

    #[test]
    fn test_values_from_mysql() {
        assert_eq!(
            from_mysql(Value::Bytes(b"abc".to_vec())),
            DatabaseValue::from("abc")
        );
        assert_eq!(
            from_mysql(Value::Bytes(vec![0xff, 0xfe])),
            DatabaseValue::Bytes(vec![0xff, 0xfe])
        );
        assert_eq!(from_mysql(Value::UInt(7)), DatabaseValue::Long(7));
        assert_eq!(
            from_mysql(Value::UInt(u64::MAX)),
            DatabaseValue::String(u64::MAX.to_string())
        );
        assert_eq!(
            from_mysql(Value::Date(1970, 1, 1, 0, 0, 1, 0)),
            DatabaseValue::Timestamp(1_000_000)
        );
        assert_eq!(
            from_mysql(Value::Date(0, 0, 0, 0, 0, 0, 0)),
            DatabaseValue::String("0000-00-00 00:00:00".to_string())
        );
        assert_eq!(
            from_mysql(Value::Time(true, 1, 2, 3, 4, 0)),
            DatabaseValue::String("-26:03:04".to_string())
        );
    }

    #[test]
    fn test_named_params_drop_prefix() {
        let params = to_params(BoundParams::Named(vec![(":id".to_string(), 1.into())]));
        match params {
            MyParams::Named(map) => {
                assert_eq!(map.get(b"id".as_slice()), Some(&Value::Int(1)));
            }
            other => panic!("expected named params, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_positional_params() {
        assert!(matches!(
            to_params(BoundParams::Positional(vec![])),
            MyParams::Empty
        ));
    }
}
