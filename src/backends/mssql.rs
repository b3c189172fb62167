//! SQL Server driver over tiberius
//!
//! Statements use `@P1..@Pn` placeholders. SQL Server reports no insert id through
//! the TDS done token, so `last_insert_id` is always `None`; callers that need it select
//! `SCOPE_IDENTITY()` themselves.

use crate::core::{
    database::{BoundParams, ConnectConfig, Connector, Cursor, DriverRows, ExecOutcome, Session},
    database_types::DatabaseType,
    error::{DatabaseError, Result},
    value::DatabaseValue,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::TryStreamExt;
use tiberius::{Client, ColumnData, Config, FromSql, Query, QueryStream, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

/// Opens SQL Server sessions from the ADO string rendered by
/// [`ConnectConfig::connection_string`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlConnector;

/// One TDS connection
pub struct MssqlSession {
    client: Client<Compat<TcpStream>>,
}

fn bind_value(query: &mut Query<'_>, value: DatabaseValue) {
    match value {
        DatabaseValue::Null => query.bind(Option::<i32>::None),
        DatabaseValue::Bool(v) => query.bind(v),
        DatabaseValue::Int(v) => query.bind(v),
        DatabaseValue::Long(v) => query.bind(v),
        DatabaseValue::Float(v) => query.bind(v),
        DatabaseValue::Double(v) => query.bind(v),
        DatabaseValue::String(v) => query.bind(v),
        DatabaseValue::Bytes(v) => query.bind(v),
        DatabaseValue::Timestamp(micros) => match DateTime::from_timestamp_micros(micros) {
            Some(ts) => query.bind(ts.naive_utc()),
            None => query.bind(micros),
        },
    }
}

fn build_query(sql: &str, params: BoundParams) -> Query<'_> {
    let mut query = Query::new(sql);
    let values = match params {
        BoundParams::Positional(values) => values,
        // @P names are positional on the wire, so named values bind in the order given.
        BoundParams::Named(pairs) => pairs.into_iter().map(|(_, value)| value).collect(),
    };
    for value in values {
        bind_value(&mut query, value);
    }
    query
}

fn timestamp(ts: Option<NaiveDateTime>) -> DatabaseValue {
    ts.map(|ts| DatabaseValue::Timestamp(ts.and_utc().timestamp_micros()))
        .unwrap_or(DatabaseValue::Null)
}

fn from_column(data: ColumnData<'static>) -> Result<DatabaseValue> {
    let value = match &data {
        ColumnData::U8(v) => v.map(|v| DatabaseValue::Int(i32::from(v))),
        ColumnData::I16(v) => v.map(|v| DatabaseValue::Int(i32::from(v))),
        ColumnData::I32(v) => v.map(DatabaseValue::Int),
        ColumnData::I64(v) => v.map(DatabaseValue::Long),
        ColumnData::F32(v) => v.map(DatabaseValue::Float),
        ColumnData::F64(v) => v.map(DatabaseValue::Double),
        ColumnData::Bit(v) => v.map(DatabaseValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| DatabaseValue::String(s.to_string())),
        ColumnData::Guid(v) => v.as_ref().map(|g| DatabaseValue::String(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| DatabaseValue::Bytes(b.to_vec())),
        ColumnData::Numeric(v) => v.as_ref().map(|n| DatabaseValue::String(n.to_string())),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|xml| DatabaseValue::String(xml.clone().into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            Some(timestamp(NaiveDateTime::from_sql(&data)?))
        }
        ColumnData::DateTimeOffset(_) => DateTime::<Utc>::from_sql(&data)?
            .map(|ts| DatabaseValue::Timestamp(ts.timestamp_micros())),
        ColumnData::Date(_) => NaiveDate::from_sql(&data)?
            .map(|date| DatabaseValue::String(date.format("%Y-%m-%d").to_string())),
        ColumnData::Time(_) => NaiveTime::from_sql(&data)?
            .map(|time| DatabaseValue::String(time.format("%H:%M:%S%.f").to_string())),
    };
    Ok(value.unwrap_or(DatabaseValue::Null))
}

fn read_row(row: Row) -> Result<Vec<DatabaseValue>> {
    row.into_iter().map(from_column).collect()
}

async fn column_names(stream: &mut QueryStream<'_>) -> Result<Vec<String>> {
    Ok(stream
        .columns()
        .await?
        .map(|columns| columns.iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default())
}

#[async_trait]
impl Connector for MssqlConnector {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }

    async fn connect(&self, config: &ConnectConfig) -> Result<Box<dyn Session>> {
        let ado = config.connection_string(DatabaseType::SqlServer);
        let tds_config = Config::from_ado_string(&ado)
            .map_err(|e| DatabaseError::InvalidConnectionString(e.to_string()))?;

        let host = config.host.clone();
        let port = config.port_or_default(DatabaseType::SqlServer);

        let tcp = TcpStream::connect(tds_config.get_addr()).await.map_err(|e| {
            DatabaseError::connection_failed_with_source(
                host.clone(),
                port,
                "cannot reach SQL Server",
                Box::new(e),
            )
        })?;
        tcp.set_nodelay(true).map_err(|e| {
            DatabaseError::connection_failed_with_source(
                host.clone(),
                port,
                "cannot configure socket",
                Box::new(e),
            )
        })?;

        let client = Client::connect(tds_config, tcp.compat_write())
            .await
            .map_err(|e| {
                DatabaseError::connection_failed_with_source(
                    host,
                    port,
                    "SQL Server login failed",
                    Box::new(e),
                )
            })?;

        Ok(Box::new(MssqlSession { client }))
    }
}

#[async_trait]
impl Session for MssqlSession {
    async fn execute(&mut self, sql: &str, params: BoundParams) -> Result<ExecOutcome> {
        let result = build_query(sql, params).execute(&mut self.client).await?;
        Ok(ExecOutcome {
            last_insert_id: None,
            rows_affected: result.total(),
            row_number: None,
        })
    }

    async fn execute_many(
        &mut self,
        sql: &str,
        rows: Vec<Vec<DatabaseValue>>,
    ) -> Result<ExecOutcome> {
        let mut total = 0;
        for row in rows {
            let result = build_query(sql, BoundParams::Positional(row))
                .execute(&mut self.client)
                .await?;
            total += result.total();
        }
        Ok(ExecOutcome {
            last_insert_id: None,
            rows_affected: total,
            row_number: None,
        })
    }

    async fn query(&mut self, sql: &str, params: BoundParams) -> Result<DriverRows> {
        let mut stream = build_query(sql, params).query(&mut self.client).await?;
        let columns = column_names(&mut stream).await?;
        let rows = stream
            .into_first_result()
            .await?
            .into_iter()
            .map(read_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(DriverRows { columns, rows })
    }

    async fn cursor<'a>(
        &'a mut self,
        sql: &'a str,
        params: BoundParams,
    ) -> Result<Box<dyn Cursor + 'a>> {
        let mut stream = build_query(sql, params).query(&mut self.client).await?;
        let columns = column_names(&mut stream).await?;
        Ok(Box::new(MssqlCursor {
            rows: stream.into_row_stream(),
            columns,
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

/// Row stream over the first result set
struct MssqlCursor<'a> {
    rows: BoxStream<'a, tiberius::Result<Row>>,
    columns: Vec<String>,
}

#[async_trait]
impl Cursor for MssqlCursor<'_> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<DatabaseValue>>> {
        match self.rows.try_next().await? {
            Some(row) => Ok(Some(read_row(row)?)),
            None => Ok(None),
        }
    }
}
