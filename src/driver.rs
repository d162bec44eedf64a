//! Database driver abstraction and the Tiberius-backed implementation
//!
//! The engine only sees the [`Driver`]/[`Connection`] traits: connect, query
//! with bound parameters, execute, transaction control, close. Connections
//! are opened fresh per call and never pooled at this layer.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tiberius::{AuthMethod, Client, ColumnData, EncryptionLevel, FromSql, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::config::ConnectionDescriptor;
use crate::types::{CellValue, DbError, DbResult, RecordSet};

/// Transaction isolation requested by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// One live database session.
#[async_trait]
pub trait Connection: Send {
    /// Run a statement expected to produce rows. `params` bind to `@P1`,
    /// `@P2`, ... placeholders in order.
    async fn query(&mut self, sql: &str, params: &[&str]) -> DbResult<RecordSet>;

    /// Run a mutating statement; returns the affected-row count.
    async fn execute(&mut self, sql: &str) -> DbResult<u64>;

    async fn begin_transaction(&mut self, isolation: IsolationLevel) -> DbResult<()>;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;

    /// Release the session. Errors are logged, not surfaced; close must be
    /// safe to call on every exit path.
    async fn close(self: Box<Self>);
}

/// Connection factory for one database product.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> DbResult<Box<dyn Connection>>;
}

// ============================================================================
// Tiberius (TDS) implementation
// ============================================================================

/// SQL Server driver speaking TDS via tiberius.
pub struct TiberiusDriver;

struct TiberiusConnection {
    client: Client<Compat<TcpStream>>,
}

#[async_trait]
impl Driver for TiberiusDriver {
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> DbResult<Box<dyn Connection>> {
        let mut config = tiberius::Config::new();
        config.host(&descriptor.server);
        if let Some(port) = descriptor.port {
            config.port(port);
        }
        config.database(&descriptor.database);
        config.authentication(AuthMethod::sql_server(&descriptor.user, &descriptor.password));
        config.encryption(if descriptor.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });
        if descriptor.trust_server_certificate {
            config.trust_cert();
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| DbError::Database(format!("connection failed: {e}")))?;
        tcp.set_nodelay(true)
            .map_err(|e| DbError::Database(format!("connection setup failed: {e}")))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| DbError::Database(e.to_string()))?;

        Ok(Box::new(TiberiusConnection { client }))
    }
}

#[async_trait]
impl Connection for TiberiusConnection {
    async fn query(&mut self, sql: &str, params: &[&str]) -> DbResult<RecordSet> {
        let bound: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();

        let mut stream = self
            .client
            .query(sql, &bound)
            .await
            .map_err(|e| DbError::Database(e.to_string()))?;

        let columns: Vec<String> = stream
            .columns()
            .await
            .map_err(|e| DbError::Database(e.to_string()))?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let row_sets = stream
            .into_results()
            .await
            .map_err(|e| DbError::Database(e.to_string()))?;

        let rows = row_sets
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.into_iter().map(decode_cell).collect())
            .collect();

        Ok(RecordSet { columns, rows })
    }

    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        self.client
            .execute(sql, &[])
            .await
            .map(|result| result.total())
            .map_err(|e| DbError::Database(e.to_string()))
    }

    async fn begin_transaction(&mut self, isolation: IsolationLevel) -> DbResult<()> {
        let batch = format!(
            "SET TRANSACTION ISOLATION LEVEL {}; BEGIN TRANSACTION",
            isolation.as_sql()
        );
        self.client
            .execute(batch, &[])
            .await
            .map(|_| ())
            .map_err(|e| DbError::Database(e.to_string()))
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.client
            .execute("COMMIT TRANSACTION", &[])
            .await
            .map(|_| ())
            .map_err(|e| DbError::Database(e.to_string()))
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.client
            .execute("ROLLBACK TRANSACTION", &[])
            .await
            .map(|_| ())
            .map_err(|e| DbError::Database(e.to_string()))
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.client.close().await {
            tracing::debug!("connection close failed: {e}");
        }
    }
}

/// Collapse a driver-native scalar into a [`CellValue`].
///
/// Temporal values, GUIDs, decimals, and XML render as text; binary renders
/// as a size placeholder rather than raw bytes.
fn decode_cell(data: ColumnData<'static>) -> CellValue {
    match data {
        ColumnData::Bit(value) => value.map(CellValue::Bool).unwrap_or(CellValue::Null),
        ColumnData::U8(value) => value
            .map(|v| CellValue::Int(i64::from(v)))
            .unwrap_or(CellValue::Null),
        ColumnData::I16(value) => value
            .map(|v| CellValue::Int(i64::from(v)))
            .unwrap_or(CellValue::Null),
        ColumnData::I32(value) => value
            .map(|v| CellValue::Int(i64::from(v)))
            .unwrap_or(CellValue::Null),
        ColumnData::I64(value) => value.map(CellValue::Int).unwrap_or(CellValue::Null),
        ColumnData::F32(value) => value
            .map(|v| CellValue::Float(f64::from(v)))
            .unwrap_or(CellValue::Null),
        ColumnData::F64(value) => value.map(CellValue::Float).unwrap_or(CellValue::Null),
        ColumnData::String(value) => value
            .map(|s| CellValue::Text(s.into_owned()))
            .unwrap_or(CellValue::Null),
        ColumnData::Guid(value) => value
            .map(|g| CellValue::Text(g.to_string()))
            .unwrap_or(CellValue::Null),
        ColumnData::Numeric(value) => value
            .map(|n| CellValue::Text(n.to_string()))
            .unwrap_or(CellValue::Null),
        ColumnData::Xml(value) => value
            .map(|x| CellValue::Text(x.to_string()))
            .unwrap_or(CellValue::Null),
        ColumnData::Binary(value) => value
            .map(|b| CellValue::Text(format!("<binary {} bytes>", b.len())))
            .unwrap_or(CellValue::Null),
        temporal => decode_temporal(&temporal),
    }
}

fn decode_temporal(data: &ColumnData<'static>) -> CellValue {
    let rendered = match data {
        ColumnData::Date(_) => NaiveDate::from_sql(data)
            .ok()
            .flatten()
            .map(|d| d.to_string()),
        ColumnData::Time(_) => NaiveTime::from_sql(data)
            .ok()
            .flatten()
            .map(|t| t.to_string()),
        ColumnData::DateTimeOffset(_) => DateTime::<Utc>::from_sql(data)
            .ok()
            .flatten()
            .map(|t| t.to_rfc3339()),
        _ => NaiveDateTime::from_sql(data)
            .ok()
            .flatten()
            .map(|t| t.to_string()),
    };

    rendered.map(CellValue::Text).unwrap_or(CellValue::Null)
}
