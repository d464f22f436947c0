use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat};
use duckdb::types::{TimeUnit, ToSql, ValueRef};
use duckdb::Connection;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use waypost_core::analytics::BackendKind;
use waypost_core::error::{BackendError, BackendErrorKind};
use waypost_core::executor::{QueryExecutor, Rows};
use waypost_core::sql::BoundStatement;

use crate::dialect::{wire_value, WireValue};
use crate::schema::init_sql;

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

/// Embedded DuckDB store speaking the relational dialect.
///
/// DuckDB serves one statement at a time per connection, so the connection
/// sits behind `Arc<Mutex<_>>`: concurrent metric calls queue on the lock
/// while the struct stays cheap to clone into handlers.
///
/// Memory and thread limits are enforced by [`init_sql`] at open time.
#[derive(Clone)]
pub struct EmbeddedStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl EmbeddedStore {
    /// Open (or create) a DuckDB database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        info!(
            "DuckDB opened at {} with memory_limit={}, threads=2",
            path, memory_limit
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database. Data is discarded on drop.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&init_sql("1GB"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl QueryExecutor for EmbeddedStore {
    async fn fetch(&self, stmt: &BoundStatement) -> Result<Rows, BackendError> {
        let conn = self.conn.lock().await;

        let params: Vec<Box<dyn ToSql>> = stmt
            .params
            .iter()
            .map(|p| match wire_value(&p.value) {
                WireValue::Text(s) => Box::new(s) as Box<dyn ToSql>,
                WireValue::Int(i) => Box::new(i) as Box<dyn ToSql>,
                WireValue::Float(f) => Box::new(f) as Box<dyn ToSql>,
            })
            .collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut prepared = conn.prepare(&stmt.sql).map_err(query_error)?;
        let mut rows = prepared.query(param_refs.as_slice()).map_err(query_error)?;

        let width = stmt.columns.len();
        if let Some(count) = rows.as_ref().map(|s| s.column_count()) {
            if count != width {
                return Err(BackendError::decode(
                    BackendKind::Relational,
                    format!("{} returned {count} columns, expected {width}", stmt.metric),
                ));
            }
        }

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(query_error)? {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| BackendError::decode(BackendKind::Relational, e.to_string()))?;
                cells.push(json_value(value)?);
            }
            out.push(cells);
        }
        Ok(out)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1").map_err(query_error)
    }

    fn name(&self) -> &'static str {
        "duckdb"
    }
}

fn query_error(e: duckdb::Error) -> BackendError {
    BackendError::new(BackendKind::Relational, BackendErrorKind::Query, e.to_string())
}

fn json_value(value: ValueRef<'_>) -> Result<Value, BackendError> {
    let decoded = match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => Value::from(i),
        ValueRef::SmallInt(i) => Value::from(i),
        ValueRef::Int(i) => Value::from(i),
        ValueRef::BigInt(i) => Value::from(i),
        ValueRef::UTinyInt(i) => Value::from(i),
        ValueRef::USmallInt(i) => Value::from(i),
        ValueRef::UInt(i) => Value::from(i),
        ValueRef::UBigInt(i) => Value::from(i),
        // Wider than any JSON number; the normalizer parses the string.
        ValueRef::HugeInt(i) => Value::String(i.to_string()),
        ValueRef::Float(f) => Value::from(f64::from(f)),
        ValueRef::Double(f) => Value::from(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Date32(days) => {
            let date = NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_CE_DAYS)
                .ok_or_else(|| decode_error(format!("date out of range: {days}")))?;
            Value::String(date.format("%Y-%m-%d").to_string())
        }
        ValueRef::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            let ts = DateTime::from_timestamp_micros(micros)
                .ok_or_else(|| decode_error(format!("timestamp out of range: {raw}")))?;
            Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
        }
        other => {
            return Err(decode_error(format!(
                "unsupported column type {:?}",
                other.data_type()
            )))
        }
    };
    Ok(decoded)
}

fn decode_error(message: String) -> BackendError {
    BackendError::decode(BackendKind::Relational, message)
}
