use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};
use tracing::info;

use waypost_core::analytics::BackendKind;
use waypost_core::error::{BackendError, BackendErrorKind};
use waypost_core::executor::{QueryExecutor, Rows};
use waypost_core::sql::BoundStatement;

use crate::dialect::{wire_value, WireValue};

/// SQLSTATE raised when `statement_timeout` cancels a query.
const QUERY_CANCELED: &str = "57014";

/// Postgres pool speaking the relational dialect.
#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    /// Connect a pool whose sessions run in UTC and cancel statements after
    /// `statement_timeout`, so an abandoned query does not keep running
    /// server-side.
    pub async fn connect(database_url: &str, statement_timeout: Duration) -> Result<Self> {
        let timeout_ms = statement_timeout.as_millis();
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query("SET TIME ZONE 'UTC'").execute(&mut *conn).await?;
                    let sql = format!("SET statement_timeout = {timeout_ms}");
                    sqlx::query(&sql).execute(&mut *conn).await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        info!("Postgres pool connected (statement_timeout={timeout_ms}ms)");
        Ok(Self { pool })
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn fetch(&self, stmt: &BoundStatement) -> Result<Rows, BackendError> {
        let mut query = sqlx::query(&stmt.sql);
        for param in &stmt.params {
            query = match wire_value(&param.value) {
                WireValue::Text(s) => query.bind(s),
                WireValue::Int(i) => query.bind(i),
                WireValue::Float(f) => query.bind(f),
            };
        }
        let rows = query.fetch_all(&self.pool).await.map_err(pg_error)?;

        let width = stmt.columns.len();
        rows.iter()
            .map(|row| {
                if row.len() != width {
                    return Err(BackendError::decode(
                        BackendKind::Relational,
                        format!("{} returned {} columns, expected {width}", stmt.metric, row.len()),
                    ));
                }
                (0..width).map(|idx| decode(row, idx)).collect()
            })
            .collect()
    }

    async fn ping(&self) -> Result<(), BackendError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(pg_error)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

fn decode(row: &PgRow, idx: usize) -> Result<Value, BackendError> {
    let type_name = row.column(idx).type_info().name().to_string();
    let value = match type_name.as_str() {
        "INT8" => row.try_get::<Option<i64>, _>(idx).map(|v| v.map(Value::from)),
        "INT4" => row.try_get::<Option<i32>, _>(idx).map(|v| v.map(Value::from)),
        "INT2" => row.try_get::<Option<i16>, _>(idx).map(|v| v.map(Value::from)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx).map(|v| v.map(Value::from)),
        "FLOAT4" => row.try_get::<Option<f32>, _>(idx).map(|v| v.map(Value::from)),
        "BOOL" => row.try_get::<Option<bool>, _>(idx).map(|v| v.map(Value::from)),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .map(|v| v.map(|d| Value::String(d.format("%Y-%m-%d").to_string()))),
        "TIMESTAMP" => row.try_get::<Option<NaiveDateTime>, _>(idx).map(|v| {
            v.map(|ts| Value::String(ts.and_utc().to_rfc3339_opts(SecondsFormat::Micros, true)))
        }),
        "TIMESTAMPTZ" => row.try_get::<Option<DateTime<Utc>>, _>(idx).map(|v| {
            v.map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true)))
        }),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .map(|v| v.map(Value::String)),
    };
    value
        .map(|v| v.unwrap_or(Value::Null))
        .map_err(|e| {
            BackendError::decode(
                BackendKind::Relational,
                format!("column {idx} ({type_name}): {e}"),
            )
        })
}

fn pg_error(e: sqlx::Error) -> BackendError {
    match &e {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.to_string());
            let kind = if code.as_deref() == Some(QUERY_CANCELED) {
                BackendErrorKind::Timeout
            } else {
                BackendErrorKind::Query
            };
            let err = BackendError::new(BackendKind::Relational, kind, db.message());
            match code {
                Some(code) => err.with_code(code),
                None => err,
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Configuration(_) => BackendError::new(
            BackendKind::Relational,
            BackendErrorKind::Connection,
            e.to_string(),
        ),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. } => {
            BackendError::decode(BackendKind::Relational, e.to_string())
        }
        _ => BackendError::new(
            BackendKind::Relational,
            BackendErrorKind::Query,
            e.to_string(),
        ),
    }
}
