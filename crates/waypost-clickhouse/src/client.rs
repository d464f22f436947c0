use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::info;

use waypost_core::analytics::BackendKind;
use waypost_core::config::ClickHouseConfig;
use waypost_core::error::{BackendError, BackendErrorKind};
use waypost_core::executor::{QueryExecutor, Rows};
use waypost_core::sql::BoundStatement;

use crate::dialect::param_value;

/// Response header carrying ClickHouse's numeric error code.
const EXCEPTION_CODE_HEADER: &str = "X-ClickHouse-Exception-Code";

/// HTTP client wrapper for ClickHouse.
///
/// SQL is posted as the request body; named parameters are passed as
/// `param_<name>` query-string entries so ClickHouse substitutes them
/// server-side. Every request is read-only and bounded by
/// `max_execution_time`; closing the connection cancels the query.
#[derive(Clone)]
pub struct ClickHouseClient {
    client: Client,
    url: Url,
    database: String,
    user: String,
    password: String,
    max_execution_time: u64,
}

#[derive(Deserialize)]
struct CompactResponse {
    #[serde(default)]
    data: Rows,
}

impl ClickHouseClient {
    pub fn new(config: &ClickHouseConfig, query_timeout: Duration) -> Result<Self> {
        let url = Url::parse(&config.url).context("Invalid ClickHouse URL")?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("ClickHouse HTTP client build failed")?;
        info!(
            "ClickHouse client for {} (database={})",
            config.url, config.database
        );
        Ok(Self {
            client,
            url,
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            max_execution_time: query_timeout.as_secs().max(1),
        })
    }

    /// Full request URL for `stmt`: settings first, then one `param_<name>`
    /// per distinct placeholder.
    pub fn request_url(&self, stmt: &BoundStatement) -> Url {
        let mut url = self.url.clone();
        {
            let mut qs = url.query_pairs_mut();
            qs.append_pair("database", &self.database);
            qs.append_pair("default_format", "JSONCompact");
            qs.append_pair("max_execution_time", &self.max_execution_time.to_string());
            qs.append_pair("readonly", "2");
            qs.append_pair("cancel_http_readonly_queries_on_client_close", "1");
            for param in &stmt.params {
                qs.append_pair(&format!("param_{}", param.name), &param_value(&param.value));
            }
        }
        url
    }

    async fn post(&self, url: Url, sql: String) -> Result<reqwest::Response, BackendError> {
        let resp = self
            .client
            .post(url)
            .basic_auth(&self.user, Some(&self.password))
            .body(sql)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let code = resp
                .headers()
                .get(EXCEPTION_CODE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = resp.text().await.unwrap_or_default();
            let kind = match code.as_deref() {
                // TIMEOUT_EXCEEDED
                Some("159") => BackendErrorKind::Timeout,
                _ => BackendErrorKind::Query,
            };
            let err = BackendError::new(
                BackendKind::Columnar,
                kind,
                format!("ClickHouse error {status}: {}", body.trim()),
            );
            return Err(match code {
                Some(code) => err.with_code(code),
                None => err,
            });
        }
        Ok(resp)
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    let kind = if e.is_timeout() {
        BackendErrorKind::Timeout
    } else if e.is_connect() || e.is_request() {
        BackendErrorKind::Connection
    } else {
        BackendErrorKind::Query
    };
    BackendError::new(BackendKind::Columnar, kind, e.to_string())
}

#[async_trait]
impl QueryExecutor for ClickHouseClient {
    async fn fetch(&self, stmt: &BoundStatement) -> Result<Rows, BackendError> {
        let resp = self.post(self.request_url(stmt), stmt.sql.clone()).await?;
        let parsed: CompactResponse = resp.json().await.map_err(|e| {
            BackendError::decode(
                BackendKind::Columnar,
                format!("ClickHouse response parse failed: {e}"),
            )
        })?;
        Ok(parsed.data)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("database", &self.database)
            .append_pair("readonly", "2");
        self.post(url, "SELECT 1".to_string()).await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "clickhouse"
    }
}
