use std::time::Duration;

use crate::analytics::BackendKind;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backend: BackendKind,
    /// File path for the embedded store, or a `postgres://` URL.
    pub database_url: String,
    pub duckdb_memory_limit: String,
    pub clickhouse: ClickHouseConfig,
    pub query_timeout_ms: u64,
    pub churn_lookback_days: u32,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClickHouseConfig {
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "waypost".to_string(),
            user: "default".to_string(),
            password: String::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("WAYPOST_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            backend: BackendKind::parse(
                &std::env::var("WAYPOST_BACKEND").unwrap_or_else(|_| "relational".to_string()),
            )?,
            database_url: std::env::var("WAYPOST_DATABASE_URL")
                .unwrap_or_else(|_| "./data/waypost.db".to_string()),
            duckdb_memory_limit: std::env::var("WAYPOST_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            clickhouse: ClickHouseConfig {
                url: std::env::var("WAYPOST_CLICKHOUSE_URL")
                    .unwrap_or_else(|_| "http://localhost:8123".to_string()),
                database: std::env::var("WAYPOST_CLICKHOUSE_DATABASE")
                    .unwrap_or_else(|_| "waypost".to_string()),
                user: std::env::var("WAYPOST_CLICKHOUSE_USER")
                    .unwrap_or_else(|_| "default".to_string()),
                password: std::env::var("WAYPOST_CLICKHOUSE_PASSWORD").unwrap_or_default(),
            },
            query_timeout_ms: std::env::var("WAYPOST_QUERY_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .map_err(|e| format!("invalid query timeout: {e}"))?,
            churn_lookback_days: parse_lookback_days(
                &std::env::var("WAYPOST_CHURN_LOOKBACK_DAYS").unwrap_or_else(|_| "90".to_string()),
            )?,
            cors_origins: std::env::var("WAYPOST_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// Defaults suitable for tests: in-memory embedded store, short timeout.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            backend: BackendKind::Relational,
            database_url: ":memory:".to_string(),
            duckdb_memory_limit: "256MB".to_string(),
            clickhouse: ClickHouseConfig::default(),
            query_timeout_ms: 5_000,
            churn_lookback_days: 90,
            cors_origins: Vec::new(),
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn uses_postgres(&self) -> bool {
        self.database_url.starts_with("postgres://") || self.database_url.starts_with("postgresql://")
    }
}

fn parse_lookback_days(raw: &str) -> Result<u32, String> {
    let days: u32 = raw
        .trim()
        .parse()
        .map_err(|e| format!("invalid churn lookback days: {e}"))?;
    if days == 0 {
        return Err("invalid churn lookback days: must be at least 1".to_string());
    }
    Ok(days)
}
