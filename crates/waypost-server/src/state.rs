use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use waypost_clickhouse::{ClickHouseClient, ColumnarBackend};
use waypost_core::analytics::{BackendKind, MetricBackend};
use waypost_core::config::Config;
use waypost_core::executor::QueryExecutor;
use waypost_core::AnalyticsEngine;
use waypost_relational::{EmbeddedStore, RelationalBackend};

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// Metric entry point. Cheap to clone; the backend behind it is shared.
    pub engine: AnalyticsEngine,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(engine: AnalyticsEngine, config: Config) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }
}

/// Build the engine for the backend named in `config`. The choice is fixed
/// for the life of the process.
pub async fn build_engine(config: &Config) -> Result<AnalyticsEngine> {
    let backend: Arc<dyn MetricBackend> = match config.backend {
        BackendKind::Relational => {
            Arc::new(RelationalBackend::new(relational_executor(config).await?))
        }
        BackendKind::Columnar => {
            let client = ClickHouseClient::new(&config.clickhouse, config.query_timeout())?;
            Arc::new(ColumnarBackend::new(Arc::new(client)))
        }
    };
    info!(backend = %backend.kind(), "Analytics backend ready");
    Ok(AnalyticsEngine::new(backend, config.query_timeout()))
}

async fn relational_executor(config: &Config) -> Result<Arc<dyn QueryExecutor>> {
    if config.uses_postgres() {
        return postgres_executor(config).await;
    }
    if config.database_url == ":memory:" {
        return Ok(Arc::new(EmbeddedStore::open_in_memory()?));
    }
    if let Some(parent) = std::path::Path::new(&config.database_url).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }
    }
    Ok(Arc::new(EmbeddedStore::open(
        &config.database_url,
        &config.duckdb_memory_limit,
    )?))
}

#[cfg(feature = "postgres")]
async fn postgres_executor(config: &Config) -> Result<Arc<dyn QueryExecutor>> {
    let executor = waypost_relational::postgres::PgExecutor::connect(
        &config.database_url,
        config.query_timeout(),
    )
    .await?;
    Ok(Arc::new(executor))
}

#[cfg(not(feature = "postgres"))]
async fn postgres_executor(_config: &Config) -> Result<Arc<dyn QueryExecutor>> {
    anyhow::bail!("WAYPOST_DATABASE_URL is a Postgres URL but this build lacks the `postgres` feature")
}
