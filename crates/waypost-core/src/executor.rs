use async_trait::async_trait;

use crate::error::BackendError;
use crate::sql::BoundStatement;

/// Positional result rows, one `Vec` per row in the statement's declared
/// column order.
pub type Rows = Vec<Vec<serde_json::Value>>;

/// Runs bound statements against one concrete store.
///
/// Implemented by the embedded DuckDB store, the Postgres pool and the
/// ClickHouse HTTP client.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn fetch(&self, stmt: &BoundStatement) -> Result<Rows, BackendError>;

    /// Cheap round trip used by `/health`.
    async fn ping(&self) -> Result<(), BackendError>;

    /// Store name for logging.
    fn name(&self) -> &'static str;
}
