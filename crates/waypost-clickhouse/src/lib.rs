pub mod backend;
pub mod client;
pub mod cohort;
pub mod dialect;
pub mod queries;

pub use backend::ColumnarBackend;
pub use client::ClickHouseClient;
pub use cohort::ColumnarCohort;
pub use dialect::ClickHouseDialect;
