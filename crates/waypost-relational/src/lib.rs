pub mod backend;
pub mod cohort;
pub mod dialect;
pub mod fixtures;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod queries;
pub mod schema;
pub mod store;

pub use backend::RelationalBackend;
pub use cohort::RelationalCohort;
pub use dialect::RelationalDialect;
pub use store::EmbeddedStore;
