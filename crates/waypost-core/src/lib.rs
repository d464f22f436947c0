pub mod analytics;
pub mod cohort;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod normalize;
pub mod sql;

pub use analytics::{BackendKind, Metric, MetricBackend, QueryFilters};
pub use engine::AnalyticsEngine;
pub use error::{BackendError, BackendErrorKind, EngineError};
