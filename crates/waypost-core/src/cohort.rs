//! Turns [`QueryFilters`] into a parameterized predicate that metric
//! templates splice into their `[[cohort]]` slot.

use crate::analytics::{Granularity, QueryFilters};
use crate::error::EngineError;
use crate::sql::{Params, SqlFragment};

/// A compiled filter set. Every parameter name starts with `cohort_` so a
/// metric's own parameters never collide with it.
#[derive(Debug, Clone, Default)]
pub struct Cohort {
    pub predicate: SqlFragment,
    pub params: Params,
}

/// Dialect-specific SQL for filters and the column expressions metrics share.
pub trait CohortCompiler: Send + Sync {
    /// Predicate over an event row. Always constrains website and window.
    fn events(&self, filters: &QueryFilters) -> Result<Cohort, EngineError>;

    /// Predicate over a revenue row `r`. Always constrains website and window;
    /// segment filters apply through the revenue row's session.
    fn revenue(&self, filters: &QueryFilters) -> Result<Cohort, EngineError>;

    /// Expression producing the page path of `e`, optionally with query
    /// string and fragment removed and lowercased.
    fn page_path(&self, normalize: bool) -> SqlFragment;

    /// Expression truncating the timestamp column `column` to a bucket start.
    fn bucket(&self, granularity: Granularity, column: BucketColumn) -> SqlFragment;
}

/// Timestamp columns metrics bucket on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketColumn {
    EventCreatedAt,
    RevenueCreatedAt,
    FirstView,
}
