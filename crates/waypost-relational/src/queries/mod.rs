//! Metric templates for the relational dialect.
//!
//! Each module owns one statement and a `statement` function that compiles
//! the cohort, binds the metric's own parameters and returns a
//! [`BoundStatement`](waypost_core::sql::BoundStatement) ready for any
//! relational executor.

pub mod activation;
pub mod arpu;
pub mod bounce;
pub mod churn;
pub mod click_through;
pub mod dropoff;
pub mod funnel;
pub mod paths;
