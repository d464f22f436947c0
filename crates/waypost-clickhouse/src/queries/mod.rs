//! Metric templates for ClickHouse.
//!
//! Same inputs and column layout as the relational templates, written
//! against the denormalized `website_event` table. Outer joins set
//! `join_use_nulls` so unmatched sides read as NULL rather than type
//! defaults.

pub mod activation;
pub mod arpu;
pub mod click_through;
pub mod dropoff;
pub mod funnel;
pub mod paths;
