use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use waypost_core::analytics::{
    ActivationQuery, ActivationResult, BackendKind, BounceBucket, ChurnQuery, ChurnRow,
    ClickThroughRow, DropoffRow, FunnelQuery, FunnelResult, Granularity, MetricBackend, PathQuery,
    PathTransition, QueryFilters, RevenueBucket, UserBucket, UserModel,
};
use waypost_core::error::EngineError;
use waypost_core::executor::QueryExecutor;
use waypost_core::normalize::{self, ResultSet};
use waypost_core::sql::BoundStatement;

use crate::queries;

/// Every metric, answered by a store that speaks the relational dialect.
///
/// The executor is either the embedded DuckDB store or the Postgres pool;
/// the templates are identical for both.
#[derive(Clone)]
pub struct RelationalBackend {
    executor: Arc<dyn QueryExecutor>,
}

impl RelationalBackend {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    async fn fetch(&self, stmt: &BoundStatement) -> Result<ResultSet, EngineError> {
        trace!(
            metric = %stmt.metric,
            store = self.executor.name(),
            params = stmt.params.len(),
            sql = %stmt.sql,
            "executing metric statement"
        );
        let rows = self.executor.fetch(stmt).await?;
        Ok(ResultSet::new(BackendKind::Relational, stmt, rows)?)
    }
}

#[async_trait]
impl MetricBackend for RelationalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    async fn ping(&self) -> Result<(), EngineError> {
        Ok(self.executor.ping().await?)
    }

    async fn funnel(
        &self,
        filters: &QueryFilters,
        query: &FunnelQuery,
    ) -> Result<FunnelResult, EngineError> {
        let stmt = queries::funnel::statement(filters, query)?;
        Ok(normalize::funnel(&self.fetch(&stmt).await?)?)
    }

    async fn dropoff(&self, filters: &QueryFilters) -> Result<Vec<DropoffRow>, EngineError> {
        let stmt = queries::dropoff::statement(filters)?;
        Ok(normalize::dropoff(&self.fetch(&stmt).await?)?)
    }

    async fn activation(
        &self,
        filters: &QueryFilters,
        query: &ActivationQuery,
    ) -> Result<ActivationResult, EngineError> {
        let stmt = queries::activation::statement(filters, query)?;
        Ok(normalize::activation(&self.fetch(&stmt).await?)?)
    }

    async fn path_transitions(
        &self,
        filters: &QueryFilters,
        query: &PathQuery,
    ) -> Result<Vec<PathTransition>, EngineError> {
        let stmt = queries::paths::statement(filters, query)?;
        Ok(normalize::path_transitions(&self.fetch(&stmt).await?)?)
    }

    async fn churn_input(
        &self,
        filters: &QueryFilters,
        query: &ChurnQuery,
    ) -> Result<Vec<ChurnRow>, EngineError> {
        let stmt = queries::churn::statement(filters, query)?;
        Ok(normalize::churn_input(&self.fetch(&stmt).await?)?)
    }

    async fn arpu_users(
        &self,
        filters: &QueryFilters,
        granularity: Granularity,
        model: UserModel,
    ) -> Result<Vec<UserBucket>, EngineError> {
        let stmt = queries::arpu::users_statement(filters, granularity, model)?;
        Ok(normalize::arpu_users(&self.fetch(&stmt).await?)?)
    }

    async fn arpu_revenue(
        &self,
        filters: &QueryFilters,
        granularity: Granularity,
    ) -> Result<Vec<RevenueBucket>, EngineError> {
        let stmt = queries::arpu::revenue_statement(filters, granularity)?;
        Ok(normalize::arpu_revenue(&self.fetch(&stmt).await?)?)
    }

    async fn bounce_rate(
        &self,
        filters: &QueryFilters,
        granularity: Granularity,
    ) -> Result<Vec<BounceBucket>, EngineError> {
        let stmt = queries::bounce::statement(filters, granularity)?;
        Ok(normalize::bounce_rate(&self.fetch(&stmt).await?)?)
    }

    async fn click_through(
        &self,
        filters: &QueryFilters,
    ) -> Result<Vec<ClickThroughRow>, EngineError> {
        let stmt = queries::click_through::statement(filters)?;
        Ok(normalize::click_through(&self.fetch(&stmt).await?)?)
    }
}
