use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::analytics::{
    bucket_starts, round2, ActivationQuery, ActivationResult, ArpuBucket, BackendKind,
    BounceBucket, ChurnQuery, ChurnRow, ClickThroughRow, DropoffRow, FunnelQuery, FunnelResult,
    Granularity, Metric, MetricBackend, PathQuery, PathTransition, QueryFilters, RevenueBucket,
    UserBucket, UserModel,
};
use crate::error::{BackendError, EngineError};

/// Entry point for every metric. Holds the backend chosen at startup and
/// applies validation, the query deadline and logging uniformly.
#[derive(Clone)]
pub struct AnalyticsEngine {
    backend: Arc<dyn MetricBackend>,
    query_timeout: Duration,
}

impl AnalyticsEngine {
    pub fn new(backend: Arc<dyn MetricBackend>, query_timeout: Duration) -> Self {
        Self {
            backend,
            query_timeout,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub async fn ping(&self) -> Result<(), EngineError> {
        match tokio::time::timeout(self.query_timeout, self.backend.ping()).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::timeout(self.kind(), self.query_timeout).into()),
        }
    }

    pub async fn funnel(
        &self,
        filters: &QueryFilters,
        query: &FunnelQuery,
    ) -> Result<FunnelResult, EngineError> {
        require_name("from_event", &query.from_event)?;
        require_name("to_event", &query.to_event)?;
        self.run(Metric::Funnel, filters, self.backend.funnel(filters, query))
            .await
    }

    pub async fn dropoff(&self, filters: &QueryFilters) -> Result<Vec<DropoffRow>, EngineError> {
        self.run(Metric::Dropoff, filters, self.backend.dropoff(filters))
            .await
    }

    pub async fn activation(
        &self,
        filters: &QueryFilters,
        query: &ActivationQuery,
    ) -> Result<ActivationResult, EngineError> {
        require_name("event_name", &query.event_name)?;
        self.run(
            Metric::Activation,
            filters,
            self.backend.activation(filters, query),
        )
        .await
    }

    pub async fn path_transitions(
        &self,
        filters: &QueryFilters,
        query: &PathQuery,
    ) -> Result<Vec<PathTransition>, EngineError> {
        self.run(
            Metric::PathTransitions,
            filters,
            self.backend.path_transitions(filters, query),
        )
        .await
    }

    pub async fn churn_input(
        &self,
        filters: &QueryFilters,
        query: &ChurnQuery,
    ) -> Result<Vec<ChurnRow>, EngineError> {
        if query.lookback_days == 0 {
            return Err(EngineError::validation("lookback_days must be at least 1"));
        }
        query.lookback_start(filters)?;
        self.run(
            Metric::ChurnInput,
            filters,
            self.backend.churn_input(filters, query),
        )
        .await
    }

    /// One bucket per period in the window; periods without users report 0.
    pub async fn arpu_users(
        &self,
        filters: &QueryFilters,
        granularity: Granularity,
        model: UserModel,
    ) -> Result<Vec<UserBucket>, EngineError> {
        let starts = bucket_starts(filters, granularity)?;
        let rows = self
            .run(
                Metric::ArpuUsers,
                filters,
                self.backend.arpu_users(filters, granularity, model),
            )
            .await?;
        let counts = zero_filled(
            &starts,
            rows.into_iter().map(|b| (b.bucket_start, b.user_count)),
        );
        Ok(counts
            .into_iter()
            .map(|(bucket_start, user_count)| UserBucket {
                bucket_start,
                user_count,
            })
            .collect())
    }

    /// One bucket per period in the window; periods without revenue report 0.
    pub async fn arpu_revenue(
        &self,
        filters: &QueryFilters,
        granularity: Granularity,
    ) -> Result<Vec<RevenueBucket>, EngineError> {
        let starts = bucket_starts(filters, granularity)?;
        let rows = self
            .run(
                Metric::ArpuRevenue,
                filters,
                self.backend.arpu_revenue(filters, granularity),
            )
            .await?;
        let sums = zero_filled(
            &starts,
            rows.into_iter().map(|b| (b.bucket_start, b.revenue)),
        );
        Ok(sums
            .into_iter()
            .map(|(bucket_start, revenue)| RevenueBucket {
                bucket_start,
                revenue,
            })
            .collect())
    }

    pub async fn bounce_rate(
        &self,
        filters: &QueryFilters,
        granularity: Granularity,
    ) -> Result<Vec<BounceBucket>, EngineError> {
        self.run(
            Metric::BounceRate,
            filters,
            self.backend.bounce_rate(filters, granularity),
        )
        .await
    }

    pub async fn click_through(
        &self,
        filters: &QueryFilters,
    ) -> Result<Vec<ClickThroughRow>, EngineError> {
        self.run(
            Metric::ClickThrough,
            filters,
            self.backend.click_through(filters),
        )
        .await
    }

    /// Revenue and user buckets fetched concurrently and joined on
    /// `bucket_start`. Both sides are zero-filled over the same periods, so a
    /// bucket missing on one side gets 0 for it.
    pub async fn arpu(
        &self,
        filters: &QueryFilters,
        granularity: Granularity,
        model: UserModel,
    ) -> Result<Vec<ArpuBucket>, EngineError> {
        let (revenue, users) = tokio::try_join!(
            self.arpu_revenue(filters, granularity),
            self.arpu_users(filters, granularity, model),
        )?;

        let mut joined: BTreeMap<String, (f64, i64)> = BTreeMap::new();
        for bucket in revenue {
            joined.entry(bucket.bucket_start).or_default().0 += bucket.revenue;
        }
        for bucket in users {
            joined.entry(bucket.bucket_start).or_default().1 += bucket.user_count;
        }

        Ok(joined
            .into_iter()
            .map(|(bucket_start, (revenue, users))| ArpuBucket {
                bucket_start,
                revenue: round2(revenue),
                users,
                arpu: if users > 0 {
                    round2(revenue / users as f64)
                } else {
                    0.0
                },
            })
            .collect())
    }

    async fn run<T, F>(
        &self,
        metric: Metric,
        filters: &QueryFilters,
        query: F,
    ) -> Result<T, EngineError>
    where
        T: RowCount,
        F: Future<Output = Result<T, EngineError>>,
    {
        filters.validate()?;
        if let Some(tz) = &filters.timezone {
            debug!(metric = %metric, timezone = %tz, "timezone accepted; buckets are computed in UTC");
        }

        let backend = self.kind();
        let started = Instant::now();
        let result = match tokio::time::timeout(self.query_timeout, query).await {
            Ok(result) => result,
            // Dropping the future cancels the in-flight request/query.
            Err(_) => Err(BackendError::timeout(backend, self.query_timeout).into()),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(value) => debug!(
                metric = %metric,
                backend = %backend,
                elapsed_ms,
                rows = value.row_count(),
                "metric query completed"
            ),
            Err(e) => warn!(
                metric = %metric,
                backend = %backend,
                elapsed_ms,
                error = %e,
                "metric query failed"
            ),
        }
        result
    }
}

/// Seeds every expected bucket with zero, then adds the backend rows.
/// Labels are `YYYY-MM-DD`, so the map order is chronological.
fn zero_filled<V>(
    starts: &[NaiveDate],
    rows: impl Iterator<Item = (String, V)>,
) -> BTreeMap<String, V>
where
    V: Default + std::ops::AddAssign,
{
    let mut buckets: BTreeMap<String, V> = starts
        .iter()
        .map(|d| (d.format("%Y-%m-%d").to_string(), V::default()))
        .collect();
    for (label, value) in rows {
        *buckets.entry(label).or_default() += value;
    }
    buckets
}

fn require_name(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(format!("{field} is required")));
    }
    Ok(())
}

trait RowCount {
    fn row_count(&self) -> usize;
}

impl<T> RowCount for Vec<T> {
    fn row_count(&self) -> usize {
        self.len()
    }
}

impl RowCount for FunnelResult {
    fn row_count(&self) -> usize {
        1
    }
}

impl RowCount for ActivationResult {
    fn row_count(&self) -> usize {
        1
    }
}
