use waypost_core::analytics::{Granularity, Metric, QueryFilters, UserModel};
use waypost_core::cohort::{BucketColumn, Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::ColumnarCohort;
use crate::dialect::ClickHouseDialect;

const ACTIVE_USERS_SQL: &str = r#"
SELECT
    [[bucket]] AS bucket_start,
    uniqExact(e.session_id) AS user_count
FROM website_event AS e
WHERE [[cohort]]
GROUP BY bucket_start
ORDER BY bucket_start
"#;

const PAYING_USERS_SQL: &str = r#"
SELECT
    [[bucket]] AS bucket_start,
    uniqExact(r.session_id) AS user_count
FROM website_revenue AS r
WHERE [[cohort]]
  AND r.revenue > 0
GROUP BY bucket_start
ORDER BY bucket_start
"#;

const REVENUE_SQL: &str = r#"
SELECT
    [[bucket]] AS bucket_start,
    toFloat64(coalesce(sum(r.revenue), 0)) AS total_revenue
FROM website_revenue AS r
WHERE [[cohort]]
GROUP BY bucket_start
ORDER BY bucket_start
"#;

pub fn users_statement(
    filters: &QueryFilters,
    granularity: Granularity,
    model: UserModel,
) -> Result<BoundStatement, EngineError> {
    let (sql, cohort, column) = match model {
        UserModel::Active => (
            ACTIVE_USERS_SQL,
            ColumnarCohort.events(filters)?,
            BucketColumn::EventCreatedAt,
        ),
        UserModel::Paying => (
            PAYING_USERS_SQL,
            ColumnarCohort.revenue(filters)?,
            BucketColumn::RevenueCreatedAt,
        ),
    };
    let Cohort { predicate, params } = cohort;
    Template::new(Metric::ArpuUsers, sql, columns::ARPU_USERS)
        .slot("bucket", ColumnarCohort.bucket(granularity, column))
        .slot("cohort", predicate)
        .bind(&params, &ClickHouseDialect)
}

pub fn revenue_statement(
    filters: &QueryFilters,
    granularity: Granularity,
) -> Result<BoundStatement, EngineError> {
    let Cohort { predicate, params } = ColumnarCohort.revenue(filters)?;
    Template::new(Metric::ArpuRevenue, REVENUE_SQL, columns::ARPU_REVENUE)
        .slot(
            "bucket",
            ColumnarCohort.bucket(granularity, BucketColumn::RevenueCreatedAt),
        )
        .slot("cohort", predicate)
        .bind(&params, &ClickHouseDialect)
}
