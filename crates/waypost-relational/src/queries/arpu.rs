use waypost_core::analytics::{Granularity, Metric, QueryFilters, UserModel};
use waypost_core::cohort::{BucketColumn, Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::RelationalCohort;
use crate::dialect::RelationalDialect;

const ACTIVE_USERS_SQL: &str = r#"
SELECT
    [[bucket]] AS bucket_start,
    COUNT(DISTINCT e.session_id) AS user_count
FROM website_event e
WHERE [[cohort]]
GROUP BY bucket_start
ORDER BY bucket_start
"#;

const PAYING_USERS_SQL: &str = r#"
SELECT
    [[bucket]] AS bucket_start,
    COUNT(DISTINCT r.session_id) AS user_count
FROM revenue r
WHERE [[cohort]]
  AND r.revenue > 0
GROUP BY bucket_start
ORDER BY bucket_start
"#;

const REVENUE_SQL: &str = r#"
SELECT
    [[bucket]] AS bucket_start,
    CAST(COALESCE(SUM(r.revenue), 0) AS FLOAT8) AS total_revenue
FROM revenue r
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
            RelationalCohort.events(filters)?,
            BucketColumn::EventCreatedAt,
        ),
        UserModel::Paying => (
            PAYING_USERS_SQL,
            RelationalCohort.revenue(filters)?,
            BucketColumn::RevenueCreatedAt,
        ),
    };
    let Cohort { predicate, params } = cohort;
    Template::new(Metric::ArpuUsers, sql, columns::ARPU_USERS)
        .slot("bucket", RelationalCohort.bucket(granularity, column))
        .slot("cohort", predicate)
        .bind(&params, &RelationalDialect)
}

pub fn revenue_statement(
    filters: &QueryFilters,
    granularity: Granularity,
) -> Result<BoundStatement, EngineError> {
    let Cohort { predicate, params } = RelationalCohort.revenue(filters)?;
    Template::new(Metric::ArpuRevenue, REVENUE_SQL, columns::ARPU_REVENUE)
        .slot(
            "bucket",
            RelationalCohort.bucket(granularity, BucketColumn::RevenueCreatedAt),
        )
        .slot("cohort", predicate)
        .bind(&params, &RelationalDialect)
}
