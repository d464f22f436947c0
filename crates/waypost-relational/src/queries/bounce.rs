use waypost_core::analytics::{Granularity, Metric, QueryFilters};
use waypost_core::cohort::{BucketColumn, Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::RelationalCohort;
use crate::dialect::RelationalDialect;

/// The cohort only selects which visits are reported. Each visit is then
/// measured over all of its page views, and reported in the bucket of its
/// first view when that view falls inside the window.
const BOUNCE_SQL: &str = r#"
WITH touched AS (
    SELECT DISTINCT e.visit_id
    FROM website_event e
    WHERE [[cohort]]
      AND e.event_type = 1
),
visits AS (
    SELECT
        w.visit_id,
        MIN(w.created_at) AS first_view,
        COUNT(*) AS page_views
    FROM website_event w
    WHERE w.website_id = {{cohort_website_id::uuid}}
      AND w.event_type = 1
      AND w.visit_id IN (SELECT t.visit_id FROM touched t)
    GROUP BY w.visit_id
)
SELECT
    [[bucket]] AS bucket_start,
    COUNT(*) AS visits,
    COUNT(*) FILTER (WHERE v.page_views = 1) AS bounces
FROM visits v
WHERE v.first_view >= {{cohort_start::timestamp}}
  AND v.first_view < {{cohort_end::timestamp}}
GROUP BY bucket_start
ORDER BY bucket_start
"#;

pub fn statement(
    filters: &QueryFilters,
    granularity: Granularity,
) -> Result<BoundStatement, EngineError> {
    let Cohort { predicate, params } = RelationalCohort.events(filters)?;
    Template::new(Metric::BounceRate, BOUNCE_SQL, columns::BOUNCE_RATE)
        .slot(
            "bucket",
            RelationalCohort.bucket(granularity, BucketColumn::FirstView),
        )
        .slot("cohort", predicate)
        .bind(&params, &RelationalDialect)
}
