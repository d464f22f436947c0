use waypost_core::analytics::{Metric, PathQuery, QueryFilters};
use waypost_core::cohort::{Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::ColumnarCohort;
use crate::dialect::ClickHouseDialect;

const PATHS_SQL: &str = r#"
WITH views AS (
    SELECT
        e.visit_id AS visit,
        [[path]] AS page_path,
        row_number() OVER (
            PARTITION BY e.visit_id
            ORDER BY e.created_at, toString(e.event_id)
        ) AS step
    FROM website_event AS e
    WHERE [[cohort]]
      AND e.event_type = 1
)
SELECT
    a.page_path AS from_path,
    b.page_path AS to_path,
    count() AS transitions
FROM views AS a
LEFT JOIN views AS b ON b.visit = a.visit AND b.step = a.step + 1
GROUP BY from_path, to_path
ORDER BY transitions DESC, from_path, to_path NULLS LAST
SETTINGS join_use_nulls = 1
"#;

pub fn statement(
    filters: &QueryFilters,
    query: &PathQuery,
) -> Result<BoundStatement, EngineError> {
    let Cohort { predicate, params } = ColumnarCohort.events(filters)?;
    Template::new(Metric::PathTransitions, PATHS_SQL, columns::PATH_TRANSITIONS)
        .slot("path", ColumnarCohort.page_path(query.normalize))
        .slot("cohort", predicate)
        .bind(&params, &ClickHouseDialect)
}
