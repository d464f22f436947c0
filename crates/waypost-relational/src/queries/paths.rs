use waypost_core::analytics::{Metric, PathQuery, QueryFilters};
use waypost_core::cohort::{Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::RelationalCohort;
use crate::dialect::RelationalDialect;

/// Step n joins step n + 1 of the same visit. The left join keeps each
/// visit's last view, paired with a NULL `to_path` (the exit).
const PATHS_SQL: &str = r#"
WITH views AS (
    SELECT
        e.visit_id,
        [[path]] AS page_path,
        ROW_NUMBER() OVER (
            PARTITION BY e.visit_id
            ORDER BY e.created_at, CAST(e.event_id AS VARCHAR)
        ) AS step
    FROM website_event e
    WHERE [[cohort]]
      AND e.event_type = 1
)
SELECT
    a.page_path AS from_path,
    b.page_path AS to_path,
    COUNT(*) AS transitions
FROM views a
LEFT JOIN views b ON b.visit_id = a.visit_id AND b.step = a.step + 1
GROUP BY a.page_path, b.page_path
ORDER BY transitions DESC, from_path, to_path NULLS LAST
"#;

pub fn statement(
    filters: &QueryFilters,
    query: &PathQuery,
) -> Result<BoundStatement, EngineError> {
    let Cohort { predicate, params } = RelationalCohort.events(filters)?;
    Template::new(Metric::PathTransitions, PATHS_SQL, columns::PATH_TRANSITIONS)
        .slot("path", RelationalCohort.page_path(query.normalize))
        .slot("cohort", predicate)
        .bind(&params, &RelationalDialect)
}
