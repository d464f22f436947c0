use waypost_core::analytics::{Metric, QueryFilters};
use waypost_core::cohort::{Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::ColumnarCohort;
use crate::dialect::ClickHouseDialect;

/// `lasts` picks each session's final event over every event type; ties on
/// `created_at` fall to the `event_id` whose canonical text form sorts last.
/// Native UUID ordering here differs from the relational store's byte order,
/// the text form does not.
const DROPOFF_SQL: &str = r#"
WITH lasts AS (
    SELECT
        e.session_id AS session_id,
        argMax(e.event_id, (e.created_at, toString(e.event_id))) AS last_event_id
    FROM website_event AS e
    WHERE [[cohort]]
    GROUP BY e.session_id
)
SELECT
    e.event_name AS event_label,
    uniqExact(e.session_id) AS sessions_with_event,
    uniqExactIf(e.session_id, e.event_id = l.last_event_id) AS dropoff_sessions
FROM website_event AS e
INNER JOIN lasts AS l ON l.session_id = e.session_id
WHERE [[cohort]]
  AND e.event_name != ''
GROUP BY event_label
ORDER BY dropoff_sessions DESC, event_label
"#;

pub fn statement(filters: &QueryFilters) -> Result<BoundStatement, EngineError> {
    let Cohort { predicate, params } = ColumnarCohort.events(filters)?;
    Template::new(Metric::Dropoff, DROPOFF_SQL, columns::DROPOFF)
        .slot("cohort", predicate)
        .bind(&params, &ClickHouseDialect)
}
