use waypost_core::analytics::{Metric, QueryFilters};
use waypost_core::cohort::{Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::RelationalCohort;
use crate::dialect::RelationalDialect;

/// `recency = 1` marks each session's last event. Ties on `created_at` are
/// broken by the canonical text form of `event_id`, the same key the columnar
/// store uses, so exactly one event per session ranks first.
const DROPOFF_SQL: &str = r#"
WITH ranked AS (
    SELECT
        e.session_id,
        e.event_name,
        ROW_NUMBER() OVER (
            PARTITION BY e.session_id
            ORDER BY e.created_at DESC, CAST(e.event_id AS VARCHAR) DESC
        ) AS recency
    FROM website_event e
    WHERE [[cohort]]
)
SELECT
    event_name,
    COUNT(DISTINCT session_id) AS sessions_with_event,
    COUNT(DISTINCT CASE WHEN recency = 1 THEN session_id END) AS dropoff_sessions
FROM ranked
WHERE event_name IS NOT NULL
GROUP BY event_name
ORDER BY dropoff_sessions DESC, event_name
"#;

pub fn statement(filters: &QueryFilters) -> Result<BoundStatement, EngineError> {
    let Cohort { predicate, params } = RelationalCohort.events(filters)?;
    Template::new(Metric::Dropoff, DROPOFF_SQL, columns::DROPOFF)
        .slot("cohort", predicate)
        .bind(&params, &RelationalDialect)
}
