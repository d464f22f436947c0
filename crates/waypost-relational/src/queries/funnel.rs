use waypost_core::analytics::{FunnelQuery, Metric, QueryFilters};
use waypost_core::cohort::{Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::RelationalCohort;
use crate::dialect::RelationalDialect;

/// A session converts when its latest `to` event is strictly later than its
/// earliest `from` event.
const FUNNEL_SQL: &str = r#"
WITH starts AS (
    SELECT e.session_id, MIN(e.created_at) AS first_at
    FROM website_event e
    WHERE [[cohort]]
      AND e.event_name = {{funnel_from::text}}
    GROUP BY e.session_id
),
completions AS (
    SELECT e.session_id, MAX(e.created_at) AS last_at
    FROM website_event e
    WHERE [[cohort]]
      AND e.event_name = {{funnel_to::text}}
    GROUP BY e.session_id
)
SELECT
    COUNT(*) AS started,
    COUNT(*) FILTER (WHERE c.last_at > s.first_at) AS converted
FROM starts s
LEFT JOIN completions c ON c.session_id = s.session_id
"#;

pub fn statement(
    filters: &QueryFilters,
    query: &FunnelQuery,
) -> Result<BoundStatement, EngineError> {
    let Cohort {
        predicate,
        mut params,
    } = RelationalCohort.events(filters)?;
    params
        .set("funnel_from", query.from_event.as_str())?
        .set("funnel_to", query.to_event.as_str())?;
    Template::new(Metric::Funnel, FUNNEL_SQL, columns::FUNNEL)
        .slot("cohort", predicate)
        .bind(&params, &RelationalDialect)
}
