use waypost_core::analytics::{FunnelQuery, Metric, QueryFilters};
use waypost_core::cohort::{Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::ColumnarCohort;
use crate::dialect::ClickHouseDialect;

const FUNNEL_SQL: &str = r#"
WITH starts AS (
    SELECT e.session_id AS session_id, min(e.created_at) AS first_at
    FROM website_event AS e
    WHERE [[cohort]]
      AND e.event_name = {{funnel_from::text}}
    GROUP BY e.session_id
),
completions AS (
    SELECT e.session_id AS session_id, max(e.created_at) AS last_at
    FROM website_event AS e
    WHERE [[cohort]]
      AND e.event_name = {{funnel_to::text}}
    GROUP BY e.session_id
)
SELECT
    count() AS started,
    countIf(c.last_at > s.first_at) AS converted
FROM starts AS s
LEFT JOIN completions AS c ON c.session_id = s.session_id
SETTINGS join_use_nulls = 1
"#;

pub fn statement(
    filters: &QueryFilters,
    query: &FunnelQuery,
) -> Result<BoundStatement, EngineError> {
    let Cohort {
        predicate,
        mut params,
    } = ColumnarCohort.events(filters)?;
    params
        .set("funnel_from", query.from_event.as_str())?
        .set("funnel_to", query.to_event.as_str())?;
    Template::new(Metric::Funnel, FUNNEL_SQL, columns::FUNNEL)
        .slot("cohort", predicate)
        .bind(&params, &ClickHouseDialect)
}
