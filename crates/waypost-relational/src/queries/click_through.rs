use waypost_core::analytics::{Metric, QueryFilters};
use waypost_core::cohort::{Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::RelationalCohort;
use crate::dialect::RelationalDialect;

const CLICK_THROUGH_SQL: &str = r#"
SELECT
    CAST(e.session_id AS VARCHAR) AS session_id,
    e.created_at AS created_at,
    e.event_type AS event_type,
    e.event_name AS event_name,
    e.url_path AS url_path,
    e.utm_source AS utm_source,
    s.device AS device,
    s.country AS country
FROM website_event e
LEFT JOIN session s ON s.session_id = e.session_id
WHERE [[cohort]]
ORDER BY e.created_at, CAST(e.event_id AS VARCHAR)
"#;

pub fn statement(filters: &QueryFilters) -> Result<BoundStatement, EngineError> {
    let Cohort { predicate, params } = RelationalCohort.events(filters)?;
    Template::new(Metric::ClickThrough, CLICK_THROUGH_SQL, columns::CLICK_THROUGH)
        .slot("cohort", predicate)
        .bind(&params, &RelationalDialect)
}
