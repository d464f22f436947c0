use waypost_core::analytics::{Metric, QueryFilters};
use waypost_core::cohort::{Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::ColumnarCohort;
use crate::dialect::ClickHouseDialect;

/// Empty strings are the columnar schema's "absent"; they come back as NULL.
/// Aliases avoid the source column names so the cohort predicate still
/// resolves `e.<column>` to the stored value.
const CLICK_THROUGH_SQL: &str = r#"
SELECT
    toString(e.session_id) AS session_label,
    e.created_at AS touched_at,
    e.event_type AS kind,
    nullIf(e.event_name, '') AS event_label,
    e.url_path AS page,
    nullIf(e.utm_source, '') AS source_label,
    nullIf(e.device, '') AS device_label,
    nullIf(e.country, '') AS country_label
FROM website_event AS e
WHERE [[cohort]]
ORDER BY e.created_at, toString(e.event_id)
"#;

pub fn statement(filters: &QueryFilters) -> Result<BoundStatement, EngineError> {
    let Cohort { predicate, params } = ColumnarCohort.events(filters)?;
    Template::new(Metric::ClickThrough, CLICK_THROUGH_SQL, columns::CLICK_THROUGH)
        .slot("cohort", predicate)
        .bind(&params, &ClickHouseDialect)
}
