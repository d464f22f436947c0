use waypost_core::analytics::{ActivationQuery, Metric, QueryFilters};
use waypost_core::cohort::{Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::ColumnarCohort;
use crate::dialect::ClickHouseDialect;

/// A session is activated when its earliest activation touch falls on the
/// same UTC day as its earliest touch of any kind.
const ACTIVATION_SQL: &str = r#"
SELECT
    count() AS total_sessions,
    countIf(activated = 1) AS activated_sessions
FROM (
    SELECT
        e.session_id AS touch_session,
        toDate(min(e.created_at)) AS first_day,
        countIf(e.event_name = {{activation_event::text}}) AS touch_count,
        if(
            touch_count > 0
                AND toDate(minIf(e.created_at, e.event_name = {{activation_event::text}})) = first_day,
            1,
            0
        ) AS activated
    FROM website_event AS e
    WHERE [[cohort]]
    GROUP BY e.session_id
)
"#;

pub fn statement(
    filters: &QueryFilters,
    query: &ActivationQuery,
) -> Result<BoundStatement, EngineError> {
    let Cohort {
        predicate,
        mut params,
    } = ColumnarCohort.events(filters)?;
    params.set("activation_event", query.event_name.as_str())?;
    Template::new(Metric::Activation, ACTIVATION_SQL, columns::ACTIVATION)
        .slot("cohort", predicate)
        .bind(&params, &ClickHouseDialect)
}
