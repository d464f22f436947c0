use waypost_core::analytics::{ActivationQuery, Metric, QueryFilters};
use waypost_core::cohort::{Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::RelationalCohort;
use crate::dialect::RelationalDialect;

const ACTIVATION_SQL: &str = r#"
WITH touches AS (
    SELECT e.session_id, e.event_name, e.created_at
    FROM website_event e
    WHERE [[cohort]]
),
firsts AS (
    SELECT session_id, MIN(created_at) AS first_at
    FROM touches
    GROUP BY session_id
),
per_session AS (
    SELECT
        f.session_id,
        MAX(CASE
            WHEN t.event_name = {{activation_event::text}}
             AND CAST(t.created_at AS DATE) = CAST(f.first_at AS DATE)
            THEN 1 ELSE 0
        END) AS activated
    FROM firsts f
    JOIN touches t ON t.session_id = f.session_id
    GROUP BY f.session_id
)
SELECT
    COUNT(*) AS total_sessions,
    COUNT(*) FILTER (WHERE activated = 1) AS activated_sessions
FROM per_session
"#;

pub fn statement(
    filters: &QueryFilters,
    query: &ActivationQuery,
) -> Result<BoundStatement, EngineError> {
    let Cohort {
        predicate,
        mut params,
    } = RelationalCohort.events(filters)?;
    params.set("activation_event", query.event_name.as_str())?;
    Template::new(Metric::Activation, ACTIVATION_SQL, columns::ACTIVATION)
        .slot("cohort", predicate)
        .bind(&params, &RelationalDialect)
}
