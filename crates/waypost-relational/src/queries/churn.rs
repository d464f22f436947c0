use waypost_core::analytics::{ChurnQuery, Metric, QueryFilters};
use waypost_core::cohort::Cohort;
use waypost_core::error::EngineError;
use waypost_core::normalize::columns;
use waypost_core::sql::{BoundStatement, Template};

use crate::cohort::RelationalCohort;
use crate::dialect::RelationalDialect;

/// Every candidate session with each of its events in the same interval, or
/// one row with a NULL event time when it has none.
const CHURN_SQL: &str = r#"
SELECT
    CAST(s.session_id AS VARCHAR) AS session_id,
    s.created_at AS session_created_at,
    e.created_at AS event_created_at
FROM session s
LEFT JOIN website_event e
  ON e.session_id = s.session_id
 AND e.created_at >= {{cohort_start::timestamp}}
 AND e.created_at < {{cohort_end::timestamp}}
WHERE [[cohort]]
ORDER BY s.session_id, e.created_at, e.event_id
"#;

/// The session interval starts `lookback_days` before `date_from` and ends
/// with the filter window.
pub fn statement(
    filters: &QueryFilters,
    query: &ChurnQuery,
) -> Result<BoundStatement, EngineError> {
    let widened = QueryFilters {
        date_from: query.lookback_start(filters)?.date_naive(),
        ..filters.clone()
    };
    let Cohort { predicate, params } = RelationalCohort.sessions(&widened)?;
    Template::new(Metric::ChurnInput, CHURN_SQL, columns::CHURN_INPUT)
        .slot("cohort", predicate)
        .bind(&params, &RelationalDialect)
}
