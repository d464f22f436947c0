use waypost_core::analytics::{Granularity, PathMatch, QueryFilters};
use waypost_core::cohort::{BucketColumn, Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::sql::{Params, SqlBuilder, SqlFragment, TypeHint};

/// Filter compiler for the columnar schema. Session attributes are
/// denormalized onto every `website_event` row, so segment predicates apply
/// directly to the event alias.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnarCohort;

impl CohortCompiler for ColumnarCohort {
    fn events(&self, filters: &QueryFilters) -> Result<Cohort, EngineError> {
        let mut params = scope_params(filters)?;
        let mut sql = SqlBuilder::new();
        event_conditions(&mut sql, &mut params, filters, "e")?;
        Ok(Cohort {
            predicate: sql.build(),
            params,
        })
    }

    fn revenue(&self, filters: &QueryFilters) -> Result<Cohort, EngineError> {
        let mut params = scope_params(filters)?;
        let mut sql = SqlBuilder::new();
        scope_conditions(&mut sql, "r");
        if narrows_events(filters) {
            sql.push(" AND r.session_id IN (SELECT cohort_e.session_id FROM website_event AS cohort_e WHERE ");
            event_conditions(&mut sql, &mut params, filters, "cohort_e")?;
            sql.push(")");
        }
        Ok(Cohort {
            predicate: sql.build(),
            params,
        })
    }

    fn page_path(&self, normalize: bool) -> SqlFragment {
        if normalize {
            SqlFragment::trusted(
                "lowerUTF8(splitByChar('#', splitByChar('?', e.url_path)[1])[1])",
            )
        } else {
            SqlFragment::trusted("e.url_path")
        }
    }

    fn bucket(&self, granularity: Granularity, column: BucketColumn) -> SqlFragment {
        let function = match granularity {
            Granularity::Day => "toDate(",
            Granularity::Week => "toMonday(",
            Granularity::Month => "toStartOfMonth(",
        };
        let column = match column {
            BucketColumn::EventCreatedAt => "e.created_at",
            BucketColumn::RevenueCreatedAt => "r.created_at",
            BucketColumn::FirstView => "v.first_view",
        };
        let mut sql = SqlBuilder::new();
        sql.push(function).push(column).push(")");
        sql.build()
    }
}

fn scope_params(filters: &QueryFilters) -> Result<Params, EngineError> {
    let mut params = Params::new();
    params
        .set("cohort_website_id", filters.website_uuid()?)?
        .set("cohort_start", filters.window_start())?
        .set("cohort_end", filters.window_end())?;
    Ok(params)
}

fn scope_conditions(sql: &mut SqlBuilder, alias: &'static str) {
    sql.push(alias)
        .push(".website_id = ")
        .param("cohort_website_id", Some(TypeHint::Uuid))
        .push(" AND ")
        .push(alias)
        .push(".created_at >= ")
        .param("cohort_start", Some(TypeHint::Timestamp))
        .push(" AND ")
        .push(alias)
        .push(".created_at < ")
        .param("cohort_end", Some(TypeHint::Timestamp));
}

fn narrows_events(filters: &QueryFilters) -> bool {
    filters.event_type.is_some()
        || filters.event_name.is_some()
        || filters.url_path.is_some()
        || filters.segment != Default::default()
}

/// Scope plus every event and segment predicate on `alias`.
fn event_conditions(
    sql: &mut SqlBuilder,
    params: &mut Params,
    filters: &QueryFilters,
    alias: &'static str,
) -> Result<(), EngineError> {
    scope_conditions(sql, alias);
    if let Some(event_type) = filters.event_type {
        params.set("cohort_event_type", event_type.code())?;
        sql.push(" AND ")
            .push(alias)
            .push(".event_type = ")
            .param("cohort_event_type", Some(TypeHint::Int));
    }
    if let Some(name) = &filters.event_name {
        params.set("cohort_event_name", name.as_str())?;
        sql.push(" AND ")
            .push(alias)
            .push(".event_name = ")
            .param("cohort_event_name", Some(TypeHint::Text));
    }
    if let Some(path) = &filters.url_path {
        params.set("cohort_url_path", path.value.as_str())?;
        match path.op {
            PathMatch::Equals => {
                sql.push(" AND ")
                    .push(alias)
                    .push(".url_path = ")
                    .param("cohort_url_path", Some(TypeHint::Text));
            }
            PathMatch::Contains => {
                sql.push(" AND position(")
                    .push(alias)
                    .push(".url_path, ")
                    .param("cohort_url_path", Some(TypeHint::Text))
                    .push(") > 0");
            }
        }
    }

    let segment = &filters.segment;
    let columns: [(&Option<String>, &'static str, &'static str); 6] = [
        (&segment.utm_source, ".utm_source = ", "cohort_utm_source"),
        (&segment.referrer, ".referrer_domain = ", "cohort_referrer"),
        (&segment.country, ".country = ", "cohort_country"),
        (&segment.device, ".device = ", "cohort_device"),
        (&segment.browser, ".browser = ", "cohort_browser"),
        (&segment.os, ".os = ", "cohort_os"),
    ];
    for (value, column, name) in columns {
        if let Some(value) = value {
            params.set(name, value.as_str())?;
            sql.push(" AND ")
                .push(alias)
                .push(column)
                .param(name, Some(TypeHint::Text));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn filters() -> QueryFilters {
        QueryFilters::new(
            "5a1c4c4e-8f6b-4d4e-9a77-0f1c8f3b2a10",
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap_or_default(),
            NaiveDate::from_ymd_opt(2025, 7, 31).unwrap_or_default(),
        )
    }

    #[test]
    fn segment_predicates_hit_denormalized_columns() {
        let mut f = filters();
        f.segment.country = Some("DE".to_string());
        f.segment.device = Some("mobile".to_string());
        let cohort = ColumnarCohort.events(&f).expect("cohort");
        let sql = cohort.predicate.as_str();
        assert!(sql.contains("e.country = {{cohort_country::text}}"));
        assert!(sql.contains("e.device = {{cohort_device::text}}"));
        assert!(!sql.contains("session"));
        assert_eq!(cohort.params.len(), 5);
    }

    #[test]
    fn revenue_without_filters_touches_only_revenue() {
        let cohort = ColumnarCohort.revenue(&filters()).expect("cohort");
        assert!(!cohort.predicate.as_str().contains("cohort_e"));

        let mut f = filters();
        f.segment.utm_source = Some("newsletter".to_string());
        let cohort = ColumnarCohort.revenue(&f).expect("cohort");
        assert!(cohort
            .predicate
            .as_str()
            .contains("FROM website_event AS cohort_e WHERE cohort_e.website_id"));
    }

    #[test]
    fn buckets_use_native_truncation() {
        assert_eq!(
            ColumnarCohort
                .bucket(Granularity::Week, BucketColumn::EventCreatedAt)
                .as_str(),
            "toMonday(e.created_at)"
        );
    }
}
