use waypost_core::analytics::{Granularity, PathMatch, QueryFilters};
use waypost_core::cohort::{BucketColumn, Cohort, CohortCompiler};
use waypost_core::error::EngineError;
use waypost_core::sql::{Params, SqlBuilder, SqlFragment, TypeHint};

/// Filter compiler for the relational schema, where session attributes
/// (country, device, browser, os) live on `session` and are reached through
/// an `IN` sub-query aliased `cohort_s`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationalCohort;

impl RelationalCohort {
    /// Predicate over `session s`. Used by the churn query, whose driving
    /// table is the session rather than the event.
    pub fn sessions(&self, filters: &QueryFilters) -> Result<Cohort, EngineError> {
        let mut params = scope_params(filters)?;
        let mut sql = SqlBuilder::new();
        sql.push("s.website_id = ")
            .param("cohort_website_id", Some(TypeHint::Uuid))
            .push(" AND s.created_at >= ")
            .param("cohort_start", Some(TypeHint::Timestamp))
            .push(" AND s.created_at < ")
            .param("cohort_end", Some(TypeHint::Timestamp));
        segment_conditions(&mut sql, &mut params, filters, "s")?;
        Ok(Cohort {
            predicate: sql.build(),
            params,
        })
    }
}

impl CohortCompiler for RelationalCohort {
    fn events(&self, filters: &QueryFilters) -> Result<Cohort, EngineError> {
        let mut params = scope_params(filters)?;
        let mut sql = SqlBuilder::new();
        scope_conditions(&mut sql, "e");
        event_conditions(&mut sql, &mut params, filters, "e")?;
        if filters.segment.has_session_predicates() {
            sql.push(
                " AND e.session_id IN (SELECT cohort_s.session_id FROM session cohort_s WHERE cohort_s.website_id = ",
            )
            .param("cohort_website_id", Some(TypeHint::Uuid));
            segment_conditions(&mut sql, &mut params, filters, "cohort_s")?;
            sql.push(")");
        }
        Ok(Cohort {
            predicate: sql.build(),
            params,
        })
    }

    fn revenue(&self, filters: &QueryFilters) -> Result<Cohort, EngineError> {
        let mut params = scope_params(filters)?;
        let mut sql = SqlBuilder::new();
        scope_conditions(&mut sql, "r");
        if has_event_predicates(filters) {
            sql.push(
                " AND r.session_id IN (SELECT cohort_e.session_id FROM website_event cohort_e WHERE ",
            );
            scope_conditions(&mut sql, "cohort_e");
            event_conditions(&mut sql, &mut params, filters, "cohort_e")?;
            sql.push(")");
        }
        if filters.segment.has_session_predicates() {
            sql.push(
                " AND r.session_id IN (SELECT cohort_s.session_id FROM session cohort_s WHERE cohort_s.website_id = ",
            )
            .param("cohort_website_id", Some(TypeHint::Uuid));
            segment_conditions(&mut sql, &mut params, filters, "cohort_s")?;
            sql.push(")");
        }
        Ok(Cohort {
            predicate: sql.build(),
            params,
        })
    }

    fn page_path(&self, normalize: bool) -> SqlFragment {
        if normalize {
            SqlFragment::trusted("lower(split_part(split_part(e.url_path, '?', 1), '#', 1))")
        } else {
            SqlFragment::trusted("e.url_path")
        }
    }

    fn bucket(&self, granularity: Granularity, column: BucketColumn) -> SqlFragment {
        let unit = match granularity {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        };
        let column = match column {
            BucketColumn::EventCreatedAt => "e.created_at",
            BucketColumn::RevenueCreatedAt => "r.created_at",
            BucketColumn::FirstView => "v.first_view",
        };
        let mut sql = SqlBuilder::new();
        sql.push("CAST(date_trunc('")
            .push(unit)
            .push("', ")
            .push(column)
            .push(") AS DATE)");
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

fn has_event_predicates(filters: &QueryFilters) -> bool {
    filters.event_type.is_some()
        || filters.event_name.is_some()
        || filters.url_path.is_some()
        || filters.segment.utm_source.is_some()
        || filters.segment.referrer.is_some()
}

fn event_conditions(
    sql: &mut SqlBuilder,
    params: &mut Params,
    filters: &QueryFilters,
    alias: &'static str,
) -> Result<(), EngineError> {
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
                sql.push(" AND strpos(")
                    .push(alias)
                    .push(".url_path, ")
                    .param("cohort_url_path", Some(TypeHint::Text))
                    .push(") > 0");
            }
        }
    }
    if let Some(source) = &filters.segment.utm_source {
        params.set("cohort_utm_source", source.as_str())?;
        sql.push(" AND ")
            .push(alias)
            .push(".utm_source = ")
            .param("cohort_utm_source", Some(TypeHint::Text));
    }
    if let Some(referrer) = &filters.segment.referrer {
        params.set("cohort_referrer", referrer.as_str())?;
        sql.push(" AND ")
            .push(alias)
            .push(".referrer_domain = ")
            .param("cohort_referrer", Some(TypeHint::Text));
    }
    Ok(())
}

fn segment_conditions(
    sql: &mut SqlBuilder,
    params: &mut Params,
    filters: &QueryFilters,
    alias: &'static str,
) -> Result<(), EngineError> {
    let segment = &filters.segment;
    let columns: [(&Option<String>, &'static str, &'static str); 4] = [
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
