use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use waypost_core::analytics::ChurnQuery;

use crate::{error::AppError, routes::common::MetricQuery, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ChurnParams {
    pub lookback_days: Option<String>,
    #[serde(flatten)]
    pub common: MetricQuery,
}

/// `GET /api/websites/{website_id}/churn` - Raw session/last-activity rows.
///
/// `lookback_days` defaults to `WAYPOST_CHURN_LOOKBACK_DAYS`.
pub async fn churn(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(params): Query<ChurnParams>,
) -> Result<impl IntoResponse, AppError> {
    let filters = params.common.filters(website_id)?;
    let lookback_days = match params.lookback_days.as_deref().map(str::trim) {
        None | Some("") => state.config.churn_lookback_days,
        Some(raw) => raw.parse().map_err(|_| {
            AppError::BadRequest(format!("lookback_days must be a positive integer (got `{raw}`)"))
        })?,
    };
    let rows = state
        .engine
        .churn_input(&filters, &ChurnQuery { lookback_days })
        .await?;
    Ok(Json(json!({ "data": rows })))
}
