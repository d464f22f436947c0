use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use waypost_core::analytics::Granularity;

use crate::{error::AppError, routes::common::MetricQuery, state::AppState};

/// `GET /api/websites/{website_id}/bounce-rate` - Single-view visits per bucket.
pub async fn bounce_rate(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(query): Query<MetricQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filters = query.filters(website_id)?;
    let granularity = Granularity::parse(query.granularity.as_deref())?;
    let rows = state.engine.bounce_rate(&filters, granularity).await?;
    Ok(Json(json!({ "data": rows })))
}
