use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::{error::AppError, routes::common::MetricQuery, state::AppState};

/// `GET /api/websites/{website_id}/click-through` - Event rows with session
/// attributes, oldest first.
pub async fn click_through(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(query): Query<MetricQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filters = query.filters(website_id)?;
    let rows = state.engine.click_through(&filters).await?;
    Ok(Json(json!({ "data": rows })))
}
