use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use waypost_core::analytics::FunnelQuery;

use crate::{error::AppError, routes::common::MetricQuery, state::AppState};

#[derive(Debug, Deserialize)]
pub struct FunnelParams {
    pub from_event: Option<String>,
    pub to_event: Option<String>,
    #[serde(flatten)]
    pub common: MetricQuery,
}

/// `GET /api/websites/{website_id}/funnel` - Two-step conversion.
pub async fn funnel(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(params): Query<FunnelParams>,
) -> Result<impl IntoResponse, AppError> {
    let filters = params.common.filters(website_id)?;
    let query = FunnelQuery {
        from_event: params.from_event.unwrap_or_default(),
        to_event: params.to_event.unwrap_or_default(),
    };
    let result = state.engine.funnel(&filters, &query).await?;
    Ok(Json(json!({ "data": result })))
}
