use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use waypost_core::analytics::ActivationQuery;

use crate::{error::AppError, routes::common::MetricQuery, state::AppState};

/// `GET /api/websites/{website_id}/dropoff` - Last event per session, by name.
pub async fn dropoff(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(query): Query<MetricQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filters = query.filters(website_id)?;
    let rows = state.engine.dropoff(&filters).await?;
    Ok(Json(json!({ "data": rows })))
}

#[derive(Debug, Deserialize)]
pub struct ActivationParams {
    /// The activation event. Distinct from the `event_name` filter.
    pub activation_event: Option<String>,
    #[serde(flatten)]
    pub common: MetricQuery,
}

/// `GET /api/websites/{website_id}/activation` - Same-day activation.
pub async fn activation(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(params): Query<ActivationParams>,
) -> Result<impl IntoResponse, AppError> {
    let filters = params.common.filters(website_id)?;
    let query = ActivationQuery {
        event_name: params.activation_event.unwrap_or_default(),
    };
    let result = state.engine.activation(&filters, &query).await?;
    Ok(Json(json!({ "data": result })))
}
