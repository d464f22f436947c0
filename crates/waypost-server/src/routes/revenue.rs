use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use waypost_core::analytics::{Granularity, UserModel};

use crate::{error::AppError, routes::common::MetricQuery, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ArpuParams {
    /// `active` (default) or `paying`.
    pub model: Option<String>,
    #[serde(flatten)]
    pub common: MetricQuery,
}

/// `GET /api/websites/{website_id}/arpu` - Revenue per user, per bucket.
pub async fn arpu(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(params): Query<ArpuParams>,
) -> Result<impl IntoResponse, AppError> {
    let filters = params.common.filters(website_id)?;
    let granularity = Granularity::parse(params.common.granularity.as_deref())?;
    let model = UserModel::parse(params.model.as_deref())?;
    let rows = state.engine.arpu(&filters, granularity, model).await?;
    Ok(Json(json!({ "data": rows })))
}

/// `GET /api/websites/{website_id}/arpu/users` - ARPU denominator.
pub async fn users(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(params): Query<ArpuParams>,
) -> Result<impl IntoResponse, AppError> {
    let filters = params.common.filters(website_id)?;
    let granularity = Granularity::parse(params.common.granularity.as_deref())?;
    let model = UserModel::parse(params.model.as_deref())?;
    let rows = state
        .engine
        .arpu_users(&filters, granularity, model)
        .await?;
    Ok(Json(json!({ "data": rows })))
}

/// `GET /api/websites/{website_id}/arpu/revenue` - ARPU numerator.
pub async fn revenue(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(query): Query<MetricQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filters = query.filters(website_id)?;
    let granularity = Granularity::parse(query.granularity.as_deref())?;
    let rows = state.engine.arpu_revenue(&filters, granularity).await?;
    Ok(Json(json!({ "data": rows })))
}
