use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use waypost_core::analytics::PathQuery;

use crate::{
    error::AppError,
    routes::common::{parse_flag, MetricQuery},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct PathParams {
    pub normalize: Option<String>,
    #[serde(flatten)]
    pub common: MetricQuery,
}

/// `GET /api/websites/{website_id}/paths` - Page-to-page transitions.
pub async fn paths(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(params): Query<PathParams>,
) -> Result<impl IntoResponse, AppError> {
    let filters = params.common.filters(website_id)?;
    let query = PathQuery {
        normalize: parse_flag("normalize", params.normalize.as_deref())?,
    };
    let rows = state.engine.path_transitions(&filters, &query).await?;
    Ok(Json(json!({ "data": rows })))
}
