use std::sync::Arc;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware is applied in outer-to-inner order:
///
/// 1. `CorsLayer`: any origin unless `WAYPOST_CORS_ORIGINS` lists some.
/// 2. `TraceLayer`: structured request/response logging via `tracing`.
/// 3. `CompressionLayer`: gzip for large row sets such as click-through.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/websites/{website_id}/funnel", get(routes::funnel::funnel))
        .route("/api/websites/{website_id}/dropoff", get(routes::events::dropoff))
        .route(
            "/api/websites/{website_id}/activation",
            get(routes::events::activation),
        )
        .route("/api/websites/{website_id}/paths", get(routes::paths::paths))
        .route("/api/websites/{website_id}/churn", get(routes::churn::churn))
        .route("/api/websites/{website_id}/arpu", get(routes::revenue::arpu))
        .route(
            "/api/websites/{website_id}/arpu/users",
            get(routes::revenue::users),
        )
        .route(
            "/api/websites/{website_id}/arpu/revenue",
            get(routes::revenue::revenue),
        )
        .route(
            "/api/websites/{website_id}/bounce-rate",
            get(routes::bounce::bounce_rate),
        )
        .route(
            "/api/websites/{website_id}/click-through",
            get(routes::click_through::click_through),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(allowed)
    }
}
