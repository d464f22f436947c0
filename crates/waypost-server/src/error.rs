use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use waypost_core::error::{BackendErrorKind, EngineError};

/// Application-level errors that map directly to HTTP responses.
///
/// Handlers return `Result<impl IntoResponse, AppError>`; engine errors
/// convert via `?`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("backend timeout: {0}")]
    BackendTimeout(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(msg) => AppError::BadRequest(msg),
            EngineError::NotImplemented { .. } => AppError::NotImplemented(e.to_string()),
            EngineError::Backend(err) => match err.kind {
                BackendErrorKind::Timeout => AppError::BackendTimeout(err.to_string()),
                _ => AppError::Backend(err.to_string()),
            },
            EngineError::Binding(_) => AppError::Internal(anyhow::Error::new(e)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.as_str())
            }
            AppError::NotImplemented(msg) => {
                (StatusCode::NOT_IMPLEMENTED, "not_implemented", msg.as_str())
            }
            AppError::BackendTimeout(msg) => {
                tracing::warn!("Backend timeout: {msg}");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "backend_timeout",
                    "Analytics query timed out",
                )
            }
            AppError::Backend(msg) => {
                tracing::error!("Backend error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "backend_error",
                    "Analytics backend failed",
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };

        (
            status,
            Json(json!({
                "error": {
                    "code": code,
                    "message": message,
                    "field": null
                }
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use waypost_core::analytics::{BackendKind, Metric};
    use waypost_core::error::BackendError;

    use super::*;

    #[test]
    fn engine_errors_map_to_statuses() {
        let cases = [
            (EngineError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                EngineError::not_implemented(Metric::BounceRate, BackendKind::Columnar),
                StatusCode::NOT_IMPLEMENTED,
            ),
            (
                BackendError::timeout(BackendKind::Relational, std::time::Duration::from_secs(1))
                    .into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                BackendError::new(BackendKind::Columnar, BackendErrorKind::Connection, "refused")
                    .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                EngineError::Binding("unbound".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
