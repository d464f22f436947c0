use std::fmt;

use thiserror::Error;

use crate::analytics::{BackendKind, Metric};

/// Every failure a metric invocation can surface.
///
/// An empty result set is *not* an error: metrics return `Ok(vec![])` (or a
/// zero-valued scalar result) when nothing matched.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The selected backend has no implementation for this metric.
    #[error("metric `{metric}` is not implemented for the {backend} backend")]
    NotImplemented { metric: Metric, backend: BackendKind },

    /// Malformed caller input, rejected before any query runs.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The store rejected or failed the query.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A template could not be rendered or bound.
    #[error("statement binding failed: {0}")]
    Binding(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn binding(msg: impl Into<String>) -> Self {
        Self::Binding(msg.into())
    }

    pub fn not_implemented(metric: Metric, backend: BackendKind) -> Self {
        Self::NotImplemented { metric, backend }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    Connection,
    Query,
    Timeout,
    Decode,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connection => "connection error",
            Self::Query => "query error",
            Self::Timeout => "timeout",
            Self::Decode => "decode error",
        };
        f.write_str(s)
    }
}

/// A failure reported by (or while talking to) a backend store.
///
/// `message` carries the store's own diagnostic verbatim and `code` the
/// native error code when one is available (SQLSTATE for Postgres,
/// `X-ClickHouse-Exception-Code` for ClickHouse).
#[derive(Debug, Clone, Error)]
#[error("{backend} backend {kind}: {message}")]
pub struct BackendError {
    pub backend: BackendKind,
    pub kind: BackendErrorKind,
    pub code: Option<String>,
    pub message: String,
}

impl BackendError {
    pub fn new(backend: BackendKind, kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            backend,
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn decode(backend: BackendKind, message: impl Into<String>) -> Self {
        Self::new(backend, BackendErrorKind::Decode, message)
    }

    pub fn timeout(backend: BackendKind, after: std::time::Duration) -> Self {
        Self::new(
            backend,
            BackendErrorKind::Timeout,
            format!("query exceeded {} ms", after.as_millis()),
        )
    }
}
