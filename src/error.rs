//! Error types for mcp-bridge
//!
//! One flat error enum carrying the HTTP status each variant surfaces as,
//! per the bridge's error handling design: every client-visible failure
//! carries a short human `error` string and, where available, structured
//! `details`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Result type for bridge operations.
pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    /// Unknown backend id, job id, or confirmation id that was never allocated.
    #[error("not found: {0}")]
    NotFound(String),

    /// Adding a backend whose id already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing required field, invalid risk level, invalid URL, malformed job id, etc.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or mismatched bearer token on job polling.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Expired confirmation or expired job.
    #[error("gone: {0}")]
    Gone(String),

    /// JSON-RPC error frame from a backend, decode failure, or isolation-runtime failure.
    #[error("upstream error: {message}")]
    UpstreamError {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Per-request deadline exceeded, SSE session deadline, SSE response deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Adapter lost its connection; the session transitions to `error` and is removed.
    #[error("transport closed: {0}")]
    TransportClosed(String),

    /// Invalid or unloadable configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProxyError {
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamError {
            message: message.into(),
            details: None,
        }
    }

    pub fn upstream_with_details(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::UpstreamError {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Status code this error surfaces as, per the error handling design.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Gone(_) => StatusCode::GONE,
            Self::UpstreamError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::TransportClosed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration(_) => StatusCode::BAD_REQUEST,
            Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for transport-layer failures worth retrying (SSE session/response
    /// acquisition, transient connection loss).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::TransportClosed(_) | Self::Http(_) | Self::Io(_)
        )
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::UpstreamError { details, .. } => details.clone(),
            _ => None,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if matches!(self, Self::TransportClosed(_)) {
            tracing::error!(error = %self, "transport closed");
        }
        let mut body = json!({ "error": self.to_string() });
        if let Some(details) = self.details() {
            body["details"] = details;
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_handling_design() {
        assert_eq!(ProxyError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ProxyError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ProxyError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ProxyError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ProxyError::Gone("x".into()).status(), StatusCode::GONE);
        assert_eq!(ProxyError::upstream("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ProxyError::Timeout("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn retryable_errors() {
        assert!(ProxyError::Timeout("x".into()).is_retryable());
        assert!(ProxyError::TransportClosed("x".into()).is_retryable());
        assert!(!ProxyError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn upstream_carries_details() {
        let err = ProxyError::upstream_with_details("boom", json!({"code": -32000}));
        match err {
            ProxyError::UpstreamError { details, .. } => {
                assert_eq!(details.unwrap()["code"], -32000);
            }
            _ => panic!("wrong variant"),
        }
    }
}
