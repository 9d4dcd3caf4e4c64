//! Unified API error type with Axum `IntoResponse` support.
//!
//! The persistence layer raises `sqlx::Error`; the component layer (routes)
//! maps those and domain failures into `ApiError`; the HTTP layer maps
//! `ApiError` to a status code and a `{"error":{"kind","message"}}` body.
//! No stack traces cross this boundary (spec §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error kinds surfaced to clients, per spec §7.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("bad state: {0}")]
    BadState(String),

    #[error("plan mismatch: {0}")]
    PlanMismatch(String),

    #[error("stale: {0}")]
    Stale(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::UnknownDevice(_) => "UNKNOWN_DEVICE",
            ApiError::UnknownCommand(_) => "UNKNOWN_COMMAND",
            ApiError::BadState(_) => "BAD_STATE",
            ApiError::PlanMismatch(_) => "PLAN_MISMATCH",
            ApiError::Stale(_) => "STALE",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Unavailable(_) => "UNAVAILABLE",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownDevice(_) | ApiError::UnknownCommand(_) => StatusCode::NOT_FOUND,
            ApiError::BadState(_) | ApiError::PlanMismatch(_) | ApiError::Stale(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Database errors are never shown to the client verbatim; they collapse
/// to `UNAVAILABLE` while the detail is logged server-side.
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "database error");
        ApiError::Unavailable("database unavailable".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(kind, message = %message, "request failed");
        }

        let body = json!({
            "error": { "kind": kind, "message": message }
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience alias.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn unknown_device_response() {
        let err = ApiError::UnknownDevice("TR4-999".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["kind"], "UNKNOWN_DEVICE");
        assert!(json["error"]["message"].as_str().unwrap().contains("TR4-999"));
    }

    #[tokio::test]
    async fn conflict_response() {
        let err = ApiError::Conflict("command already in flight".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn plan_mismatch_is_bad_request() {
        let err = ApiError::PlanMismatch("hash differs".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "PLAN_MISMATCH");
    }

    #[tokio::test]
    async fn unavailable_is_service_unavailable() {
        let err = ApiError::Unavailable("pool exhausted".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
