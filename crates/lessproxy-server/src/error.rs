//! API error types.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lessproxy_core::CoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The controller rejected or failed the request.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Core(err) => match err {
                CoreError::InvalidMode(_) => (StatusCode::BAD_REQUEST, "invalid_mode"),
                CoreError::InvalidSettings(_) => (StatusCode::BAD_REQUEST, "invalid_settings"),
                CoreError::Fetch(_) => (StatusCode::BAD_GATEWAY, "fetch_failed"),
                CoreError::Status(_) => (StatusCode::BAD_GATEWAY, "status_failed"),
                CoreError::ControllerClosed => {
                    (StatusCode::SERVICE_UNAVAILABLE, "controller_stopped")
                }
                CoreError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
                CoreError::Backend(_) => (StatusCode::INTERNAL_SERVER_ERROR, "backend_error"),
                CoreError::UnexpectedReply(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
