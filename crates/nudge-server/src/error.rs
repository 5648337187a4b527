//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nudge_core::CoreError;
use serde::Serialize;
use thiserror::Error;

/// Request rejected at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or empty session id.
    #[error("sessionId is required")]
    InvalidSessionId,
    /// Unusable push body.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSessionId | Self::InvalidMessage(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSessionId => "INVALID_SESSION_ID",
            Self::InvalidMessage(_) => "INVALID_MESSAGE",
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::EmptySessionId => Self::InvalidSessionId,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
