// HTTP-facing errors and their status mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::checkout::success::SuccessError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("checkout session not found")]
    SessionNotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::SessionNotFound | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<SuccessError> for ApiError {
    fn from(e: SuccessError) -> Self {
        match &e {
            SuccessError::MissingReference => ApiError::BadRequest(e.to_string()),
            SuccessError::Load { source, .. } if source.is_session_expired() => {
                ApiError::Unauthorized(e.to_string())
            }
            SuccessError::Load { source, .. } if source.is_not_found() => ApiError::NotFound(e.to_string()),
            SuccessError::Load { .. } => ApiError::Upstream(e.to_string()),
        }
    }
}
