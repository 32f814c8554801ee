pub mod health;
pub mod images;
pub mod jobs;
pub mod metrics;
pub mod ocr;
pub mod upload;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::services::inference::InferenceError;
use crate::services::storage::StorageError;

/// Header set by the upstream authorizer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Error returned by every API handler; rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Inference invocation failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("{0}")]
    Internal(String),
}

impl RouteError {
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RouteError::NotFound(_) => StatusCode::NOT_FOUND,
            RouteError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RouteError::Storage(_) | RouteError::Inference(_) | RouteError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// A single key segment supplied by the caller (user or job id).
fn check_segment(name: &str, value: &str) -> Result<(), RouteError> {
    let ok = !value.is_empty()
        && value.len() <= 128
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\']);
    if ok {
        Ok(())
    } else {
        Err(RouteError::BadRequest(format!("Invalid {name}")))
    }
}

/// The caller's user id, from `x-user-id` or the configured default.
pub fn user_id(headers: &HeaderMap, default_user: &str) -> Result<String, RouteError> {
    let user = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default_user);
    check_segment("user id", user)?;
    Ok(user.to_string())
}

pub fn job_id(value: &str) -> Result<&str, RouteError> {
    check_segment("job id", value)?;
    Ok(value)
}
