//! JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::AppError;

/// An [`AppError`] bound to the requesting user, rendered as
/// `{"error", "userId", "timestamp", "details"?}`.
#[derive(Debug)]
pub struct ApiError {
    /// Underlying failure.
    pub error: AppError,
    /// `userId` from the request body, when one was given.
    pub user_id: Option<String>,
}

impl ApiError {
    /// Attach `user_id` to `error`.
    #[must_use]
    pub fn new(error: AppError, user_id: Option<String>) -> Self {
        Self { error, user_id }
    }

    /// HTTP status for the wrapped error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        status_for(&self.error)
    }

    /// Response body for the wrapped error.
    #[must_use]
    pub fn body(&self) -> Value {
        let mut body = json!({
            "error": public_message(&self.error),
            "userId": self.user_id,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let AppError::Protocol(payload) = &self.error {
            body["details"] = payload.clone();
        }
        body
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self::new(error, None)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Map an error category to its HTTP status.
#[must_use]
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Credential { .. } | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AppError::Protocol(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn public_message(error: &AppError) -> String {
    match error {
        AppError::BadRequest(msg) | AppError::NotFound(msg) => msg.clone(),
        other => other.to_string(),
    }
}
