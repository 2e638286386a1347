//! Error taxonomy shared by the API server and the CLI client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Application errors surfaced to callers as structured responses.
///
/// Every variant except `Internal` is a terminal per-request outcome; none
/// of them are retried.
#[derive(Debug, Error)]
pub enum AppError {
    /// Referenced post or user does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Authenticated, but not the owner of the resource.
    #[error("{0}")]
    Forbidden(String),

    /// Missing or invalid credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Duplicate username or email at registration.
    #[error("{0}")]
    Conflict(String),

    /// Malformed input fields.
    #[error("{0}")]
    Validation(String),

    /// Storage or serialization failure; details stay server-side.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable kind used in response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Conflict(_) => "conflict",
            AppError::Validation(_) => "validation",
            AppError::Internal(_) => "internal",
        }
    }

    /// Rebuild an error from a decoded `{error, message}` response body.
    pub fn from_kind(kind: &str, message: String) -> Self {
        match kind {
            "not_found" => AppError::NotFound(message),
            "forbidden" => AppError::Forbidden(message),
            "unauthorized" => AppError::Unauthorized(message),
            "conflict" => AppError::Conflict(message),
            "validation" => AppError::Validation(message),
            _ => AppError::Internal(anyhow::anyhow!(message)),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
