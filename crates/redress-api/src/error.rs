use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use redress_policy::lifecycle::TransitionError;

/// The full error taxonomy. Every variant maps to a stable code and an HTTP
/// status; storage errors collapse into `Internal` and never leak detail.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(&'static str),

    /// Also covers forbidden-by-obscurity: a complaint the actor may not
    /// see reports the same way as one that does not exist.
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("complaint is closed")]
    TerminalState,

    #[error("complaint was modified concurrently; re-fetch and retry")]
    Conflict,

    #[error("{0}")]
    InvalidNotification(String),

    /// Sink failure. Logged by the dispatcher and swallowed; never fails
    /// the triggering action.
    #[error("notification delivery failed")]
    DeliveryFailed,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound => "not_found",
            ApiError::Validation(_) => "validation_failed",
            ApiError::InvalidTransition(_) => "invalid_transition",
            ApiError::TerminalState => "terminal_state",
            ApiError::Conflict => "conflict",
            ApiError::InvalidNotification(_) => "invalid_notification",
            ApiError::DeliveryFailed => "delivery_failed",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) | ApiError::InvalidNotification(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::InvalidTransition(_) | ApiError::TerminalState | ApiError::Conflict => {
                StatusCode::CONFLICT
            }
            ApiError::DeliveryFailed => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TransitionError> for ApiError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::InvalidTransition { .. } => ApiError::InvalidTransition(e.to_string()),
            TransitionError::TerminalState => ApiError::TerminalState,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match &self {
            ApiError::Internal(e) => {
                error!("internal error: {:#}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(json!({ "error": { "code": code, "message": message } })),
        )
            .into_response()
    }
}
