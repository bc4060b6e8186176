// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! The taxonomy matters for the consent protocol: callers decide
//! fatal-vs-ignorable once, based on whose document a write targeted,
//! never by inspecting error message text.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Store unreachable: {0}")]
    Offline(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Profile was deleted but the identity account was not. The account
    /// is orphaned until the caller retries deletion.
    #[error("Account deletion incomplete: {0}")]
    DeletionIncomplete(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether this error may be swallowed when it occurred on a mirrored
    /// write to *another* user's document. Errors on the acting user's own
    /// document are never ignorable.
    pub fn ignorable_on_mirror(&self) -> bool {
        matches!(
            self,
            AppError::PermissionDenied(_)
                | AppError::Offline(_)
                | AppError::Timeout(_)
                | AppError::NotFound(_)
        )
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::PermissionDenied(msg) => {
                (StatusCode::FORBIDDEN, "permission_denied", Some(msg.clone()))
            }
            AppError::Offline(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "offline", Some(msg.clone()))
            }
            AppError::Timeout(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "timeout", Some(msg.clone()))
            }
            AppError::Precondition(msg) => {
                (StatusCode::BAD_REQUEST, "precondition_failed", Some(msg.clone()))
            }
            AppError::DeletionIncomplete(msg) => {
                tracing::error!(error = %msg, "Account deletion incomplete");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "deletion_incomplete",
                    Some(msg.clone()),
                )
            }
            AppError::Store(msg) => {
                tracing::error!(error = %msg, "Store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_swallow_covers_foreign_doc_failures() {
        assert!(AppError::PermissionDenied("x".into()).ignorable_on_mirror());
        assert!(AppError::Offline("x".into()).ignorable_on_mirror());
        assert!(AppError::Timeout("x".into()).ignorable_on_mirror());
        assert!(AppError::NotFound("x".into()).ignorable_on_mirror());
    }

    #[test]
    fn own_doc_failures_are_never_ignorable() {
        assert!(!AppError::Store("x".into()).ignorable_on_mirror());
        assert!(!AppError::Precondition("x".into()).ignorable_on_mirror());
        assert!(!AppError::Unauthorized.ignorable_on_mirror());
        assert!(!AppError::Internal(anyhow::anyhow!("x")).ignorable_on_mirror());
    }
}
