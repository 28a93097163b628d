//! Error types for the Pontos server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Application error type.
///
/// The variants follow the reconciliation error taxonomy: validation
/// failures reject before any mutation, state conflicts surface illegal
/// transitions, signature rejections are audited upstream, and gateway
/// errors are integration failures distinct from our own faults.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Signature rejected: {0}")]
    SignatureRejected(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::StateConflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            AppError::SignatureRejected(msg) => (StatusCode::UNAUTHORIZED, msg).into_response(),
            AppError::Gateway(msg) => {
                tracing::error!("Payment gateway error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Payment gateway unavailable").into_response()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
