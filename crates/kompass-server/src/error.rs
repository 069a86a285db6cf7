use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use kompass_core::error::QueryError;

/// Application-level errors that map directly to HTTP responses.
///
/// Every variant implements [`IntoResponse`] so Axum handlers can use
/// `Result<impl IntoResponse, AppError>` as their return type. The query
/// taxonomy from `kompass-core` converts via `From`, so handlers can `?`
/// straight through the database layer.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("batch too large: {0} events (max 50)")]
    BatchTooLarge(usize),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            AppError::BatchTooLarge(_) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "batch_too_large",
                "Batch exceeds maximum of 50 events".to_string(),
            ),
            AppError::Query(e) => match e {
                // A table outside the allow-list reads the same as a missing one.
                QueryError::TableNotAllowed(_) => {
                    (StatusCode::NOT_FOUND, e.code(), e.to_string())
                }
                _ if e.is_caller_error() => (StatusCode::BAD_REQUEST, e.code(), e.to_string()),
                _ => {
                    tracing::error!("Storage error: {e}");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        e.code(),
                        "Storage unavailable".to_string(),
                    )
                }
            },
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(json!({
                "error": {
                    "code": code,
                    "message": message,
                    "field": null
                }
            })),
        )
            .into_response()
    }
}
