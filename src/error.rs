use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Bad or out-of-range query parameters. Carries every violated rule,
    /// not just the first.
    #[error("validation error: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The session/event store failed or timed out. Surfaced to the caller
    /// as a generic internal error; the query context is logged at the
    /// point of failure.
    #[error("store error: {0}")]
    Store(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(#[from] deadpool_sqlite::InteractError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(vec![msg.into()])
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Validation(errors) => {
                let body = json!({ "error": "invalid parameters", "details": errors });
                (StatusCode::BAD_REQUEST, axum::Json(body)).into_response()
            }
            AppError::Store(msg) => {
                tracing::error!(error = %msg, "store error");
                internal_error()
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                internal_error()
            }
            AppError::Pool(e) => {
                tracing::error!(error = %e, "pool error");
                internal_error()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                internal_error()
            }
        }
    }
}

fn internal_error() -> Response {
    let body = json!({ "error": "internal server error" });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
}

pub type AppResult<T> = Result<T, AppError>;
