use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use thiserror::Error;
use tracing::error;

use crate::models::Envelope;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Validation(msg) | AppError::Conflict(msg) => msg,
            AppError::NotFound(what) => format!("{} not found", what),
            AppError::Unauthorized => "Authentication required".to_string(),
            AppError::Forbidden => "Not allowed to modify this enrollment".to_string(),
            AppError::Database(e) => {
                error!("database error: {}", e);
                "Database error occurred".to_string()
            }
        };

        (status, Json(Envelope::<()>::err(message))).into_response()
    }
}

/// Unique-constraint violations surface as 409 instead of a 500.
pub fn conflict_on_unique(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(err),
    }
}
