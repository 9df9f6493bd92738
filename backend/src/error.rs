//! Error type shared by the store, the collaborators and the HTTP handlers.
//!
//! Every variant maps to one HTTP status; the body is always `{ "error": "..." }`.

use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::{error, warn};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request parameters and field-level invariant violations.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// OCR endpoint or blob storage failure.
    #[error("external service error: {0}")]
    External(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Blocking(#[from] BlockingError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::External(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_)
            | ApiError::Io(_)
            | ApiError::Json(_)
            | ApiError::Blocking(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("request failed: {}", self);
        } else {
            warn!("request rejected ({}): {}", status.as_u16(), self);
        }
        HttpResponse::build(status).json(json!({ "error": self.to_string() }))
    }
}
