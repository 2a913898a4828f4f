//! HTTP error envelope
//!
//! AJAX/API failures render as `{"ok": false, "error": ...}` with a
//! mapped 4xx/5xx status. Server-side causes are logged before the
//! response is produced; client mistakes are not.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type HttpResult<T> = Result<T, HttpError>;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("{0}")]
    BadRequest(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("{0}")]
    Internal(String),
}

impl HttpError {
    fn status(&self) -> StatusCode {
        match self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::Unauthorized => StatusCode::UNAUTHORIZED,
            HttpError::Forbidden(_) => StatusCode::FORBIDDEN,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::Conflict(_) => StatusCode::CONFLICT,
            HttpError::Database(_)
            | HttpError::Io(_)
            | HttpError::Session(_)
            | HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<emulsion_common::Error> for HttpError {
    fn from(err: emulsion_common::Error) -> Self {
        use emulsion_common::Error;
        match err {
            Error::NotFound(msg) => HttpError::NotFound(msg),
            Error::InvalidInput(msg) => HttpError::BadRequest(msg),
            Error::Conflict(msg) => HttpError::Conflict(msg),
            Error::Database(e) => HttpError::Database(e),
            Error::Io(e) => HttpError::Io(e),
            Error::Config(msg) | Error::Internal(msg) => HttpError::Internal(msg),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }

        let body = Json(json!({
            "ok": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// True when the error is SQLite complaining about a missing table.
///
/// Optional-schema features (templates, custom fields) degrade to empty
/// results instead of failing the request when their table is absent.
pub fn is_missing_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("no such table"))
}

/// True when the error is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed"))
}
