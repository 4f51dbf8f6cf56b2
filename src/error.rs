use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Crate-wide error type. Nothing inside the decision engine surfaces
/// `AppError` upward past a single tick - handlers and the monitor loop
/// log and continue. `AppError` is
/// used at the edges: configuration loading and the HTTP layer, where a
/// typed error is actually observed by a caller.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("probe error: {0}")]
    Probe(String),

    #[error("local action error: {0}")]
    LocalAction(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection string parse error: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<crate::connstring::ConnStringError> for AppError {
    fn from(err: crate::connstring::ConnStringError) -> Self {
        AppError::Parse(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Parse(_) | AppError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}
