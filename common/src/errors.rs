//! Application error type.
//!
//! Every fallible operation in the services returns [`AppResult`]. Handlers
//! can return the error directly; [`IntoResponse`] turns it into the standard
//! error envelope with a 5xx status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across the services.
pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced by the services.
#[derive(Debug, Error)]
pub enum AppError {
    /// A counting backend could not be reached or answered with a non-2xx status.
    #[error("downstream unavailable: {0}")]
    DownstreamUnavailable(String),

    /// A counting backend answered with a body that is not a count record.
    #[error("malformed downstream response: {0}")]
    MalformedDownstreamResponse(String),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Could not open a connection to the backing store.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// A query against the backing store failed.
    #[error("database query error: {0}")]
    DatabaseQuery(String),

    /// A schema migration could not be applied.
    #[error("migration error: {0}")]
    Migration(String),

    /// JSON serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Machine readable error code placed in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::DownstreamUnavailable(_) => "DOWNSTREAM_UNAVAILABLE",
            AppError::MalformedDownstreamResponse(_) => "MALFORMED_DOWNSTREAM_RESPONSE",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::DatabaseConnection(_) => "DATABASE_CONNECTION_ERROR",
            AppError::DatabaseQuery(_) => "DATABASE_QUERY_ERROR",
            AppError::Migration(_) => "MIGRATION_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::DownstreamUnavailable(_) | AppError::MalformedDownstreamResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::error!(code = self.code(), error = %self, "request failed");
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}
