//! Error types for the chat stream service.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::reply::ReplyError;

/// Service error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A message was appended to a session that was never created.
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// The reply generator could not produce a reply.
    #[error("Reply generation failed: {0}")]
    Reply(#[from] ReplyError),

    /// Request parameters were present but unusable.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status used when this error reaches a handler boundary.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Reply(_) => StatusCode::BAD_GATEWAY,
            Self::UnknownSession(_) | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = %status, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
