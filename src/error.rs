//! Error types for the synchronization layer.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::directory::DirectoryError;
use crate::persistence::StoreError;

/// Errors returned by session operations.
///
/// Not-found cases are kept apart from store failures because callers react
/// differently: the former is the client's problem, the latter may be worth
/// retrying.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No session with this id.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// No user with this id.
    #[error("Unknown user: {0}")]
    UserNotFound(String),

    /// The inbound message was rejected.
    #[error("Invalid message: {0}")]
    Validation(String),

    /// Persistence failed or timed out.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound(_) | Self::UserNotFound(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) | Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Store(StoreError::Timeout(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DirectoryError> for SyncError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(id) => Self::UserNotFound(id),
            DirectoryError::Store(e) => Self::Store(e),
        }
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(name: "api.error", error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SyncError>;
