//! HTTP-facing error type.
//!
//! Every handler error renders as `{"error": "<message>"}` with a status
//! derived from the variant.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tbibi_store::StoreError;
use thiserror::Error;
use tracing::error;

/// Errors returned by REST and WebSocket-upgrade handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing request input.
    #[error("{0}")]
    BadRequest(String),

    /// Requested resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Chat store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Unexpected server-side failure.
    #[error("{0}")]
    Internal(String),

    /// The connection could not be upgraded to a WebSocket.
    #[error("WebSocket upgrade failed: {0}")]
    UpgradeFailed(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Store(StoreError::InvalidOperation(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) | Self::Store(StoreError::ChatNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Internal(_) | Self::UpgradeFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Store(StoreError::Sqlite(_) | StoreError::Pool(_) | StoreError::Migration { .. }) => {
                "storage unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = serde_json::json!({ "error": self.public_message() });
        (status, Json(body)).into_response()
    }
}

/// Result alias for handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
