use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use convo_shared::protocol::ServerEvent;
use convo_shared::ProtocolError;
use convo_store::StoreError;
use thiserror::Error;

use crate::attachments::StorageError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Missing or invalid caller identity")]
    Unauthenticated,

    #[error("Attachment too large: {size} bytes (max {max})")]
    AttachmentTooLarge { size: usize, max: usize },

    #[error("Unsupported attachment type: {0}")]
    UnsupportedMediaType(String),

    #[error("Attachment upload failed: {0}")]
    Upstream(#[from] StorageError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServerError::NotFound("Record not found".to_string()),
            other => ServerError::Store(other),
        }
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::BadRequest(_) | ServerError::Protocol(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServerError::AttachmentTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::AuthorizationDenied(_) => "authorization_denied",
            ServerError::NotFound(_) => "not_found",
            ServerError::BadRequest(_) => "bad_request",
            ServerError::Unauthenticated => "unauthenticated",
            ServerError::AttachmentTooLarge { .. } => "attachment_too_large",
            ServerError::UnsupportedMediaType(_) => "unsupported_media_type",
            ServerError::Upstream(_) => "upstream_failure",
            ServerError::Protocol(err) => err.code(),
            ServerError::Store(_) => "store_failure",
        }
    }

    /// Message safe to show to clients. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            ServerError::Store(_) => "Storage error".to_string(),
            ServerError::Upstream(_) => "Attachment upload failed".to_string(),
            other => other.to_string(),
        }
    }

    /// Real-time counterpart of [`IntoResponse`]: the acknowledgement sent
    /// back over the originator's connection.
    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::error(self.code(), self.public_message())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        let body = serde_json::json!({
            "error": self.public_message(),
            "code": self.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}
