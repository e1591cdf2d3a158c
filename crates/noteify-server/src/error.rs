use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use noteify_client::ClientError;
use noteify_shared::BackendError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ClientError> for ServerError {
    fn from(err: ClientError) -> Self {
        if err.is_not_found() {
            return ServerError::NotFound(err.user_message());
        }
        match err {
            ClientError::Validation(e) => ServerError::BadRequest(e.to_string()),
            ClientError::NotAuthenticated | ClientError::Backend(BackendError::NotAuthenticated) => {
                ServerError::Unauthorized
            }
            ClientError::Backend(BackendError::InvalidQuery(message))
            | ClientError::Backend(BackendError::Storage(message)) => ServerError::BadRequest(message),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
