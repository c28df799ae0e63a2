//! Request-level errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use disaster_embeddings::EmbeddingError;
use disaster_ingest::IngestError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Caller input rejected; never retried
    #[error("{0}")]
    Validation(String),

    /// Embedding, classifier or imagery capability failed
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A run with the same region and window is already in flight
    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::UpstreamUnavailable(_)
            | ServiceError::StoreUnavailable(_)
            | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<IngestError> for ServiceError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(msg) => ServiceError::Validation(msg),
            IngestError::Store(e) => ServiceError::StoreUnavailable(e.to_string()),
            IngestError::UpstreamUnavailable(msg) | IngestError::InvalidScene(msg) => {
                ServiceError::UpstreamUnavailable(msg)
            }
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

/// Text the model refuses is the caller's fault; anything else is an outage.
impl From<EmbeddingError> for ServiceError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::InvalidInput(msg) => ServiceError::Validation(msg),
            other => ServiceError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Internal(format!("task failed: {}", err))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServiceError::Validation("description is required".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::UpstreamUnavailable("model".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::StoreUnavailable("db".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::Conflict("busy".into()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_from_ingest_error() {
        let err: ServiceError = IngestError::Validation("bad bbox".into()).into();
        assert!(matches!(err, ServiceError::Validation(m) if m == "bad bbox"));

        let err: ServiceError = IngestError::UpstreamUnavailable("timeout".into()).into();
        assert!(matches!(err, ServiceError::UpstreamUnavailable(_)));
    }

    #[test]
    fn test_from_embedding_error() {
        let err: ServiceError = EmbeddingError::InvalidInput("text too long".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: ServiceError = EmbeddingError::Unavailable("model offline".into()).into();
        assert!(matches!(err, ServiceError::UpstreamUnavailable(_)));
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[test]
    fn test_validation_message_is_bare() {
        let err = ServiceError::Validation("description must not be empty".into());
        assert_eq!(err.to_string(), "description must not be empty");
    }
}
