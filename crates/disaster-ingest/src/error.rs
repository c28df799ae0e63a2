//! Error types for ingestion.

use disaster_raster::RasterError;
use disaster_storage::StorageError;
use thiserror::Error;

/// Errors that abort an ingestion run or a detection request.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Caller-supplied input was rejected
    #[error("Validation error: {0}")]
    Validation(String),

    /// Imagery provider, classifier or embedder could not be reached
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Imagery provider answered with an unusable scene
    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    #[error("Store error: {0}")]
    Store(#[from] StorageError),

    /// Blocking task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::Task(err.to_string())
    }
}

/// Why a single region could not become an event.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("region geometry is empty")]
    EmptyGeometry,

    #[error("region geometry is invalid: {0}")]
    InvalidGeometry(String),

    #[error("event rejected: {0}")]
    InvalidEvent(String),
}
