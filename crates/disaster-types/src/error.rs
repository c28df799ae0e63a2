//! Error types for the disaster-watch domain model.

use thiserror::Error;

/// Unified error type for domain-level validation and configuration.
#[derive(Debug, Error)]
pub enum DisasterError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Geometry failed structural validation
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Event failed structural validation
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
