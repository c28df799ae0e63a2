//! Vector index error types.

use thiserror::Error;

/// Errors that can occur during vector operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// usearch index error
    #[error("Index error: {0}")]
    Index(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector id already present
    #[error("Duplicate vector id: {0}")]
    DuplicateId(u64),

    /// Vector contains NaN or infinity
    #[error("Vector {0} has non-finite components")]
    NonFinite(u64),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock guarding the index was poisoned by a panicking writer
    #[error("Index lock poisoned")]
    Poisoned,
}
