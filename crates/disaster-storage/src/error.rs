//! Storage layer error types.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Column family not found
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Key encoding/decoding error
    #[error("Key error: {0}")]
    Key(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Event not found
    #[error("Event not found: {0}")]
    NotFound(String),

    /// Event rejected by validation
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Query or embedding has the wrong dimensionality
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Query vector contains NaN or infinite components
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Stored schema disagrees with the configured one
    #[error("Schema mismatch: store holds {stored}-dim embeddings, configured for {configured}")]
    SchemaMismatch { stored: usize, configured: usize },

    /// Vector index failure
    #[error("Vector index error: {0}")]
    Index(#[from] disaster_vector::VectorError),

    /// A lock guarding shared state was poisoned
    #[error("Store lock poisoned")]
    Poisoned,
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
