//! Vector index trait and types.
//!
//! Ids are caller-assigned `u64` keys; the event store uses the insertion
//! sequence so that ties can be broken by insertion order.

use crate::error::VectorError;

/// Result of a vector search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Caller-assigned vector ID
    pub vector_id: u64,
    /// Cosine similarity (higher = more similar)
    pub score: f32,
}

impl SearchResult {
    pub fn new(vector_id: u64, score: f32) -> Self {
        Self { vector_id, score }
    }
}

/// Index statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexStats {
    /// Implementation name ("flat" or "hnsw")
    pub kind: &'static str,
    /// Number of vectors in the index
    pub vector_count: usize,
    /// Embedding dimension
    pub dimension: usize,
    /// Index file size in bytes (0 for in-memory indexes)
    pub size_bytes: u64,
    /// Whether index is available for search
    pub available: bool,
}

/// Trait for vector indexes.
///
/// Implementations must be thread-safe for concurrent read access.
/// Vectors need not be normalized; scores are cosine similarities.
pub trait VectorIndex: Send + Sync {
    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the number of vectors in the index
    fn len(&self) -> usize;

    /// Check if the index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether results come back in exact cosine order.
    fn is_exact(&self) -> bool;

    /// Add a vector with the given ID.
    /// Returns error if ID already exists.
    fn add(&mut self, id: u64, vector: &[f32]) -> Result<(), VectorError>;

    /// Add multiple vectors in batch.
    fn add_batch(&mut self, vectors: &[(u64, Vec<f32>)]) -> Result<(), VectorError> {
        for (id, v) in vectors {
            self.add(*id, v)?;
        }
        Ok(())
    }

    /// Search for k nearest neighbors.
    /// Returns results sorted by similarity (best first).
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorError>;

    /// Remove a vector by ID.
    fn remove(&mut self, id: u64) -> Result<bool, VectorError>;

    /// Check if a vector ID exists
    fn contains(&self, id: u64) -> bool;

    /// Get index statistics
    fn stats(&self) -> IndexStats;

    /// Save index to disk
    fn save(&self) -> Result<(), VectorError>;

    /// Clear all vectors from the index
    fn clear(&mut self) -> Result<(), VectorError>;
}

/// Shared input checks for `add`.
pub(crate) fn check_vector(id: u64, vector: &[f32], dimension: usize) -> Result<(), VectorError> {
    if vector.len() != dimension {
        return Err(VectorError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(VectorError::NonFinite(id));
    }
    Ok(())
}
