//! Embedding model trait and types.
//!
//! Defines the interface for turning event descriptions and free-text
//! queries into fixed-length vectors.

use crate::error::EmbeddingError;

/// Vector embedding - a normalized float array.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The embedding vector (normalized to unit length)
    pub values: Vec<f32>,
}

impl Embedding {
    /// Create a new embedding from a vector.
    /// Normalizes the vector to unit length.
    pub fn new(values: Vec<f32>) -> Self {
        let norm = l2_norm(&values);
        let normalized = if norm > 0.0 {
            values.iter().map(|x| x / norm).collect()
        } else {
            values
        };
        Self { values: normalized }
    }

    /// Create embedding without normalization (for pre-normalized vectors)
    pub fn from_normalized(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Get the embedding dimension
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity with another embedding, in [-1, 1].
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        cosine_similarity(&self.values, &other.values)
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.values
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity between two raw vectors.
///
/// Vectors need not be normalized. Mismatched lengths or a zero-norm
/// operand yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let denom = l2_norm(a) * l2_norm(b);
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

/// Model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub name: String,
    /// Embedding dimension
    pub dimension: usize,
    /// Maximum sequence length in tokens
    pub max_sequence_length: usize,
}

/// Trait for embedding models.
///
/// Implementations must be deterministic for a given input and
/// thread-safe (Send + Sync). Blank text is rejected with
/// [`EmbeddingError::InvalidInput`].
pub trait EmbeddingModel: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Output dimensionality
    fn dimension(&self) -> usize {
        self.info().dimension
    }

    /// Generate embedding for a single text.
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Generate embeddings for multiple texts (batch).
    /// Default implementation calls embed() for each text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Generate embeddings for multiple owned strings.
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        self.embed_batch(&refs)
    }
}

/// Reject blank input before it reaches a model.
pub(crate) fn ensure_text(text: &str) -> Result<(), EmbeddingError> {
    if text.trim().is_empty() {
        return Err(EmbeddingError::InvalidInput("text is empty".to_string()));
    }
    Ok(())
}
