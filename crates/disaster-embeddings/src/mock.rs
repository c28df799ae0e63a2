//! Mock embedder for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::EmbeddingError;
use crate::model::{ensure_text, Embedding, EmbeddingModel, ModelInfo};

/// Mock embedder that returns canned vectors.
///
/// Texts registered with [`MockEmbedder::with_vector`] map to their vector
/// verbatim (no normalization). Anything else gets a one-hot vector picked
/// by text length. Calls are counted so tests can assert the model was or
/// was not consulted.
pub struct MockEmbedder {
    info: ModelInfo,
    vectors: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MockEmbedder {
    /// Create a new mock embedder with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: "mock".to_string(),
                dimension,
                max_sequence_length: 512,
            },
            vectors: HashMap::new(),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Register a canned vector for `text`.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    /// Make subsequent calls fail with [`EmbeddingError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `embed` calls so far, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingModel for MockEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Unavailable("mock embedder offline".into()));
        }
        ensure_text(text)?;

        if let Some(v) = self.vectors.get(text) {
            return Ok(Embedding::from_normalized(v.clone()));
        }
        let mut values = vec![0.0; self.info.dimension];
        if let Some(slot) = values.get_mut(text.len() % self.info.dimension.max(1)) {
            *slot = 1.0;
        }
        Ok(Embedding::from_normalized(values))
    }
}
