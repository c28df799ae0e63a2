//! Flat (brute-force) index.
//!
//! Scores the query against every stored vector. Exact, O(n) per search,
//! and the ranking is fully determined: equal scores keep insertion order.
//! Nothing is persisted; owners rebuild it from their own storage.

use std::collections::HashSet;

use disaster_embeddings::cosine_similarity;
use tracing::debug;

use crate::error::VectorError;
use crate::index::{check_vector, IndexStats, SearchResult, VectorIndex};

/// Exact cosine index over vectors held in insertion order.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    entries: Vec<(u64, Vec<f32>)>,
    ids: HashSet<u64>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
            ids: HashSet::new(),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_exact(&self) -> bool {
        true
    }

    fn add(&mut self, id: u64, vector: &[f32]) -> Result<(), VectorError> {
        check_vector(id, vector, self.dimension)?;
        if !self.ids.insert(id) {
            return Err(VectorError::DuplicateId(id));
        }
        self.entries.push((id, vector.to_vec()));
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorError> {
        if query.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<SearchResult> = self
            .entries
            .iter()
            .map(|(id, v)| SearchResult::new(*id, cosine_similarity(query, v)))
            .collect();
        // sort_by is stable: ties stay in insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);

        debug!(k, found = scored.len(), "Flat search complete");
        Ok(scored)
    }

    fn remove(&mut self, id: u64) -> Result<bool, VectorError> {
        if !self.ids.remove(&id) {
            return Ok(false);
        }
        self.entries.retain(|(eid, _)| *eid != id);
        Ok(true)
    }

    fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            kind: "flat",
            vector_count: self.entries.len(),
            dimension: self.dimension,
            size_bytes: 0,
            available: true,
        }
    }

    fn save(&self) -> Result<(), VectorError> {
        Ok(())
    }

    fn clear(&mut self) -> Result<(), VectorError> {
        self.entries.clear();
        self.ids.clear();
        Ok(())
    }
}
