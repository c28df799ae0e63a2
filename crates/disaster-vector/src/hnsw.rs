//! HNSW index implementation using usearch.
//!
//! Parameters tuned for quality over speed:
//! - M = 16 (connections per layer)
//! - ef_construction = 200 (build-time quality)
//! - ef_search = 100 (search-time quality)
//!
//! Results are approximate. Callers needing an exact order should fetch
//! extra candidates and re-rank them.

use std::path::PathBuf;
use std::sync::RwLock;

use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::VectorError;
use crate::index::{check_vector, IndexStats, SearchResult, VectorIndex};

const INDEX_FILE: &str = "hnsw.usearch";

/// HNSW index configuration
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Embedding dimension (must match model)
    pub dimension: usize,
    /// Number of connections per layer (M parameter)
    pub connectivity: usize,
    /// Build-time search depth (ef_construction)
    pub expansion_add: usize,
    /// Query-time search depth (ef_search)
    pub expansion_search: usize,
    /// Directory holding the index file
    pub index_path: PathBuf,
    /// Initial capacity; grows by doubling
    pub capacity: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            connectivity: 16,
            expansion_add: 200,
            expansion_search: 100,
            index_path: PathBuf::from("./vector-index"),
            capacity: 10_000,
        }
    }
}

impl HnswConfig {
    pub fn new(dimension: usize, index_path: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            index_path: index_path.into(),
            ..Default::default()
        }
    }

    pub fn with_expansion(mut self, ef_add: usize, ef_search: usize) -> Self {
        self.expansion_add = ef_add;
        self.expansion_search = ef_search;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimension,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false,
        }
    }
}

fn new_index(config: &HnswConfig) -> Result<Index, VectorError> {
    let index = Index::new(&config.options()).map_err(|e| VectorError::Index(e.to_string()))?;
    index
        .reserve(config.capacity.max(1))
        .map_err(|e| VectorError::Index(e.to_string()))?;
    Ok(index)
}

/// HNSW index wrapper around usearch.
pub struct HnswIndex {
    index: RwLock<Index>,
    config: HnswConfig,
}

impl HnswIndex {
    /// Create a new HNSW index or open an existing one.
    ///
    /// A persisted index with a different dimension is an error; the
    /// owner is expected to clear and rebuild it.
    pub fn open_or_create(config: HnswConfig) -> Result<Self, VectorError> {
        let index_file = config.index_path.join(INDEX_FILE);

        let index = if index_file.exists() {
            info!(path = ?index_file, "Opening existing vector index");
            let idx = Index::new(&config.options()).map_err(|e| VectorError::Index(e.to_string()))?;
            idx.load(path_str(&index_file)?)
                .map_err(|e| VectorError::Index(format!("Failed to load: {}", e)))?;
            if idx.dimensions() != config.dimension {
                return Err(VectorError::DimensionMismatch {
                    expected: config.dimension,
                    actual: idx.dimensions(),
                });
            }
            idx
        } else {
            info!(path = ?index_file, dim = config.dimension, "Creating new vector index");
            std::fs::create_dir_all(&config.index_path)?;
            new_index(&config)?
        };

        Ok(Self {
            index: RwLock::new(index),
            config,
        })
    }

    pub fn index_file(&self) -> PathBuf {
        self.config.index_path.join(INDEX_FILE)
    }
}

fn path_str(path: &std::path::Path) -> Result<&str, VectorError> {
    path.to_str()
        .ok_or_else(|| VectorError::Index("Invalid path encoding".to_string()))
}

impl VectorIndex for HnswIndex {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn len(&self) -> usize {
        self.index.read().map(|i| i.size()).unwrap_or(0)
    }

    fn is_exact(&self) -> bool {
        false
    }

    #[allow(clippy::readonly_write_lock)] // usearch::Index uses interior mutability
    fn add(&mut self, id: u64, vector: &[f32]) -> Result<(), VectorError> {
        check_vector(id, vector, self.config.dimension)?;

        let index = self.index.write().map_err(|_| VectorError::Poisoned)?;
        if index.contains(id) {
            return Err(VectorError::DuplicateId(id));
        }
        if index.size() >= index.capacity() {
            let grown = (index.capacity() * 2).max(16);
            index
                .reserve(grown)
                .map_err(|e| VectorError::Index(e.to_string()))?;
            debug!(capacity = grown, "Grew vector index");
        }
        index
            .add(id, vector)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        debug!(id, "Added vector");
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorError> {
        if query.len() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: query.len(),
            });
        }

        let index = self.index.read().map_err(|_| VectorError::Poisoned)?;
        if k == 0 || index.size() == 0 {
            return Ok(Vec::new());
        }
        let results = index
            .search(query, k)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        // usearch reports cosine distance; similarity is its complement.
        let search_results: Vec<SearchResult> = results
            .keys
            .iter()
            .zip(results.distances.iter())
            .map(|(&id, &dist)| SearchResult::new(id, 1.0 - dist))
            .collect();

        debug!(k, found = search_results.len(), "HNSW search complete");
        Ok(search_results)
    }

    #[allow(clippy::readonly_write_lock)] // usearch::Index uses interior mutability
    fn remove(&mut self, id: u64) -> Result<bool, VectorError> {
        let index = self.index.write().map_err(|_| VectorError::Poisoned)?;
        let removed = index
            .remove(id)
            .map_err(|e| VectorError::Index(e.to_string()))?;
        Ok(removed > 0)
    }

    fn contains(&self, id: u64) -> bool {
        self.index.read().map(|i| i.contains(id)).unwrap_or(false)
    }

    fn stats(&self) -> IndexStats {
        let size_bytes = std::fs::metadata(self.index_file())
            .map(|m| m.len())
            .unwrap_or(0);

        match self.index.read() {
            Ok(index) => IndexStats {
                kind: "hnsw",
                vector_count: index.size(),
                dimension: self.config.dimension,
                size_bytes,
                available: true,
            },
            Err(_) => IndexStats {
                kind: "hnsw",
                dimension: self.config.dimension,
                size_bytes,
                ..Default::default()
            },
        }
    }

    fn save(&self) -> Result<(), VectorError> {
        let index = self.index.read().map_err(|_| VectorError::Poisoned)?;
        let path = self.index_file();
        index
            .save(path_str(&path)?)
            .map_err(|e| VectorError::Index(format!("Failed to save: {}", e)))?;

        info!(path = ?path, vectors = index.size(), "Saved vector index");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), VectorError> {
        let fresh = new_index(&self.config)?;
        *self.index.write().map_err(|_| VectorError::Poisoned)? = fresh;
        info!("Cleared vector index");
        Ok(())
    }
}
