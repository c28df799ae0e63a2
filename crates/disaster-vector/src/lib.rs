//! # disaster-vector
//!
//! Nearest-neighbour indexes over event embeddings.
//!
//! - [`FlatIndex`]: exact brute-force cosine ranking, in memory
//! - [`HnswIndex`]: approximate HNSW graph via usearch, persisted to disk
//!
//! Both implement [`VectorIndex`], keyed by caller-assigned `u64` ids.

pub mod error;
pub mod flat;
pub mod hnsw;
pub mod index;

use std::path::Path;

use disaster_types::VectorBackend;

pub use error::VectorError;
pub use flat::FlatIndex;
pub use hnsw::{HnswConfig, HnswIndex};
pub use index::{IndexStats, SearchResult, VectorIndex};

/// Open the configured index implementation.
///
/// The HNSW backend reads or creates its file under `index_path`; the
/// flat backend starts empty.
pub fn open_index(
    backend: VectorBackend,
    dimension: usize,
    index_path: &Path,
) -> Result<Box<dyn VectorIndex>, VectorError> {
    Ok(match backend {
        VectorBackend::Flat => Box::new(FlatIndex::new(dimension)),
        VectorBackend::Hnsw => Box::new(HnswIndex::open_or_create(HnswConfig::new(
            dimension, index_path,
        ))?),
    })
}
