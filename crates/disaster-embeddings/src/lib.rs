//! # disaster-embeddings
//!
//! Text embedding for disaster events and similarity queries.
//!
//! The embedder is an opaque capability: deterministic text in, fixed-length
//! vector out. Two providers ship:
//! - [`HashEmbedder`]: FNV-1a feature hashing, offline, any dimension
//! - [`CandleEmbedder`]: all-MiniLM-L6-v2 via Candle (384 dimensions),
//!   model files cached from HuggingFace Hub on first use
//!
//! [`MockEmbedder`] returns canned vectors for tests.

pub mod cache;
pub mod candle;
pub mod error;
pub mod hash;
pub mod mock;
pub mod model;
pub mod provider;

pub use crate::candle::CandleEmbedder;
pub use cache::{ModelDir, ModelFile, ModelPaths, MODEL_REPO};
pub use error::EmbeddingError;
pub use hash::HashEmbedder;
pub use mock::MockEmbedder;
pub use model::{cosine_similarity, Embedding, EmbeddingModel, ModelInfo};
pub use provider::build_embedder;
