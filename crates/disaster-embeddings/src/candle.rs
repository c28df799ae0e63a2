//! Candle-based embedding implementation.
//!
//! Uses all-MiniLM-L6-v2 for 384-dimensional sentence embeddings of
//! event descriptions and search queries.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{Encoding, Tokenizer};
use tracing::{debug, info};

use disaster_types::EmbeddingSettings;

use crate::cache::ModelDir;
use crate::error::EmbeddingError;
use crate::model::{ensure_text, Embedding, EmbeddingModel, ModelInfo};

/// Embedding dimension for all-MiniLM-L6-v2
pub const EMBEDDING_DIM: usize = 384;

/// Maximum sequence length
pub const MAX_SEQ_LENGTH: usize = 256;

/// Sentence embedder backed by a BERT encoder with mean pooling.
pub struct CandleEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    info: ModelInfo,
}

impl CandleEmbedder {
    /// Load the encoder from `dir`, fetching any missing files first.
    pub fn load(dir: &ModelDir) -> Result<Self, EmbeddingError> {
        let paths = dir.ensure(EMBEDDING_DIM)?;
        Self::load_from_paths(&paths.config, &paths.tokenizer, &paths.weights)
    }

    pub fn load_default() -> Result<Self, EmbeddingError> {
        Self::load(&ModelDir::from_settings(&EmbeddingSettings::default()))
    }

    pub fn load_from_paths(
        config_path: &Path,
        tokenizer_path: &Path,
        weights_path: &Path,
    ) -> Result<Self, EmbeddingError> {
        let device = Device::Cpu;

        let config_str = std::fs::read_to_string(config_path)?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .map_err(|e| EmbeddingError::ModelNotFound(format!("Invalid config: {}", e)))?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        // SAFETY: the weights file is opened read-only and not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.to_path_buf()], DType::F32, &device)?
        };
        let model = BertModel::load(vb, &config)?;

        info!(dim = EMBEDDING_DIM, max_seq = MAX_SEQ_LENGTH, "Embedding model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            info: ModelInfo {
                name: "all-MiniLM-L6-v2".to_string(),
                dimension: EMBEDDING_DIM,
                max_sequence_length: MAX_SEQ_LENGTH,
            },
        })
    }

    /// Pad or truncate encodings into `(input_ids, attention_mask)` tensors.
    fn batch_tensors(&self, encodings: &[Encoding]) -> Result<(Tensor, Tensor), EmbeddingError> {
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(MAX_SEQ_LENGTH);

        let mut ids = Vec::with_capacity(encodings.len() * max_len);
        let mut mask = Vec::with_capacity(encodings.len() * max_len);
        for encoding in encodings {
            let len = encoding.get_ids().len().min(max_len);
            ids.extend_from_slice(&encoding.get_ids()[..len]);
            mask.extend_from_slice(&encoding.get_attention_mask()[..len]);
            ids.resize(ids.len() + (max_len - len), 0);
            mask.resize(mask.len() + (max_len - len), 0);
        }

        let shape = (encodings.len(), max_len);
        Ok((
            Tensor::from_vec(ids, shape, &self.device)?,
            Tensor::from_vec(mask, shape, &self.device)?,
        ))
    }
}

/// Average token vectors, ignoring padding positions.
fn mean_pooling(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor, EmbeddingError> {
    let mask = attention_mask
        .unsqueeze(2)?
        .broadcast_as(hidden.shape())?
        .to_dtype(DType::F32)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    Ok(summed.broadcast_div(&counts)?)
}

impl EmbeddingModel for CandleEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Unavailable("model returned no embedding".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        for text in texts {
            ensure_text(text)?;
        }

        debug!(count = texts.len(), "Embedding batch");

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        let (input_ids, attention_mask) = self.batch_tensors(&encodings)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled: Vec<Vec<f32>> = mean_pooling(&hidden, &attention_mask)?.to_vec2()?;

        Ok(pooled.into_iter().map(Embedding::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Run with: cargo test -p disaster-embeddings -- --ignored

    #[test]
    #[ignore = "requires model download"]
    fn test_load_model() {
        let embedder = CandleEmbedder::load_default().unwrap();
        assert_eq!(embedder.info().dimension, EMBEDDING_DIM);
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_embed_batch() {
        let embedder = CandleEmbedder::load_default().unwrap();
        let texts = vec!["flooded paddy fields", "forest fire", "landslide on highway"];
        let embeddings = embedder.embed_batch(&texts).unwrap();
        assert_eq!(embeddings.len(), 3);
        for emb in &embeddings {
            assert_eq!(emb.dimension(), EMBEDDING_DIM);
        }
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_rejects_blank_text() {
        let embedder = CandleEmbedder::load_default().unwrap();
        assert!(matches!(
            embedder.embed("   "),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_similar_descriptions_rank_higher() {
        let embedder = CandleEmbedder::load_default().unwrap();
        let query = embedder.embed("river burst its banks and flooded the town").unwrap();
        let flood = embedder.embed("flood water covering the village").unwrap();
        let fire = embedder.embed("wildfire spreading through dry forest").unwrap();

        assert!(query.cosine_similarity(&flood) > query.cosine_similarity(&fire));
    }
}
