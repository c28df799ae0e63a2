//! Feature-hashing embedder.
//!
//! Maps lowercase word unigrams and bigrams into a fixed number of buckets
//! with FNV-1a, using one hash bit as the sign. The result is normalized.
//! No model files, fully deterministic across runs and platforms.

use crate::error::EmbeddingError;
use crate::model::{ensure_text, Embedding, EmbeddingModel, ModelInfo};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Bigram features count half as much as unigrams.
const BIGRAM_WEIGHT: f32 = 0.5;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Lowercase word tokens; text with no word characters falls back to its
/// individual symbols so every non-blank input has features.
fn tokenize(text: &str) -> Vec<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();
    if !words.is_empty() {
        return words;
    }
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(String::from)
        .collect()
}

/// Deterministic bag-of-words embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    info: ModelInfo,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbeddingError> {
        if dimension == 0 {
            return Err(EmbeddingError::InvalidInput(
                "dimension must be > 0".to_string(),
            ));
        }
        Ok(Self {
            info: ModelInfo {
                name: format!("fnv1a-hash-{}", dimension),
                dimension,
                max_sequence_length: usize::MAX,
            },
        })
    }

    fn accumulate(&self, feature: &str, weight: f32, values: &mut [f32]) {
        let h = fnv1a(feature.as_bytes());
        let bucket = (h % values.len() as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        values[bucket] += sign * weight;
    }
}

impl EmbeddingModel for HashEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        ensure_text(text)?;
        let tokens = tokenize(text);

        let mut values = vec![0.0f32; self.info.dimension];
        for token in &tokens {
            self.accumulate(token, 1.0, &mut values);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&bigram, BIGRAM_WEIGHT, &mut values);
        }

        Ok(Embedding::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(fnv1a(b""), FNV_OFFSET);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_deterministic() {
        let embedder = HashEmbedder::new(64).unwrap();
        let a = embedder.embed("Flooding along the Brahmaputra").unwrap();
        let b = embedder.embed("Flooding along the Brahmaputra").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dimension(), 64);
    }

    #[test]
    fn test_unit_length() {
        let embedder = HashEmbedder::new(128).unwrap();
        let emb = embedder.embed("river overflow near Guwahati").unwrap();
        let norm: f32 = emb.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = HashEmbedder::new(128).unwrap();
        let a = embedder.embed("Flood, near Patna!").unwrap();
        let b = embedder.embed("flood near patna").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_overlap_scores_higher() {
        let embedder = HashEmbedder::new(384).unwrap();
        let query = embedder.embed("flood in coastal villages").unwrap();
        let close = embedder.embed("flood detected in coastal villages").unwrap();
        let far = embedder.embed("wildfire on a mountain ridge").unwrap();
        assert!(query.cosine_similarity(&close) > query.cosine_similarity(&far));
    }

    #[test]
    fn test_rejects_blank_text() {
        let embedder = HashEmbedder::new(16).unwrap();
        assert!(matches!(
            embedder.embed(""),
            Err(EmbeddingError::InvalidInput(_))
        ));
        assert!(matches!(
            embedder.embed("  \t "),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_symbol_only_text_embeds() {
        let embedder = HashEmbedder::new(16).unwrap();
        let question = embedder.embed("???").unwrap();
        let norm: f32 = question.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(question, embedder.embed(" ??? ").unwrap());
        assert_ne!(question, embedder.embed("!!!").unwrap());
    }

    #[test]
    fn test_zero_dimension() {
        assert!(HashEmbedder::new(0).is_err());
    }
}
