//! Embedder construction from settings.

use std::sync::Arc;

use disaster_types::{EmbeddingProvider, EmbeddingSettings};
use tracing::info;

use crate::cache::ModelDir;
use crate::candle::{CandleEmbedder, EMBEDDING_DIM};
use crate::error::EmbeddingError;
use crate::hash::HashEmbedder;
use crate::model::EmbeddingModel;

/// Build the configured embedder.
///
/// The candle provider fixes its own dimension; a configured dimension
/// that disagrees is rejected rather than silently ignored.
pub fn build_embedder(
    settings: &EmbeddingSettings,
) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
    let model: Arc<dyn EmbeddingModel> = match settings.provider {
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(settings.dimension)?),
        EmbeddingProvider::Candle => {
            if settings.dimension != EMBEDDING_DIM {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: EMBEDDING_DIM,
                    actual: settings.dimension,
                });
            }
            Arc::new(CandleEmbedder::load(&ModelDir::from_settings(settings))?)
        }
    };

    info!(
        model = %model.info().name,
        dimension = model.dimension(),
        "Embedding model ready"
    );
    Ok(model)
}
