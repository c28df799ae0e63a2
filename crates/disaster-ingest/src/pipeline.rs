//! Ingestion run orchestration.
//!
//! fetch scene -> NDWI -> water mask -> vectorize -> normalize -> embed -> insert
//!
//! Raster work and embedding run on blocking threads. A failure to fetch
//! or embed aborts the run before anything is stored; per-region and
//! per-document problems are counted in the report instead.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use disaster_embeddings::EmbeddingModel;
use disaster_raster::{
    mask_stats, normalized_difference, threshold_mask, MaskStats, SpectralIndex, VectorizeConfig,
    Vectorizer,
};
use disaster_storage::{EventStore, InsertFailure};
use disaster_types::{IngestionSettings, RegionOfInterest};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::normalizer::{EventNormalizer, NormalizeOutcome, NormalizerConfig, SkippedRegion};
use crate::source::{ImagerySource, Scene};

/// Checkpoint key under which the latest report is stored
pub const LAST_RUN_CHECKPOINT: &str = "ingestion";

/// Pipeline parameters.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub index: SpectralIndex,
    /// Cells with index above this are water
    pub threshold: f32,
    pub vectorize: VectorizeConfig,
    pub normalizer: NormalizerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let index = SpectralIndex::Ndwi;
        Self {
            threshold: index.default_threshold(),
            index,
            vectorize: VectorizeConfig::default(),
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_settings(settings: &IngestionSettings) -> Result<Self, IngestError> {
        Ok(Self {
            index: SpectralIndex::Ndwi,
            threshold: settings.threshold,
            vectorize: VectorizeConfig {
                scale_m: settings.scale_m,
                max_cells: settings.max_cells,
                max_regions: settings.max_regions,
            },
            normalizer: NormalizerConfig::from_settings(settings)?,
        })
    }
}

/// Counts and provenance for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub run_key: String,
    pub scene_id: String,
    pub captured_at: Option<DateTime<Utc>>,
    /// Cells above the threshold before downsampling
    pub water_cells: usize,
    pub downsample_factor: usize,
    /// Regions produced by the vectorizer
    pub regions: usize,
    /// Vectorizer stopped at its region cap
    pub truncated: bool,
    pub normalized: usize,
    pub skipped: usize,
    pub inserted: usize,
    /// Documents the store rejected
    pub failed: usize,
    #[serde(default)]
    pub inserted_ids: Vec<String>,
    #[serde(default)]
    pub skipped_regions: Vec<SkippedRegion>,
    #[serde(default)]
    pub failures: Vec<InsertFailure>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl IngestionReport {
    /// True when some regions or documents were dropped.
    pub fn is_partial(&self) -> bool {
        self.skipped > 0 || self.failed > 0
    }
}

/// Raster stage output handed from the blocking thread.
struct Extraction {
    stats: MaskStats,
    downsample_factor: usize,
    regions: usize,
    truncated: bool,
    outcome: NormalizeOutcome,
}

/// One-shot ingestion over a region of interest.
pub struct IngestionPipeline {
    config: PipelineConfig,
    vectorizer: Vectorizer,
    normalizer: EventNormalizer,
    source: Arc<dyn ImagerySource>,
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<dyn EventStore>,
}

impl IngestionPipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn ImagerySource>,
        embedder: Arc<dyn EmbeddingModel>,
        store: Arc<dyn EventStore>,
    ) -> Result<Self, IngestError> {
        if !(-1.0..=1.0).contains(&config.threshold) {
            return Err(IngestError::Validation(format!(
                "threshold must be within [-1, 1], got {}",
                config.threshold
            )));
        }
        if embedder.dimension() != store.dimension() {
            return Err(IngestError::Validation(format!(
                "embedder produces {} dimensions, store expects {}",
                embedder.dimension(),
                store.dimension()
            )));
        }
        let vectorizer = Vectorizer::new(config.vectorize)?;
        let normalizer = EventNormalizer::new(config.normalizer.clone())?;

        Ok(Self {
            config,
            vectorizer,
            normalizer,
            source,
            embedder,
            store,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Key concurrent runs over the same region and window share.
    ///
    /// Runs with equal keys may store duplicate events; callers serialize on it.
    pub fn run_key(roi: &RegionOfInterest) -> String {
        roi.run_key()
    }

    /// Execute one ingestion run.
    pub async fn run(&self, roi: &RegionOfInterest) -> Result<IngestionReport, IngestError> {
        let run_key = Self::run_key(roi);
        info!(run_key = %run_key, source = self.source.name(), "Starting ingestion run");

        let scene = self.source.fetch_scene(roi).await?;
        let scene_id = scene.scene_id.clone();
        let captured_at = scene.captured_at;

        let extraction = self.extract(scene).await?;
        let mut report = IngestionReport {
            run_key,
            scene_id,
            captured_at: Some(captured_at),
            water_cells: extraction.stats.true_cells,
            downsample_factor: extraction.downsample_factor,
            regions: extraction.regions,
            truncated: extraction.truncated,
            normalized: extraction.outcome.normalized(),
            skipped: extraction.outcome.skipped_count(),
            skipped_regions: extraction.outcome.skipped,
            ..Default::default()
        };

        let mut events = extraction.outcome.events;
        if !events.is_empty() {
            let embeddings = self.embed(events.iter().map(|e| e.embedding_text()).collect()).await?;
            for (event, embedding) in events.iter_mut().zip(embeddings) {
                event.embedding = Some(embedding);
            }

            let store = Arc::clone(&self.store);
            let insert = tokio::task::spawn_blocking(move || store.insert_many(events)).await??;
            report.inserted = insert.inserted();
            report.failed = insert.failed();
            report.inserted_ids = insert.inserted_ids;
            report.failures = insert.failures;
        }
        report.finished_at = Some(Utc::now());

        self.checkpoint(&report).await;
        if report.is_partial() {
            warn!(
                skipped = report.skipped,
                failed = report.failed,
                "Ingestion run completed with dropped items"
            );
        }
        info!(
            regions = report.regions,
            normalized = report.normalized,
            inserted = report.inserted,
            "Ingestion run complete"
        );
        Ok(report)
    }

    /// Spectral index, mask and vectorization on a blocking thread.
    async fn extract(&self, scene: Scene) -> Result<Extraction, IngestError> {
        let vectorizer = self.vectorizer.clone();
        let normalizer = self.normalizer.clone();
        let threshold = self.config.threshold;

        tokio::task::spawn_blocking(move || -> Result<Extraction, IngestError> {
            let (rows, cols) = scene.dim();
            let index = normalized_difference(&scene.green, &scene.nir)?;
            let mask = threshold_mask(&index, threshold);
            let stats = mask_stats(&index, &mask);
            debug!(
                rows,
                cols,
                water = stats.true_cells,
                excluded = stats.excluded_cells,
                "Computed water mask"
            );
            drop(index);

            let vectorization = vectorizer.vectorize(&mask, &scene.transform)?;
            info!(
                regions = vectorization.regions.len(),
                factor = vectorization.downsample_factor,
                truncated = vectorization.truncated,
                "Vectorized mask"
            );

            let outcome = normalizer.normalize_batch(&vectorization.regions, scene.captured_at);
            Ok(Extraction {
                stats,
                downsample_factor: vectorization.downsample_factor,
                regions: vectorization.regions.len(),
                truncated: vectorization.truncated,
                outcome,
            })
        })
        .await?
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, IngestError> {
        let embedder = Arc::clone(&self.embedder);
        let expected = texts.len();

        let embeddings = tokio::task::spawn_blocking(move || embedder.embed_texts(&texts))
            .await?
            .map_err(|e| IngestError::UpstreamUnavailable(format!("embedding failed: {}", e)))?;

        if embeddings.len() != expected {
            return Err(IngestError::UpstreamUnavailable(format!(
                "embedder returned {} vectors for {} texts",
                embeddings.len(),
                expected
            )));
        }
        Ok(embeddings.into_iter().map(|e| e.into_vec()).collect())
    }

    /// Record the report; a failed write is logged, not fatal.
    async fn checkpoint(&self, report: &IngestionReport) {
        let bytes = match serde_json::to_vec(report) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "Failed to encode ingestion checkpoint");
                return;
            }
        };
        let store = Arc::clone(&self.store);
        let result =
            tokio::task::spawn_blocking(move || store.put_checkpoint(LAST_RUN_CHECKPOINT, &bytes))
                .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to write ingestion checkpoint"),
            Err(e) => warn!(error = %e, "Checkpoint task failed"),
        }
    }
}

/// Report of the most recent run, if any.
pub fn last_report(store: &dyn EventStore) -> Result<Option<IngestionReport>, IngestError> {
    match store.get_checkpoint(LAST_RUN_CHECKPOINT)? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| IngestError::Validation(format!("corrupt ingestion checkpoint: {}", e))),
        None => Ok(None),
    }
}
