//! # disaster-ingest
//!
//! Turns satellite scenes into stored disaster events.
//!
//! A run fetches the latest scene over a [`RegionOfInterest`] from an
//! [`ImagerySource`], thresholds its NDWI raster into a water mask,
//! vectorizes the mask into regions, normalizes each region into an
//! [`Event`], embeds the event descriptions and batch-inserts them.
//!
//! [`DisasterClassifier`] is the image-labelling capability used by
//! detection requests.
//!
//! [`RegionOfInterest`]: disaster_types::RegionOfInterest
//! [`Event`]: disaster_types::Event

pub mod classifier;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod source;

pub use classifier::{DisasterClassifier, MockClassifier, Prediction};
pub use error::{IngestError, NormalizeError};
pub use normalizer::{EventNormalizer, NormalizeOutcome, NormalizerConfig, SkippedRegion};
pub use pipeline::{
    last_report, IngestionPipeline, IngestionReport, PipelineConfig, LAST_RUN_CHECKPOINT,
};
pub use source::{
    HttpImagerySource, HttpImagerySourceConfig, ImagerySource, Scene, SceneRecord,
    StaticImagerySource,
};
