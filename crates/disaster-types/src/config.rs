//! Configuration loading for disaster-watch.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/disaster-watch/config.toml.

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::DisasterError;
use crate::geo::{BoundingBox, RegionOfInterest, DEFAULT_BBOX};

const APP_NAME: &str = "disaster-watch";

/// Which embedding backend produces event and query vectors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Feature-hashing embedder, offline and dependency-free at runtime
    #[default]
    Hash,
    /// all-MiniLM-L6-v2 through Candle
    Candle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Vector dimensionality. Candle models dictate their own (384).
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Override for the model download cache
    #[serde(default)]
    pub model_cache_dir: Option<String>,
}

fn default_dimension() -> usize {
    384
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            dimension: default_dimension(),
            model_cache_dir: None,
        }
    }
}

/// Nearest-neighbour index implementation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    /// Exact brute-force scan
    #[default]
    Flat,
    /// Approximate HNSW graph (usearch)
    Hnsw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSettings {
    #[serde(default)]
    pub backend: VectorBackend,

    /// Directory for the persisted HNSW index
    #[serde(default = "default_vector_index_path")]
    pub index_path: String,

    /// Candidates fetched from an approximate index before exact re-ranking
    #[serde(default = "default_num_candidates")]
    pub num_candidates: usize,
}

fn default_vector_index_path() -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join("vector-index"))
        .unwrap_or_else(|| PathBuf::from("./vector-index"))
        .to_string_lossy()
        .to_string()
}

fn default_num_candidates() -> usize {
    100
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            index_path: default_vector_index_path(),
            num_candidates: default_num_candidates(),
        }
    }
}

/// How a vectorized region becomes an event location.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocationMode {
    /// Store the region geometry as-is
    #[default]
    Region,
    /// Point at the first vertex of the outer ring
    FirstVertex,
    /// Point at the centre of the region's envelope
    Centroid,
}

/// Scheduled satellite ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 6-field cron expression (sec min hour dom mon dow)
    #[serde(default = "default_ingestion_cron")]
    pub cron: String,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_jitter_secs")]
    pub jitter_secs: u64,

    /// Run timeout; 0 disables it
    #[serde(default = "default_ingestion_timeout")]
    pub timeout_secs: u64,

    /// "min_lon,min_lat,max_lon,max_lat"
    #[serde(default = "default_bbox")]
    pub bbox: String,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Water threshold applied to the NDWI raster
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Vectorization scale in metres per cell
    #[serde(default = "default_scale_m")]
    pub scale_m: f64,

    /// Hard cap on cells the vectorizer labels
    #[serde(default = "default_max_cells")]
    pub max_cells: usize,

    #[serde(default = "default_max_regions")]
    pub max_regions: usize,

    #[serde(default = "default_disaster_type")]
    pub disaster_type: String,

    #[serde(default = "default_source")]
    pub source: String,

    #[serde(default = "default_ingestion_confidence")]
    pub default_confidence: f64,

    #[serde(default)]
    pub location_mode: LocationMode,

    /// Base URL of the imagery provider. Unset disables remote fetches.
    #[serde(default)]
    pub imagery_url: Option<String>,

    /// Bearer token for the imagery provider (prefer the env var)
    #[serde(default)]
    pub imagery_api_key: Option<String>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_true() -> bool {
    true
}

fn default_ingestion_cron() -> String {
    "0 0 */6 * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_jitter_secs() -> u64 {
    60
}

fn default_ingestion_timeout() -> u64 {
    1800
}

fn default_bbox() -> String {
    DEFAULT_BBOX.to_string()
}

fn default_lookback_days() -> u32 {
    30
}

fn default_threshold() -> f32 {
    0.2
}

fn default_scale_m() -> f64 {
    500.0
}

fn default_max_cells() -> usize {
    100_000_000
}

fn default_max_regions() -> usize {
    10_000
}

fn default_disaster_type() -> String {
    "flood".to_string()
}

fn default_source() -> String {
    "satellite".to_string()
}

fn default_ingestion_confidence() -> f64 {
    0.85
}

fn default_max_retries() -> u32 {
    3
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: default_ingestion_cron(),
            timezone: default_timezone(),
            jitter_secs: default_jitter_secs(),
            timeout_secs: default_ingestion_timeout(),
            bbox: default_bbox(),
            lookback_days: default_lookback_days(),
            threshold: default_threshold(),
            scale_m: default_scale_m(),
            max_cells: default_max_cells(),
            max_regions: default_max_regions(),
            disaster_type: default_disaster_type(),
            source: default_source(),
            default_confidence: default_ingestion_confidence(),
            location_mode: LocationMode::default(),
            imagery_url: None,
            imagery_api_key: None,
            max_retries: default_max_retries(),
        }
    }
}

impl IngestionSettings {
    /// Region of interest described by `bbox` and `lookback_days`.
    pub fn region(&self) -> Result<RegionOfInterest, DisasterError> {
        RegionOfInterest::new(BoundingBox::parse(&self.bbox)?, self.lookback_days)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.region().map_err(|e| e.to_string())?;
        if !(-1.0..=1.0).contains(&self.threshold) {
            return Err(format!("threshold must be -1.0..=1.0, got {}", self.threshold));
        }
        if !(0.0..=1.0).contains(&self.default_confidence) {
            return Err(format!(
                "default_confidence must be 0.0-1.0, got {}",
                self.default_confidence
            ));
        }
        if self.max_cells == 0 {
            return Err("max_cells must be > 0".to_string());
        }
        if self.max_regions == 0 {
            return Err("max_regions must be > 0".to_string());
        }
        if self.scale_m.is_nan() || self.scale_m <= 0.0 {
            return Err(format!("scale_m must be > 0, got {}", self.scale_m));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySettings {
    /// Number of similar events returned per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    3
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

/// Fallbacks for the image detection endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectSettings {
    /// Location used when a request carries no region
    #[serde(default = "default_detect_lon")]
    pub default_lon: f64,

    #[serde(default = "default_detect_lat")]
    pub default_lat: f64,

    #[serde(default = "default_detect_source")]
    pub source: String,
}

fn default_detect_lon() -> f64 {
    78.6569
}

fn default_detect_lat() -> f64 {
    22.9734
}

fn default_detect_source() -> String {
    "classifier".to_string()
}

impl Default for DetectSettings {
    fn default() -> Self {
        Self {
            default_lon: default_detect_lon(),
            default_lat: default_detect_lat(),
            source: default_detect_source(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for daily `app.YYYY-MM-DD.log` files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Per-request timeout for HTTP handlers
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub vector: VectorSettings,

    #[serde(default)]
    pub ingestion: IngestionSettings,

    #[serde(default)]
    pub query: QuerySettings,

    #[serde(default)]
    pub detect: DetectSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            http_host: default_http_host(),
            http_port: default_http_port(),
            log_level: default_log_level(),
            log_dir: None,
            request_timeout_secs: default_request_timeout(),
            embedding: EmbeddingSettings::default(),
            vector: VectorSettings::default(),
            ingestion: IngestionSettings::default(),
            query: QuerySettings::default(),
            detect: DetectSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/disaster-watch/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (DISASTER_*, nested keys joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, DisasterError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| DisasterError::Config(e.to_string()))?
            .set_default("http_host", default_http_host())
            .map_err(|e| DisasterError::Config(e.to_string()))?
            .set_default("http_port", default_http_port() as i64)
            .map_err(|e| DisasterError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| DisasterError::Config(e.to_string()))?
            .set_default("vector.index_path", default_vector_index_path())
            .map_err(|e| DisasterError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // DISASTER_DB_PATH, DISASTER_HTTP_PORT, DISASTER_INGESTION__BBOX, ...
        builder = builder.add_source(
            Environment::with_prefix("DISASTER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| DisasterError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| DisasterError::Config(e.to_string()))?;
        settings.validate().map_err(DisasterError::Config)?;
        Ok(settings)
    }

    /// Range checks across all sections.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".to_string());
        }
        if self.vector.num_candidates == 0 {
            return Err("vector.num_candidates must be > 0".to_string());
        }
        if self.query.top_k == 0 {
            return Err("query.top_k must be > 0".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be > 0".to_string());
        }
        self.ingestion
            .validate()
            .map_err(|e| format!("ingestion: {}", e))
    }

    /// Socket address for the HTTP server
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    pub fn expanded_log_dir(&self) -> Option<PathBuf> {
        self.log_dir.as_deref().map(expand_home)
    }

    /// Expand ~ in the vector index path to the home directory
    pub fn expanded_vector_index_path(&self) -> PathBuf {
        expand_home(&self.vector.index_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}
