//! Imagery sources: where green and near-infrared bands come from.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use chrono::{DateTime, Utc};
use disaster_raster::{band_from_vec, GeoTransform};
use disaster_types::{BoundingBox, IngestionSettings, RegionOfInterest};
use ndarray::Array2;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::IngestError;

/// One multi-band observation over a region.
#[derive(Debug, Clone)]
pub struct Scene {
    pub scene_id: String,
    pub captured_at: DateTime<Utc>,
    /// Green band (Sentinel-2 B3)
    pub green: Array2<f32>,
    /// Near-infrared band (Sentinel-2 B8)
    pub nir: Array2<f32>,
    pub transform: GeoTransform,
}

impl Scene {
    /// `(rows, cols)` of the band grids
    pub fn dim(&self) -> (usize, usize) {
        self.green.dim()
    }
}

/// Scene document as served by the imagery provider and stored in scene files.
///
/// Bands are row-major, north row first. `bbox` defaults to the requested
/// region when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub scene_id: String,
    pub captured_at: DateTime<Utc>,
    pub rows: usize,
    pub cols: usize,
    pub green: Vec<f32>,
    pub nir: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<String>,
}

impl SceneRecord {
    /// Record with both bands filled with a single value.
    pub fn uniform(
        scene_id: impl Into<String>,
        captured_at: DateTime<Utc>,
        rows: usize,
        cols: usize,
        green: f32,
        nir: f32,
    ) -> Self {
        Self {
            scene_id: scene_id.into(),
            captured_at,
            rows,
            cols,
            green: vec![green; rows * cols],
            nir: vec![nir; rows * cols],
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, bbox: &BoundingBox) -> Self {
        self.bbox = Some(bbox.to_string());
        self
    }

    /// Shape the flat bands into grids placed over `bbox` (or the record's own box).
    pub fn into_scene(self, requested: &BoundingBox) -> Result<Scene, IngestError> {
        let bbox = match &self.bbox {
            Some(s) => BoundingBox::parse(s)
                .map_err(|e| IngestError::InvalidScene(format!("bbox: {}", e)))?,
            None => *requested,
        };
        let invalid = |e: disaster_raster::RasterError| IngestError::InvalidScene(e.to_string());

        let green = band_from_vec(self.rows, self.cols, self.green).map_err(invalid)?;
        let nir = band_from_vec(self.rows, self.cols, self.nir).map_err(invalid)?;
        let transform = GeoTransform::from_bbox(&bbox, self.rows, self.cols).map_err(invalid)?;

        Ok(Scene {
            scene_id: self.scene_id,
            captured_at: self.captured_at,
            green,
            nir,
            transform,
        })
    }
}

/// Provider of the most recent scene over a region.
#[async_trait]
pub trait ImagerySource: Send + Sync {
    /// Fetch the latest scene inside the region's lookback window.
    async fn fetch_scene(&self, roi: &RegionOfInterest) -> Result<Scene, IngestError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Configuration for [`HttpImagerySource`].
#[derive(Debug, Clone)]
pub struct HttpImagerySourceConfig {
    /// Base URL, e.g. "https://imagery.example.org/v1"
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
    /// Attempts before giving up
    pub max_retries: u32,
    /// First retry delay; doubles per attempt
    pub initial_backoff: Duration,
}

impl HttpImagerySourceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn with_retries(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    /// Build from ingestion settings; `None` when no provider URL is configured.
    pub fn from_settings(settings: &IngestionSettings, timeout: Duration) -> Option<Self> {
        let base_url = settings.imagery_url.as_ref()?;
        let mut config = Self::new(base_url.trim_end_matches('/'));
        config.api_key = settings
            .imagery_api_key
            .as_ref()
            .map(|k| SecretString::from(k.clone()));
        config.timeout = timeout;
        config.max_retries = settings.max_retries.max(1);
        Some(config)
    }
}

/// Imagery provider reached over HTTP.
///
/// `GET {base_url}/scenes/latest?bbox=..&start=..&end=..` answers a
/// [`SceneRecord`]. Transport errors, 429 and 5xx are retried with
/// exponential backoff; other statuses fail immediately.
pub struct HttpImagerySource {
    client: Client,
    config: HttpImagerySourceConfig,
}

/// Outcome of one request attempt.
enum Attempt {
    Retry(String),
    Fatal(IngestError),
}

impl HttpImagerySource {
    pub fn new(config: HttpImagerySourceConfig) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IngestError::Validation(format!("imagery client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn request_scene(
        &self,
        roi: &RegionOfInterest,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SceneRecord, Attempt> {
        let url = format!("{}/scenes/latest", self.config.base_url);

        let mut request = self.client.get(&url).query(&[
            ("bbox", roi.bbox.to_string()),
            ("start", start.to_rfc3339()),
            ("end", end.to_rfc3339()),
        ]);
        if let Some(key) = &self.config.api_key {
            request = request.header(
                "Authorization",
                format!("Bearer {}", key.expose_secret()),
            );
        }

        let response = request
            .send()
            .await
            .map_err(|e| Attempt::Retry(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(Attempt::Retry(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Attempt::Fatal(IngestError::UpstreamUnavailable(format!(
                "HTTP {}: {}",
                status, body
            ))));
        }

        response
            .json::<SceneRecord>()
            .await
            .map_err(|e| Attempt::Fatal(IngestError::InvalidScene(e.to_string())))
    }
}

#[async_trait]
impl ImagerySource for HttpImagerySource {
    async fn fetch_scene(&self, roi: &RegionOfInterest) -> Result<Scene, IngestError> {
        let (start, end) = roi
            .window(Utc::now())
            .map_err(|e| IngestError::Validation(e.to_string()))?;
        let mut backoff = ExponentialBackoff {
            current_interval: self.config.initial_backoff,
            initial_interval: self.config.initial_backoff,
            max_elapsed_time: Some(Duration::from_secs(300)),
            ..Default::default()
        };

        let mut attempts = 0;
        let record = loop {
            attempts += 1;
            debug!(attempt = attempts, bbox = %roi.bbox, "Requesting scene");

            match self.request_scene(roi, start, end).await {
                Ok(record) => break record,
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Retry(reason)) => {
                    if attempts >= self.config.max_retries {
                        error!(error = %reason, attempts, "Imagery provider unavailable");
                        return Err(IngestError::UpstreamUnavailable(reason));
                    }
                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %reason,
                                retry_in_ms = duration.as_millis(),
                                "Scene request failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => return Err(IngestError::UpstreamUnavailable(reason)),
                    }
                }
            }
        };

        info!(scene_id = %record.scene_id, rows = record.rows, cols = record.cols, "Fetched scene");
        record.into_scene(&roi.bbox)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Fixed scene, from memory or a JSON scene file.
#[derive(Debug, Clone)]
pub struct StaticImagerySource {
    record: SceneRecord,
}

impl StaticImagerySource {
    pub fn new(record: SceneRecord) -> Self {
        Self { record }
    }

    /// Load a [`SceneRecord`] JSON document.
    pub fn from_file(path: &Path) -> Result<Self, IngestError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Validation(format!("cannot read scene file {}: {}", path.display(), e))
        })?;
        let record: SceneRecord = serde_json::from_str(&text)
            .map_err(|e| IngestError::InvalidScene(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(record))
    }
}

#[async_trait]
impl ImagerySource for StaticImagerySource {
    async fn fetch_scene(&self, roi: &RegionOfInterest) -> Result<Scene, IngestError> {
        self.record.clone().into_scene(&roi.bbox)
    }

    fn name(&self) -> &str {
        "static"
    }
}
