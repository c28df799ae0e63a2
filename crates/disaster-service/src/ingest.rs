//! Manual ingestion runs behind `POST /api/ingest`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use disaster_ingest::{IngestionPipeline, IngestionReport};
use disaster_types::{BoundingBox, RegionOfInterest};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ServiceError;

/// Optional overrides of the configured region of interest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    /// "min_lon,min_lat,max_lon,max_lat"
    #[serde(default)]
    pub bbox: Option<String>,
    #[serde(default)]
    pub days: Option<u32>,
}

/// Runs the pipeline on demand, one run per region and window at a time.
pub struct IngestionTrigger {
    pipeline: Arc<IngestionPipeline>,
    default_region: RegionOfInterest,
    in_flight: Mutex<HashSet<String>>,
}

/// Releases a run key when the run ends.
struct InFlight<'a> {
    keys: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl IngestionTrigger {
    pub fn new(pipeline: Arc<IngestionPipeline>, default_region: RegionOfInterest) -> Self {
        Self {
            pipeline,
            default_region,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Region for a request, falling back to the configured one.
    pub fn resolve(&self, request: &IngestRequest) -> Result<RegionOfInterest, ServiceError> {
        let bbox = match request.bbox.as_deref() {
            Some(text) => {
                BoundingBox::parse(text).map_err(|e| ServiceError::Validation(e.to_string()))?
            }
            None => self.default_region.bbox,
        };
        let days = request.days.unwrap_or(self.default_region.lookback_days);
        RegionOfInterest::new(bbox, days).map_err(|e| ServiceError::Validation(e.to_string()))
    }

    fn claim(&self, key: &str) -> Option<InFlight<'_>> {
        let mut keys = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        keys.insert(key.to_string()).then(|| InFlight {
            keys: &self.in_flight,
            key: key.to_string(),
        })
    }

    pub async fn run(&self, request: &IngestRequest) -> Result<IngestionReport, ServiceError> {
        let roi = self.resolve(request)?;
        let key = IngestionPipeline::run_key(&roi);
        let _claim = self.claim(&key).ok_or_else(|| {
            ServiceError::Conflict(format!("ingestion for {} is already running", key))
        })?;

        info!(run_key = %key, "Manual ingestion requested");
        let report = self.pipeline.run(&roi).await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use disaster_embeddings::HashEmbedder;
    use disaster_ingest::{PipelineConfig, SceneRecord, StaticImagerySource};
    use disaster_storage::{RocksEventStore, StoreConfig};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const DIM: usize = 16;

    fn trigger(temp: &TempDir) -> IngestionTrigger {
        let store = Arc::new(
            RocksEventStore::open(&temp.path().join("db"), StoreConfig::new(DIM)).unwrap(),
        );
        let captured = Utc.with_ymd_and_hms(2026, 7, 14, 5, 30, 0).unwrap();
        let record = SceneRecord::uniform("scene-1", captured, 10, 10, 0.5, 0.1);
        let pipeline = IngestionPipeline::new(
            PipelineConfig::default(),
            Arc::new(StaticImagerySource::new(record)),
            Arc::new(HashEmbedder::new(DIM).unwrap()),
            store,
        )
        .unwrap();
        let region =
            RegionOfInterest::new(BoundingBox::new(78.0, 22.0, 79.0, 23.0).unwrap(), 30).unwrap();
        IngestionTrigger::new(Arc::new(pipeline), region)
    }

    #[test]
    fn test_resolve_overrides() {
        let temp = TempDir::new().unwrap();
        let trigger = trigger(&temp);

        let default = trigger.resolve(&IngestRequest::default()).unwrap();
        assert_eq!(default.run_key(), "78,22,79,23@30d");

        let custom = trigger
            .resolve(&IngestRequest {
                bbox: Some("80,10,81,11".to_string()),
                days: Some(7),
            })
            .unwrap();
        assert_eq!(custom.run_key(), "80,10,81,11@7d");

        let bad = trigger.resolve(&IngestRequest {
            bbox: Some("north india".to_string()),
            days: None,
        });
        assert!(matches!(bad, Err(ServiceError::Validation(_))));

        let too_long = trigger.resolve(&IngestRequest {
            bbox: None,
            days: Some(u32::MAX),
        });
        assert!(matches!(too_long, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_same_key_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let trigger = trigger(&temp);

        let first = trigger.claim("78,22,79,23@30d");
        assert!(first.is_some());
        assert!(trigger.claim("78,22,79,23@30d").is_none());
        assert!(trigger.claim("78,22,79,23@7d").is_some());

        drop(first);
        assert!(trigger.claim("78,22,79,23@30d").is_some());
    }

    #[tokio::test]
    async fn test_run_returns_report() {
        let temp = TempDir::new().unwrap();
        let trigger = trigger(&temp);

        let report = trigger.run(&IngestRequest::default()).await.unwrap();
        assert_eq!(report.regions, 1);
        assert_eq!(report.inserted, 1);
    }
}
