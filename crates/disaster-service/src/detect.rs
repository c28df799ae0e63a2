//! Single-detection intake behind `POST /detect`.

use std::sync::Arc;

use chrono::Utc;
use disaster_embeddings::EmbeddingModel;
use disaster_ingest::{DisasterClassifier, Prediction};
use disaster_storage::{EventStore, StorageError};
use disaster_types::{BoundingBox, DetectSettings, DisasterType, Event, Geometry, Position};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ServiceError;

/// Where a detection happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetectRegion {
    /// `{"bbox": "78,22,79,23"}` or `{"bbox": [78, 22, 79, 23]}`
    Bbox { bbox: BboxInput },
    /// `{"point": [lon, lat]}`
    Point { point: Position },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BboxInput {
    Text(String),
    Coords([f64; 4]),
}

impl DetectRegion {
    /// The point an event for this region is located at.
    pub fn location(&self) -> Result<Position, ServiceError> {
        let invalid = |e: disaster_types::DisasterError| ServiceError::Validation(e.to_string());
        match self {
            DetectRegion::Bbox { bbox } => {
                let bbox = match bbox {
                    BboxInput::Text(text) => BoundingBox::parse(text).map_err(invalid)?,
                    BboxInput::Coords([a, b, c, d]) => {
                        BoundingBox::new(*a, *b, *c, *d).map_err(invalid)?
                    }
                };
                Ok(bbox.center())
            }
            DetectRegion::Point { point } => {
                Geometry::Point(*point).validate().map_err(invalid)?;
                Ok(*point)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectRequest {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub region: Option<DetectRegion>,
    /// Overrides the classifier's label
    #[serde(default, rename = "type")]
    pub disaster_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectResponse {
    pub prediction: Prediction,
    pub inserted_id: String,
}

pub struct DetectionService {
    classifier: Arc<dyn DisasterClassifier>,
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<dyn EventStore>,
    default_location: Position,
    source: String,
}

impl DetectionService {
    pub fn new(
        classifier: Arc<dyn DisasterClassifier>,
        embedder: Arc<dyn EmbeddingModel>,
        store: Arc<dyn EventStore>,
        settings: &DetectSettings,
    ) -> Self {
        Self {
            classifier,
            embedder,
            store,
            default_location: [settings.default_lon, settings.default_lat],
            source: settings.source.clone(),
        }
    }

    /// Classify, embed and store one detection.
    pub async fn detect(&self, request: DetectRequest) -> Result<DetectResponse, ServiceError> {
        let image_url = request
            .image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string);
        if image_url.is_none() && request.region.is_none() {
            return Err(ServiceError::Validation(
                "image_url or region is required".to_string(),
            ));
        }

        let location = match &request.region {
            Some(region) => region.location()?,
            None => self.default_location,
        };
        let override_type = request
            .disaster_type
            .as_deref()
            .map(|label| {
                label
                    .parse::<DisasterType>()
                    .map_err(|e| ServiceError::Validation(e.to_string()))
            })
            .transpose()?;

        let mut prediction = self
            .classifier
            .classify(image_url.as_deref())
            .await
            .map_err(|e| ServiceError::UpstreamUnavailable(e.to_string()))?;
        if let Some(label) = override_type {
            prediction.disaster_type = label;
        }
        debug!(
            label = %prediction.disaster_type,
            confidence = prediction.confidence,
            "Detection classified"
        );

        let mut event = Event::new(
            prediction.disaster_type.clone(),
            Geometry::Point(location),
            Utc::now(),
            prediction.confidence,
            self.source.clone(),
        );
        if let Some(url) = image_url {
            event = event.with_image_url(url);
        }
        let description = match request.description.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => event.embedding_text(),
        };
        event = event.with_description(description.clone());

        let embedder = Arc::clone(&self.embedder);
        let embedding = tokio::task::spawn_blocking(move || embedder.embed(&description))
            .await??;
        let event = event.with_embedding(embedding.into_vec());

        let store = Arc::clone(&self.store);
        let inserted_id = tokio::task::spawn_blocking(move || store.insert_one(event))
            .await?
            .map_err(|e| match e {
                StorageError::InvalidEvent(msg) => ServiceError::Validation(msg),
                other => ServiceError::StoreUnavailable(other.to_string()),
            })?;

        info!(id = %inserted_id, label = %prediction.disaster_type, "Detection stored");
        Ok(DetectResponse {
            prediction,
            inserted_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use disaster_embeddings::MockEmbedder;
    use disaster_ingest::MockClassifier;
    use disaster_storage::{RocksEventStore, StoreConfig};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn service(temp: &TempDir) -> (DetectionService, Arc<RocksEventStore>) {
        let store = Arc::new(
            RocksEventStore::open(&temp.path().join("db"), StoreConfig::new(DIM)).unwrap(),
        );
        let service = DetectionService::new(
            Arc::new(MockClassifier::new()),
            Arc::new(MockEmbedder::new(DIM)),
            store.clone(),
            &DetectSettings::default(),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_image_url_uses_default_location() {
        let temp = TempDir::new().unwrap();
        let (service, store) = service(&temp);

        let response = service
            .detect(DetectRequest {
                image_url: Some("https://example.org/flood.jpg".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(response.prediction.disaster_type, DisasterType::Flood);
        assert_eq!(response.prediction.confidence, 0.95);

        let stored = store.get(&response.inserted_id).unwrap().unwrap();
        assert_eq!(stored.location, Geometry::point(78.6569, 22.9734));
        assert_eq!(stored.image_url.as_deref(), Some("https://example.org/flood.jpg"));
        assert_eq!(stored.source, "classifier");
        assert!(stored.embedding.is_some());
    }

    #[tokio::test]
    async fn test_region_centre_and_type_override() {
        let temp = TempDir::new().unwrap();
        let (service, store) = service(&temp);

        let request: DetectRequest = serde_json::from_value(serde_json::json!({
            "region": {"bbox": "78,22,80,24"},
            "type": "wildfire"
        }))
        .unwrap();
        let response = service.detect(request).await.unwrap();

        assert_eq!(response.prediction.disaster_type, DisasterType::Fire);
        let stored = store.get(&response.inserted_id).unwrap().unwrap();
        assert_eq!(stored.location, Geometry::point(79.0, 23.0));
        assert_eq!(stored.disaster_type, DisasterType::Fire);
    }

    #[tokio::test]
    async fn test_point_region() {
        let temp = TempDir::new().unwrap();
        let (service, store) = service(&temp);

        let request: DetectRequest =
            serde_json::from_value(serde_json::json!({"region": {"point": [85.1, 25.6]}}))
                .unwrap();
        let response = service.detect(request).await.unwrap();
        let stored = store.get(&response.inserted_id).unwrap().unwrap();
        assert_eq!(stored.location, Geometry::point(85.1, 25.6));
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let temp = TempDir::new().unwrap();
        let (service, store) = service(&temp);

        for request in [
            DetectRequest::default(),
            DetectRequest {
                image_url: Some("  ".to_string()),
                ..Default::default()
            },
        ] {
            let result = service.detect(request).await;
            assert!(matches!(result, Err(ServiceError::Validation(_))));
        }
        assert_eq!(store.stats().unwrap().event_count, 0);
    }

    #[tokio::test]
    async fn test_bad_region_rejected() {
        let temp = TempDir::new().unwrap();
        let (service, _store) = service(&temp);

        let request: DetectRequest =
            serde_json::from_value(serde_json::json!({"region": {"point": [200.0, 0.0]}}))
                .unwrap();
        assert!(matches!(
            service.detect(request).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_embedding_failure_stores_nothing() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(
            RocksEventStore::open(&temp.path().join("db"), StoreConfig::new(DIM)).unwrap(),
        );
        let embedder = Arc::new(MockEmbedder::new(DIM));
        embedder.set_failing(true);
        let service = DetectionService::new(
            Arc::new(MockClassifier::new()),
            embedder,
            store.clone(),
            &DetectSettings::default(),
        );

        let result = service
            .detect(DetectRequest {
                image_url: Some("https://example.org/a.jpg".to_string()),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(ServiceError::UpstreamUnavailable(_))));
        assert_eq!(store.stats().unwrap().event_count, 0);
    }
}
