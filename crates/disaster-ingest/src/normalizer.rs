//! Region to event normalization.
//!
//! Turns vectorized regions into [`Event`] documents carrying the run's
//! type, provenance and confidence. A malformed region is skipped and
//! recorded; it never aborts the batch.

use chrono::{DateTime, Utc};
use disaster_raster::Region;
use disaster_types::{describe, DisasterType, Event, Geometry, IngestionSettings, LocationMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IngestError, NormalizeError};

/// Metadata stamped onto every event of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizerConfig {
    pub disaster_type: DisasterType,
    pub source: String,
    pub default_confidence: f64,
    pub location_mode: LocationMode,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            disaster_type: DisasterType::Flood,
            source: "satellite".to_string(),
            default_confidence: 0.85,
            location_mode: LocationMode::Region,
        }
    }
}

impl NormalizerConfig {
    pub fn from_settings(settings: &IngestionSettings) -> Result<Self, IngestError> {
        let disaster_type = settings
            .disaster_type
            .parse::<DisasterType>()
            .map_err(|e| IngestError::Validation(e.to_string()))?;
        Ok(Self {
            disaster_type,
            source: settings.source.clone(),
            default_confidence: settings.default_confidence,
            location_mode: settings.location_mode,
        })
    }
}

/// A region that did not become an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRegion {
    /// Position in the input slice
    pub index: usize,
    pub reason: String,
}

/// Result of [`EventNormalizer::normalize_batch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeOutcome {
    pub events: Vec<Event>,
    pub skipped: Vec<SkippedRegion>,
}

impl NormalizeOutcome {
    pub fn normalized(&self) -> usize {
        self.events.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

#[derive(Debug, Clone)]
pub struct EventNormalizer {
    config: NormalizerConfig,
}

impl EventNormalizer {
    pub fn new(config: NormalizerConfig) -> Result<Self, IngestError> {
        if !config.default_confidence.is_finite()
            || !(0.0..=1.0).contains(&config.default_confidence)
        {
            return Err(IngestError::Validation(format!(
                "default_confidence must be within [0, 1], got {}",
                config.default_confidence
            )));
        }
        if config.source.trim().is_empty() {
            return Err(IngestError::Validation("source is empty".to_string()));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Build the event for one region.
    ///
    /// The event has no id and no embedding; its description is generated
    /// from the metadata and location.
    pub fn normalize(
        &self,
        region: &Region,
        captured_at: DateTime<Utc>,
    ) -> Result<Event, NormalizeError> {
        let geometry = &region.geometry;
        let first = geometry.first_vertex().ok_or(NormalizeError::EmptyGeometry)?;
        geometry
            .validate()
            .map_err(|e| NormalizeError::InvalidGeometry(e.to_string()))?;

        let location = match self.config.location_mode {
            LocationMode::Region => geometry.clone(),
            LocationMode::FirstVertex => Geometry::Point(first),
            LocationMode::Centroid => {
                Geometry::Point(geometry.centroid().ok_or(NormalizeError::EmptyGeometry)?)
            }
        };

        let event = Event::new(
            self.config.disaster_type.clone(),
            location,
            captured_at,
            self.config.default_confidence,
            self.config.source.clone(),
        );
        let description = describe(&event);
        let event = event.with_description(description);
        event
            .validate()
            .map_err(|e| NormalizeError::InvalidEvent(e.to_string()))?;
        Ok(event)
    }

    /// Normalize every region, skipping the malformed ones.
    pub fn normalize_batch(&self, regions: &[Region], captured_at: DateTime<Utc>) -> NormalizeOutcome {
        let mut outcome = NormalizeOutcome::default();
        for (index, region) in regions.iter().enumerate() {
            match self.normalize(region, captured_at) {
                Ok(event) => outcome.events.push(event),
                Err(e) => {
                    warn!(index, error = %e, "Skipping invalid region");
                    outcome.skipped.push(SkippedRegion {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }
        debug!(
            normalized = outcome.normalized(),
            skipped = outcome.skipped_count(),
            "Normalized regions"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn captured() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 14, 5, 30, 0).unwrap()
    }

    fn square() -> Region {
        Region {
            geometry: Geometry::rectangle(78.0, 22.0, 79.0, 23.0),
            cell_count: 100,
        }
    }

    fn normalizer(mode: LocationMode) -> EventNormalizer {
        EventNormalizer::new(NormalizerConfig {
            location_mode: mode,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_normalize_region_defaults() {
        let event = normalizer(LocationMode::Region)
            .normalize(&square(), captured())
            .unwrap();

        assert_eq!(event.id, None);
        assert_eq!(event.embedding, None);
        assert_eq!(event.disaster_type, DisasterType::Flood);
        assert_eq!(event.source, "satellite");
        assert_eq!(event.confidence, 0.85);
        assert_eq!(event.timestamp, captured());
        assert_eq!(event.location, square().geometry);
        let description = event.description.unwrap();
        assert!(description.starts_with("flood detected by satellite"));
        assert!(description.contains("2026-07-14"));
    }

    #[test]
    fn test_location_modes() {
        let first = normalizer(LocationMode::FirstVertex)
            .normalize(&square(), captured())
            .unwrap();
        assert_eq!(first.location, Geometry::point(78.0, 22.0));

        let centre = normalizer(LocationMode::Centroid)
            .normalize(&square(), captured())
            .unwrap();
        assert_eq!(centre.location, Geometry::point(78.5, 22.5));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let n = normalizer(LocationMode::Region);
        let a = n.normalize(&square(), captured()).unwrap();
        let b = n.normalize(&square(), captured()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_batch_skips_malformed_regions() {
        let open_ring = Region {
            geometry: Geometry::Polygon(vec![vec![
                [78.0, 22.0],
                [79.0, 22.0],
                [79.0, 23.0],
                [78.0, 23.0],
            ]]),
            cell_count: 4,
        };
        let empty = Region {
            geometry: Geometry::Polygon(vec![]),
            cell_count: 0,
        };
        let out_of_range = Region {
            geometry: Geometry::point(181.0, 0.0),
            cell_count: 1,
        };

        let outcome = normalizer(LocationMode::Region)
            .normalize_batch(&[square(), open_ring, empty, out_of_range], captured());

        assert_eq!(outcome.normalized(), 1);
        assert_eq!(outcome.skipped_count(), 3);
        let skipped: Vec<usize> = outcome.skipped.iter().map(|s| s.index).collect();
        assert_eq!(skipped, vec![1, 2, 3]);
        assert_eq!(outcome.skipped[1].reason, "region geometry is empty");
    }

    #[test]
    fn test_rejects_bad_config() {
        let bad = NormalizerConfig {
            default_confidence: 1.2,
            ..Default::default()
        };
        assert!(matches!(
            EventNormalizer::new(bad),
            Err(IngestError::Validation(_))
        ));
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = IngestionSettings::default();
        settings.disaster_type = "wildfire".to_string();
        let config = NormalizerConfig::from_settings(&settings).unwrap();
        assert_eq!(config.disaster_type, DisasterType::Fire);
        assert_eq!(config.default_confidence, 0.85);
    }
}
