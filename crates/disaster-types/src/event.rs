//! Disaster event records.
//!
//! Events are immutable once stored. The store assigns `id`; an event
//! that has not been persisted yet carries `None`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DisasterError;
use crate::geo::Geometry;

/// Category of a disaster event.
///
/// Serialized as a lowercase label. Unknown labels are kept verbatim in
/// [`DisasterType::Other`] so new categories need no schema change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DisasterType {
    Flood,
    Fire,
    Landslide,
    Earthquake,
    Storm,
    Other(String),
}

impl DisasterType {
    pub fn as_str(&self) -> &str {
        match self {
            DisasterType::Flood => "flood",
            DisasterType::Fire => "fire",
            DisasterType::Landslide => "landslide",
            DisasterType::Earthquake => "earthquake",
            DisasterType::Storm => "storm",
            DisasterType::Other(label) => label,
        }
    }
}

impl From<String> for DisasterType {
    fn from(label: String) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "flood" => DisasterType::Flood,
            "fire" | "wildfire" => DisasterType::Fire,
            "landslide" => DisasterType::Landslide,
            "earthquake" => DisasterType::Earthquake,
            "storm" | "cyclone" => DisasterType::Storm,
            other => DisasterType::Other(other.to_string()),
        }
    }
}

impl From<&str> for DisasterType {
    fn from(label: &str) -> Self {
        DisasterType::from(label.to_string())
    }
}

impl From<DisasterType> for String {
    fn from(t: DisasterType) -> Self {
        t.as_str().to_string()
    }
}

impl FromStr for DisasterType {
    type Err = DisasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(DisasterError::InvalidInput(
                "disaster type must not be empty".to_string(),
            ));
        }
        Ok(DisasterType::from(s))
    }
}

impl fmt::Display for DisasterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected disaster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Store-assigned identifier (ULID string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub disaster_type: DisasterType,

    pub location: Geometry,

    /// Detection or ingestion instant
    pub timestamp: DateTime<Utc>,

    /// Detection confidence in `[0.0, 1.0]`
    pub confidence: f64,

    /// Provenance tag, e.g. "satellite"
    pub source: String,

    /// Text the embedding was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Event {
    pub fn new(
        disaster_type: DisasterType,
        location: Geometry,
        timestamp: DateTime<Utc>,
        confidence: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            disaster_type,
            location,
            timestamp,
            confidence,
            source: source.into(),
            description: None,
            image_url: None,
            embedding: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Structural checks that hold for every stored event.
    pub fn validate(&self) -> Result<(), DisasterError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(DisasterError::InvalidEvent(format!(
                "confidence must be within [0, 1], got {}",
                self.confidence
            )));
        }
        if self.source.trim().is_empty() {
            return Err(DisasterError::InvalidEvent("source is empty".to_string()));
        }
        self.location.validate()?;
        if let Some(embedding) = &self.embedding {
            if embedding.is_empty() || embedding.iter().any(|v| !v.is_finite()) {
                return Err(DisasterError::InvalidEvent(
                    "embedding must be non-empty and finite".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Text used to embed this event.
    ///
    /// Falls back to a generated sentence built from type, source,
    /// location and time when no description was recorded.
    pub fn embedding_text(&self) -> String {
        match &self.description {
            Some(d) if !d.trim().is_empty() => d.clone(),
            _ => describe(self),
        }
    }

    /// Copy without the internal fields (`id`, `embedding`) for API listings.
    pub fn public_view(&self) -> Self {
        Self {
            id: None,
            embedding: None,
            ..self.clone()
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Build the canonical description sentence for an event.
pub fn describe(event: &Event) -> String {
    let place = match event.location.centroid() {
        Some([lon, lat]) => format!("near longitude {:.4}, latitude {:.4}", lon, lat),
        None => "at an unknown location".to_string(),
    };
    let extent = match &event.location {
        Geometry::Polygon(_) => event
            .location
            .envelope()
            .map(|e| format!(" covering {:.3} by {:.3} degrees", e.width(), e.height()))
            .unwrap_or_default(),
        Geometry::Point(_) => String::new(),
    };
    format!(
        "{} detected by {} {}{} on {} with confidence {:.2}",
        event.disaster_type,
        event.source,
        place,
        extent,
        event.timestamp.format("%Y-%m-%d"),
        event.confidence
    )
}

/// Event paired with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEvent {
    #[serde(flatten)]
    pub event: Event,
    pub score: f32,
}
