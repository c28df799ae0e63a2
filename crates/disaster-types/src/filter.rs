//! Structural event filter used by listing queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{DisasterType, Event};
use crate::geo::BoundingBox;

/// Filter for `find_all`. The default filter matches every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Keep events whose geometry envelope intersects this box
    #[serde(default)]
    pub bbox: Option<BoundingBox>,

    #[serde(default)]
    pub disaster_type: Option<DisasterType>,

    /// Keep events at or after this instant
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,

    /// Cap on returned events, applied after matching
    #[serde(default)]
    pub limit: Option<usize>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_type(mut self, disaster_type: DisasterType) -> Self {
        self.disaster_type = Some(disaster_type);
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `event` passes every configured predicate.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(t) = &self.disaster_type {
            if &event.disaster_type != t {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(bbox) = &self.bbox {
            match event.location.envelope() {
                Some(env) if env.intersects(bbox) => {}
                _ => return false,
            }
        }
        true
    }
}
