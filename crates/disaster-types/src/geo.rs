//! Geographic primitives: GeoJSON-shaped geometries, bounding boxes and
//! the region-of-interest that scopes an ingestion run.
//!
//! All coordinates are `[longitude, latitude]` in degrees.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DisasterError;

/// A `[lon, lat]` position.
pub type Position = [f64; 2];

/// Default region: the Indian subcontinent.
pub const DEFAULT_BBOX: &str = "68.0,8.0,97.0,37.0";

/// Longest lookback accepted for ingestion windows and listings (100 years).
pub const MAX_LOOKBACK_DAYS: u32 = 36_500;

/// Instant `days` days before `now`.
///
/// Rejects lookbacks above [`MAX_LOOKBACK_DAYS`] and never overflows.
pub fn lookback_start(now: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, DisasterError> {
    if days > MAX_LOOKBACK_DAYS {
        return Err(DisasterError::InvalidInput(format!(
            "lookback of {} days exceeds the maximum of {}",
            days, MAX_LOOKBACK_DAYS
        )));
    }
    now.checked_sub_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| {
            DisasterError::InvalidInput(format!("lookback of {} days is out of range", days))
        })
}

fn position_in_range(p: &Position) -> bool {
    p[0].is_finite()
        && p[1].is_finite()
        && (-180.0..=180.0).contains(&p[0])
        && (-90.0..=90.0).contains(&p[1])
}

/// GeoJSON geometry subset used for event locations.
///
/// Serializes as `{"type": "Point", "coordinates": [lon, lat]}` or
/// `{"type": "Polygon", "coordinates": [[[lon, lat], ...]]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    Polygon(Vec<Vec<Position>>),
}

impl Geometry {
    /// Point geometry at the given longitude and latitude.
    pub fn point(lon: f64, lat: f64) -> Self {
        Geometry::Point([lon, lat])
    }

    /// Axis-aligned rectangle as a closed single-ring polygon.
    ///
    /// Ring order is counter-clockwise starting at the south-west corner.
    pub fn rectangle(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Geometry::Polygon(vec![vec![
            [min_lon, min_lat],
            [max_lon, min_lat],
            [max_lon, max_lat],
            [min_lon, max_lat],
            [min_lon, min_lat],
        ]])
    }

    /// Check coordinate ranges and ring structure.
    ///
    /// A polygon needs at least one ring; every ring needs four or more
    /// positions and must be closed.
    pub fn validate(&self) -> Result<(), DisasterError> {
        match self {
            Geometry::Point(p) => {
                if !position_in_range(p) {
                    return Err(DisasterError::InvalidGeometry(format!(
                        "point {:?} is outside lon/lat range",
                        p
                    )));
                }
            }
            Geometry::Polygon(rings) => {
                if rings.is_empty() {
                    return Err(DisasterError::InvalidGeometry(
                        "polygon has no rings".to_string(),
                    ));
                }
                for (i, ring) in rings.iter().enumerate() {
                    if ring.len() < 4 {
                        return Err(DisasterError::InvalidGeometry(format!(
                            "ring {} has {} positions, need at least 4",
                            i,
                            ring.len()
                        )));
                    }
                    if let Some(bad) = ring.iter().find(|p| !position_in_range(p)) {
                        return Err(DisasterError::InvalidGeometry(format!(
                            "ring {} position {:?} is outside lon/lat range",
                            i, bad
                        )));
                    }
                    if ring.first() != ring.last() {
                        return Err(DisasterError::InvalidGeometry(format!(
                            "ring {} is not closed",
                            i
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Smallest box covering the geometry. Degenerate for points.
    ///
    /// Returns `None` for a polygon without positions.
    pub fn envelope(&self) -> Option<BoundingBox> {
        match self {
            Geometry::Point(p) => Some(BoundingBox {
                min_lon: p[0],
                min_lat: p[1],
                max_lon: p[0],
                max_lat: p[1],
            }),
            Geometry::Polygon(rings) => {
                let mut positions = rings.iter().flatten();
                let first = positions.next()?;
                let mut env = BoundingBox {
                    min_lon: first[0],
                    min_lat: first[1],
                    max_lon: first[0],
                    max_lat: first[1],
                };
                for p in positions {
                    env.min_lon = env.min_lon.min(p[0]);
                    env.min_lat = env.min_lat.min(p[1]);
                    env.max_lon = env.max_lon.max(p[0]);
                    env.max_lat = env.max_lat.max(p[1]);
                }
                Some(env)
            }
        }
    }

    /// Centre of the envelope.
    pub fn centroid(&self) -> Option<Position> {
        self.envelope().map(|e| e.center())
    }

    /// First position of the outer ring, or the point itself.
    pub fn first_vertex(&self) -> Option<Position> {
        match self {
            Geometry::Point(p) => Some(*p),
            Geometry::Polygon(rings) => rings.first().and_then(|r| r.first()).copied(),
        }
    }
}

/// Axis-aligned lon/lat rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a validated bounding box.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, DisasterError> {
        let bbox = Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Parse `"min_lon,min_lat,max_lon,max_lat"`.
    pub fn parse(s: &str) -> Result<Self, DisasterError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(DisasterError::InvalidInput(format!(
                "bbox must have 4 comma-separated values, got {}",
                parts.len()
            )));
        }
        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part.parse::<f64>().map_err(|_| {
                DisasterError::InvalidInput(format!("bbox value '{}' is not a number", part))
            })?;
        }
        Self::new(values[0], values[1], values[2], values[3])
    }

    /// Min strictly below max on both axes, within lon/lat range.
    pub fn validate(&self) -> Result<(), DisasterError> {
        if !position_in_range(&[self.min_lon, self.min_lat])
            || !position_in_range(&[self.max_lon, self.max_lat])
        {
            return Err(DisasterError::InvalidInput(format!(
                "bbox {} is outside lon/lat range",
                self
            )));
        }
        if self.min_lon >= self.max_lon || self.min_lat >= self.max_lat {
            return Err(DisasterError::InvalidInput(format!(
                "bbox {} must have min < max on both axes",
                self
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn center(&self) -> Position {
        [
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        ]
    }

    /// Inclusive containment test.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// True if the two boxes share at least one point (edges count).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min_lon: 68.0,
            min_lat: 8.0,
            max_lon: 97.0,
            max_lat: 37.0,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl FromStr for BoundingBox {
    type Err = DisasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Geographic and temporal scope of one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub bbox: BoundingBox,
    pub lookback_days: u32,
}

impl RegionOfInterest {
    /// Create a region, rejecting an invalid box or a lookback outside
    /// `1..=MAX_LOOKBACK_DAYS`.
    pub fn new(bbox: BoundingBox, lookback_days: u32) -> Result<Self, DisasterError> {
        bbox.validate()?;
        if lookback_days == 0 {
            return Err(DisasterError::InvalidInput(
                "lookback_days must be at least 1".to_string(),
            ));
        }
        if lookback_days > MAX_LOOKBACK_DAYS {
            return Err(DisasterError::InvalidInput(format!(
                "lookback_days must be at most {}, got {}",
                MAX_LOOKBACK_DAYS, lookback_days
            )));
        }
        Ok(Self {
            bbox,
            lookback_days,
        })
    }

    /// Time window `(start, end)` ending at `now`.
    pub fn window(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), DisasterError> {
        Ok((lookback_start(now, self.lookback_days)?, now))
    }

    /// Key that concurrent runs over the same region and window share.
    pub fn run_key(&self) -> String {
        format!("{}@{}d", self.bbox, self.lookback_days)
    }
}
