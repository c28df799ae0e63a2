//! # disaster-types
//!
//! Shared domain types for the disaster-watch system.
//!
//! This crate defines the core data structures used throughout the system:
//! - Events: Immutable geo-tagged disaster records with optional embeddings
//! - Geometry: GeoJSON-shaped points and polygons, bounding boxes, regions of interest
//! - Filters: Structural predicates for listing queries
//! - Settings: Layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use disaster_types::{DisasterType, Event, Geometry};
//! use chrono::Utc;
//!
//! let event = Event::new(
//!     DisasterType::Flood,
//!     Geometry::point(78.6569, 22.9734),
//!     Utc::now(),
//!     0.85,
//!     "satellite",
//! );
//! assert!(event.validate().is_ok());
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod geo;

pub use config::{
    DetectSettings, EmbeddingProvider, EmbeddingSettings, IngestionSettings, LocationMode,
    QuerySettings, Settings, VectorBackend, VectorSettings,
};
pub use error::DisasterError;
pub use event::{describe, DisasterType, Event, ScoredEvent};
pub use filter::EventFilter;
pub use geo::{
    lookback_start, BoundingBox, Geometry, Position, RegionOfInterest, DEFAULT_BBOX,
    MAX_LOOKBACK_DAYS,
};
