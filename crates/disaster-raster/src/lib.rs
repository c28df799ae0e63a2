//! # disaster-raster
//!
//! Turns multi-band imagery into candidate disaster regions.
//!
//! - [`spectral`]: normalized difference indices (NDWI) and threshold masks
//! - [`vectorize`]: connected-component extraction under a hard cell budget
//!
//! Both stages are pure and deterministic. NaN is the sentinel for cells
//! where an index is undefined; such cells never enter a mask.

pub mod error;
pub mod spectral;
pub mod vectorize;

pub use error::RasterError;
pub use spectral::{
    band_from_vec, mask_stats, normalized_difference, threshold_mask, MaskStats, SpectralIndex,
    DEFAULT_WATER_THRESHOLD,
};
pub use vectorize::{GeoTransform, Region, VectorizeConfig, Vectorization, Vectorizer};
