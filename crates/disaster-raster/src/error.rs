//! Error types for raster processing.

use thiserror::Error;

/// Errors from spectral index computation and vectorization.
#[derive(Debug, Error)]
pub enum RasterError {
    /// Band grids differ in shape
    #[error("Band shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    /// Flat band data does not fill the declared grid
    #[error("Invalid band data: {0}")]
    InvalidBand(#[from] ndarray::ShapeError),

    /// Geo-transform cannot map cells to coordinates
    #[error("Invalid geo-transform: {0}")]
    InvalidTransform(String),

    /// Vectorizer configuration out of range
    #[error("Invalid vectorizer config: {0}")]
    InvalidConfig(String),
}
