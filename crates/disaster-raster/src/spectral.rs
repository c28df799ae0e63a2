//! Spectral index engine.
//!
//! A normalized difference index maps two co-registered bands A and B to
//! `(A - B) / (A + B)` per cell. Where the denominator is zero, or either
//! operand is not finite, the cell holds `NaN` instead of a value.

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::error::RasterError;

/// NDWI cut-off above which a cell is classed as water.
pub const DEFAULT_WATER_THRESHOLD: f32 = 0.2;

/// Supported normalized difference indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpectralIndex {
    /// Normalized Difference Water Index: (green - nir) / (green + nir)
    #[default]
    Ndwi,
}

impl SpectralIndex {
    pub fn default_threshold(&self) -> f32 {
        match self {
            SpectralIndex::Ndwi => DEFAULT_WATER_THRESHOLD,
        }
    }
}

/// Build a band grid from row-major samples.
pub fn band_from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Array2<f32>, RasterError> {
    Ok(Array2::from_shape_vec((rows, cols), data)?)
}

/// Compute `(a - b) / (a + b)` cell by cell.
///
/// Undefined cells are `NaN`. Fails only when the shapes differ.
pub fn normalized_difference(a: &Array2<f32>, b: &Array2<f32>) -> Result<Array2<f32>, RasterError> {
    if a.dim() != b.dim() {
        return Err(RasterError::ShapeMismatch {
            left: a.dim(),
            right: b.dim(),
        });
    }

    Ok(Zip::from(a).and(b).map_collect(|&a, &b| {
        let sum = a + b;
        if !a.is_finite() || !b.is_finite() || sum == 0.0 {
            f32::NAN
        } else {
            (a - b) / sum
        }
    }))
}

/// Cells strictly above `threshold`. `NaN` cells are never set.
pub fn threshold_mask(index: &Array2<f32>, threshold: f32) -> Array2<bool> {
    // NaN comparisons are false, which keeps sentinel cells out.
    index.mapv(|v| v > threshold)
}

/// Cell counts for one index/mask pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MaskStats {
    pub total_cells: usize,
    pub true_cells: usize,
    /// Cells whose index value was the `NaN` sentinel
    pub excluded_cells: usize,
}

pub fn mask_stats(index: &Array2<f32>, mask: &Array2<bool>) -> MaskStats {
    MaskStats {
        total_cells: mask.len(),
        true_cells: mask.iter().filter(|&&m| m).count(),
        excluded_cells: index.iter().filter(|v| v.is_nan()).count(),
    }
}
