//! Mask vectorizer.
//!
//! Extracts 4-connected components of true cells and reduces each to its
//! bounding polygon in lon/lat. A component of a single cell becomes a
//! point at the cell centre.
//!
//! The number of cells labelled is capped by [`VectorizeConfig::max_cells`]:
//! the mask is first coarsened by an integer factor with block-OR (a
//! coarse cell is set when any fine cell under it is set) so the working
//! grid fits the budget. Labelling buffers are sized by the working grid.

use std::collections::VecDeque;

use disaster_types::{BoundingBox, Geometry};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RasterError;

/// Metres per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Maps grid cells to geographic coordinates.
///
/// Row 0 is the northern edge; rows increase southward, columns eastward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// Longitude of the western edge
    pub origin_lon: f64,
    /// Latitude of the northern edge
    pub origin_lat: f64,
    /// Cell width in degrees
    pub pixel_width: f64,
    /// Cell height in degrees
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Transform that spreads a `rows x cols` grid evenly over `bbox`.
    pub fn from_bbox(bbox: &BoundingBox, rows: usize, cols: usize) -> Result<Self, RasterError> {
        if rows == 0 || cols == 0 {
            return Err(RasterError::InvalidTransform(format!(
                "grid {}x{} has no cells",
                rows, cols
            )));
        }
        let transform = Self {
            origin_lon: bbox.min_lon,
            origin_lat: bbox.max_lat,
            pixel_width: bbox.width() / cols as f64,
            pixel_height: bbox.height() / rows as f64,
        };
        transform.validate()?;
        Ok(transform)
    }

    pub fn validate(&self) -> Result<(), RasterError> {
        let sizes_ok = self.pixel_width.is_finite()
            && self.pixel_height.is_finite()
            && self.pixel_width > 0.0
            && self.pixel_height > 0.0;
        if !sizes_ok || !self.origin_lon.is_finite() || !self.origin_lat.is_finite() {
            return Err(RasterError::InvalidTransform(format!("{:?}", self)));
        }
        Ok(())
    }

    /// Approximate ground size of one cell along the meridian.
    pub fn pixel_size_m(&self) -> f64 {
        self.pixel_height * METERS_PER_DEGREE
    }

    /// Longitude of the western edge of column `col`.
    ///
    /// Clamped to the valid range so a grid ending on the antimeridian does
    /// not drift past it.
    fn lon_at(&self, col: f64) -> f64 {
        (self.origin_lon + col * self.pixel_width).clamp(-180.0, 180.0)
    }

    /// Latitude of the northern edge of row `row`, clamped to the poles.
    fn lat_at(&self, row: f64) -> f64 {
        (self.origin_lat - row * self.pixel_height).clamp(-90.0, 90.0)
    }
}

/// Budgets and scale for one vectorization pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorizeConfig {
    /// Target ground resolution in metres per working cell
    pub scale_m: f64,
    /// Maximum number of cells in the working grid
    pub max_cells: usize,
    /// Component extraction stops after this many regions
    pub max_regions: usize,
}

impl Default for VectorizeConfig {
    fn default() -> Self {
        Self {
            scale_m: 500.0,
            max_cells: 100_000_000,
            max_regions: 10_000,
        }
    }
}

impl VectorizeConfig {
    pub fn validate(&self) -> Result<(), RasterError> {
        if self.max_cells == 0 {
            return Err(RasterError::InvalidConfig("max_cells must be > 0".into()));
        }
        if self.max_regions == 0 {
            return Err(RasterError::InvalidConfig("max_regions must be > 0".into()));
        }
        if self.scale_m.is_nan() || self.scale_m < 0.0 {
            return Err(RasterError::InvalidConfig(format!(
                "scale_m must be >= 0, got {}",
                self.scale_m
            )));
        }
        Ok(())
    }
}

/// One connected component reduced to a geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub geometry: Geometry,
    /// Working-grid cells in the component
    pub cell_count: usize,
}

/// Result of a vectorization pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vectorization {
    /// Regions in raster scan order of their first cell
    pub regions: Vec<Region>,
    /// Integer coarsening factor applied before labelling
    pub downsample_factor: usize,
    /// Cells in the working grid
    pub cells_processed: usize,
    /// True when extraction stopped at `max_regions`
    pub truncated: bool,
}

impl Vectorization {
    fn empty(downsample_factor: usize, cells_processed: usize) -> Self {
        Self {
            regions: Vec::new(),
            downsample_factor,
            cells_processed,
            truncated: false,
        }
    }
}

/// Connected-component vectorizer.
#[derive(Debug, Clone, Default)]
pub struct Vectorizer {
    config: VectorizeConfig,
}

impl Vectorizer {
    pub fn new(config: VectorizeConfig) -> Result<Self, RasterError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &VectorizeConfig {
        &self.config
    }

    /// Factor by which a `rows x cols` grid is coarsened.
    ///
    /// The larger of the scale-driven factor and the smallest factor that
    /// brings the working grid within `max_cells`.
    pub fn downsample_factor(&self, rows: usize, cols: usize, transform: &GeoTransform) -> usize {
        let native_m = transform.pixel_size_m();
        let scale_factor = if native_m > 0.0 && self.config.scale_m > native_m {
            (self.config.scale_m / native_m).ceil() as usize
        } else {
            1
        };

        let cells = rows.saturating_mul(cols);
        let mut factor = if cells > self.config.max_cells {
            ((cells as f64 / self.config.max_cells as f64).sqrt().ceil() as usize).max(1)
        } else {
            1
        };
        factor = factor.max(scale_factor).max(1);

        // Ceil rounding on narrow grids can still overshoot the budget.
        while rows.div_ceil(factor).saturating_mul(cols.div_ceil(factor)) > self.config.max_cells {
            factor += 1;
        }
        factor
    }

    /// Extract regions from `mask` placed on the ground by `transform`.
    ///
    /// An empty mask yields zero regions.
    pub fn vectorize(
        &self,
        mask: &Array2<bool>,
        transform: &GeoTransform,
    ) -> Result<Vectorization, RasterError> {
        transform.validate()?;
        let (rows, cols) = mask.dim();
        if rows == 0 || cols == 0 {
            return Ok(Vectorization::empty(1, 0));
        }

        let factor = self.downsample_factor(rows, cols, transform);
        let grid = if factor == 1 {
            mask.clone()
        } else {
            coarsen(mask, factor)
        };
        let (wrows, wcols) = grid.dim();
        let cells_processed = wrows * wcols;
        debug!(
            rows,
            cols,
            factor,
            working_cells = cells_processed,
            "Prepared working grid"
        );

        if !grid.iter().any(|&m| m) {
            return Ok(Vectorization::empty(factor, cells_processed));
        }

        let mut visited = Array2::<bool>::from_elem((wrows, wcols), false);
        let mut queue = VecDeque::new();
        let mut regions = Vec::new();
        let mut truncated = false;

        'scan: for r in 0..wrows {
            for c in 0..wcols {
                if !grid[(r, c)] || visited[(r, c)] {
                    continue;
                }
                if regions.len() >= self.config.max_regions {
                    truncated = true;
                    break 'scan;
                }

                let mut component = ComponentBounds::new(r, c);
                visited[(r, c)] = true;
                queue.push_back((r, c));

                while let Some((cr, cc)) = queue.pop_front() {
                    component.include(cr, cc);
                    for (nr, nc) in neighbours(cr, cc, wrows, wcols) {
                        if grid[(nr, nc)] && !visited[(nr, nc)] {
                            visited[(nr, nc)] = true;
                            queue.push_back((nr, nc));
                        }
                    }
                }

                regions.push(component.into_region(transform, factor, rows, cols));
            }
        }

        info!(
            regions = regions.len(),
            factor,
            truncated,
            "Vectorized mask"
        );

        Ok(Vectorization {
            regions,
            downsample_factor: factor,
            cells_processed,
            truncated,
        })
    }
}

/// Block-OR coarsening by an integer factor.
fn coarsen(mask: &Array2<bool>, factor: usize) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    let mut out = Array2::<bool>::from_elem((rows.div_ceil(factor), cols.div_ceil(factor)), false);
    for ((r, c), &set) in mask.indexed_iter() {
        if set {
            out[(r / factor, c / factor)] = true;
        }
    }
    out
}

/// 4-neighbourhood in fixed order: up, down, left, right.
fn neighbours(r: usize, c: usize, rows: usize, cols: usize) -> impl Iterator<Item = (usize, usize)> {
    let up = r.checked_sub(1).map(|nr| (nr, c));
    let down = (r + 1 < rows).then_some((r + 1, c));
    let left = c.checked_sub(1).map(|nc| (r, nc));
    let right = (c + 1 < cols).then_some((r, c + 1));
    [up, down, left, right].into_iter().flatten()
}

struct ComponentBounds {
    min_r: usize,
    max_r: usize,
    min_c: usize,
    max_c: usize,
    cells: usize,
}

impl ComponentBounds {
    fn new(r: usize, c: usize) -> Self {
        Self {
            min_r: r,
            max_r: r,
            min_c: c,
            max_c: c,
            cells: 0,
        }
    }

    fn include(&mut self, r: usize, c: usize) {
        self.min_r = self.min_r.min(r);
        self.max_r = self.max_r.max(r);
        self.min_c = self.min_c.min(c);
        self.max_c = self.max_c.max(c);
        self.cells += 1;
    }

    /// Convert working-grid bounds back to fine-grid edges, then to lon/lat.
    fn into_region(self, t: &GeoTransform, factor: usize, rows: usize, cols: usize) -> Region {
        let top = (self.min_r * factor) as f64;
        let bottom = ((self.max_r + 1) * factor).min(rows) as f64;
        let left = (self.min_c * factor) as f64;
        let right = ((self.max_c + 1) * factor).min(cols) as f64;

        let geometry = if self.cells == 1 {
            Geometry::point(t.lon_at((left + right) / 2.0), t.lat_at((top + bottom) / 2.0))
        } else {
            Geometry::rectangle(t.lon_at(left), t.lat_at(bottom), t.lon_at(right), t.lat_at(top))
        };

        Region {
            geometry,
            cell_count: self.cells,
        }
    }
}
