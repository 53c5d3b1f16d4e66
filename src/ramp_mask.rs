//! Ramp protection mask
//!
//! A [0, 1] field that is 1.0 on ramp cells and fades to 0.0 over the falloff
//! radius (Euclidean distance to the nearest ramp cell). Anything that changes
//! heights after ramps are baked goes through [`MaskedHeightWriter`], which only
//! holds a shared borrow of the mask and scales every change by `1 - mask`.

use crate::config::MaskConfig;
use crate::error::Result;
use crate::grid::{Grid, Pos};
use crate::tilemap::Tilemap;

/// Read-only protection field for one generation pass
#[derive(Clone, Debug, PartialEq)]
pub struct RampMask {
    values: Tilemap<f32>,
    protection_threshold: f32,
}

/// Smooth falloff: 1 at distance 0, 0 at and beyond the radius.
pub fn falloff(distance: f32, radius: f32) -> f32 {
    if distance <= 0.0 {
        return 1.0;
    }
    if distance >= radius {
        return 0.0;
    }
    let t = distance / radius;
    1.0 - t * t * (3.0 - 2.0 * t)
}

/// Compute the mask from the ramp flags currently in the grid.
pub fn compute_ramp_mask(grid: &Grid, config: &MaskConfig) -> RampMask {
    let radius = config.falloff_radius;
    let reach = radius.ceil() as i64;
    let mut values = Tilemap::new_with(grid.cols(), grid.rows(), 0.0f32);

    let ramp_cells: Vec<Pos> = grid
        .iter()
        .filter(|(_, _, cell)| cell.is_ramp())
        .map(|(x, y, _)| (x, y))
        .collect();

    // Stamp a falloff disc around every ramp cell, keeping the max. Since the
    // falloff is decreasing, the max is the falloff of the nearest ramp cell.
    for &(rx, ry) in &ramp_cells {
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let x = rx as i64 + dx;
                let y = ry as i64 + dy;
                if !values.in_bounds(x, y) {
                    continue;
                }
                let d = ((dx * dx + dy * dy) as f32).sqrt();
                let v = falloff(d, radius);
                if v <= 0.0 {
                    continue;
                }
                let slot = values.get_mut(x as usize, y as usize);
                if v > *slot {
                    *slot = v;
                }
            }
        }
    }

    tracing::debug!(ramp_cells = ramp_cells.len(), radius, "computed ramp mask");

    RampMask {
        values,
        protection_threshold: config.protection_threshold,
    }
}

impl RampMask {
    /// Mask value at a cell; 0.0 outside the grid.
    pub fn value(&self, x: usize, y: usize) -> f32 {
        self.values.try_get(x, y).copied().unwrap_or(0.0)
    }

    /// Whether a cell is fully protected from height changes.
    pub fn is_protected(&self, x: usize, y: usize) -> bool {
        self.value(x, y) > self.protection_threshold
    }

    /// The change a height-modifying feature is allowed to make at a cell.
    pub fn protected_change(&self, x: usize, y: usize, requested: f32) -> f32 {
        if self.is_protected(x, y) {
            return 0.0;
        }
        requested * (1.0 - self.value(x, y))
    }

    pub fn values(&self) -> &Tilemap<f32> {
        &self.values
    }

    /// Number of cells with any protection
    pub fn covered_cells(&self) -> usize {
        self.values.iter().filter(|(_, _, &v)| v > 0.0).count()
    }
}

/// The only way cosmetic passes may write heights once ramps exist
pub struct MaskedHeightWriter<'a> {
    grid: &'a mut Grid,
    mask: &'a RampMask,
}

impl<'a> MaskedHeightWriter<'a> {
    pub fn new(grid: &'a mut Grid, mask: &'a RampMask) -> Self {
        Self { grid, mask }
    }

    /// Read-only view of the grid being edited.
    pub fn grid(&self) -> &Grid {
        self.grid
    }

    /// Apply a requested height change, scaled by the mask and clamped to the
    /// cell's level band. Returns the change actually applied.
    pub fn apply_delta(&mut self, x: usize, y: usize, requested: f32) -> Result<f32> {
        let allowed = self.mask.protected_change(x, y, requested);
        let levels = *self.grid.levels();
        let cell = self.grid.cell_mut(x, y)?;
        if allowed == 0.0 || cell.is_ramp() {
            return Ok(0.0);
        }

        let before = cell.height;
        cell.height = levels.clamp_height(cell.level, before + allowed);
        Ok(cell.height - before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellFlags;

    fn grid_with_ramp_column(x: usize) -> Grid {
        let mut grid = Grid::create(30, 10);
        for y in 0..10 {
            grid.cell_mut(x, y).unwrap().mark(CellFlags::RAMP | CellFlags::ROAD);
        }
        grid
    }

    #[test]
    fn test_falloff_shape() {
        assert_eq!(falloff(0.0, 6.0), 1.0);
        assert_eq!(falloff(6.0, 6.0), 0.0);
        assert_eq!(falloff(9.0, 6.0), 0.0);
        assert!(falloff(1.0, 6.0) > falloff(2.0, 6.0));
    }

    #[test]
    fn test_ramp_cells_are_one_and_far_cells_zero() {
        let grid = grid_with_ramp_column(5);
        let config = MaskConfig::default();
        let mask = compute_ramp_mask(&grid, &config);

        for (x, y, cell) in grid.iter() {
            let d = (x as f32 - 5.0).abs();
            if cell.is_ramp() {
                assert_eq!(mask.value(x, y), 1.0);
            } else if d >= config.falloff_radius {
                assert_eq!(mask.value(x, y), 0.0, "cell ({}, {})", x, y);
            } else {
                assert!(mask.value(x, y) > 0.0 && mask.value(x, y) < 1.0);
            }
        }
    }

    #[test]
    fn test_protected_change() {
        let grid = grid_with_ramp_column(5);
        let mask = compute_ramp_mask(&grid, &MaskConfig::default());

        assert_eq!(mask.protected_change(5, 3, 10.0), 0.0);
        assert_eq!(mask.protected_change(20, 3, 10.0), 10.0);

        let near = mask.protected_change(7, 3, 10.0);
        assert!(near > 0.0 && near < 10.0);
        assert!((near - 10.0 * (1.0 - mask.value(7, 3))).abs() < 1e-5);
    }

    #[test]
    fn test_cells_above_threshold_get_no_change() {
        let mut grid = grid_with_ramp_column(5);
        let config = MaskConfig {
            falloff_radius: 10.0,
            ..MaskConfig::default()
        };
        let mask = compute_ramp_mask(&grid, &config);

        // One cell off the ramp: not a ramp cell, but above the threshold
        assert!(!grid.cell(6, 3).is_ramp());
        let beside = mask.value(6, 3);
        assert!(beside > 0.95 && beside < 1.0, "mask {}", beside);
        assert!(mask.is_protected(6, 3));
        assert_eq!(mask.protected_change(6, 3, 10.0), 0.0);

        // Two cells off it the change is scaled, not blocked
        assert!(!mask.is_protected(7, 3));
        assert!(mask.protected_change(7, 3, 10.0) > 0.0);

        let mut writer = MaskedHeightWriter::new(&mut grid, &mask);
        assert_eq!(writer.apply_delta(6, 3, 10.0).unwrap(), 0.0);
        assert!(writer.apply_delta(7, 3, 10.0).unwrap() > 0.0);
        assert_eq!(grid.cell(6, 3).height, 0.0);
    }

    #[test]
    fn test_writer_respects_mask_and_level_band() {
        let mut grid = grid_with_ramp_column(5);
        let mask = compute_ramp_mask(&grid, &MaskConfig::default());
        let max_var = grid.levels().max_variation;

        let mut writer = MaskedHeightWriter::new(&mut grid, &mask);
        assert_eq!(writer.apply_delta(5, 0, 50.0).unwrap(), 0.0);

        let applied = writer.apply_delta(20, 0, 1000.0).unwrap();
        assert!((applied - max_var).abs() < 1e-4);

        assert!(writer.apply_delta(40, 0, 1.0).is_err());
        assert_eq!(grid.cell(5, 0).height, 0.0);
    }
}
