//! Level assignment
//!
//! Quantizes fractal noise into discrete levels, cleans up single-cell
//! speckles with a majority filter, and classifies each cell (water, playable,
//! visual-only, boundary). Plateau surface detail is added at the end of the
//! pass through the ramp mask so ramps stay untouched.

use std::collections::BTreeMap;

use noise::{NoiseFn, Perlin, Seedable};

use crate::config::LevelSettings;
use crate::error::Result;
use crate::grid::{CellFlags, Grid};
use crate::ramp_mask::MaskedHeightWriter;
use crate::tilemap::{Tilemap, NEIGHBORS_8};

/// Neighbours (of 8) that must agree before a cell is flipped to their level
const MAJORITY: usize = 5;

/// Frequency of the plateau detail noise, in cycles per cell
const DETAIL_FREQUENCY: f64 = 0.15;

/// Cell counts per level after assignment
#[derive(Clone, Debug, Default)]
pub struct LevelStats {
    pub counts: BTreeMap<i32, usize>,
    pub boundary_cells: usize,
}

/// Fractal Brownian motion over a 2D noise function, normalized to [-1, 1].
fn fbm(noise: &impl NoiseFn<f64, 2>, x: f64, y: f64, octaves: u32) -> f64 {
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    let mut max_value = 0.0;

    for _ in 0..octaves.max(1) {
        total += amplitude * noise.get([x * frequency, y * frequency]);
        max_value += amplitude;
        amplitude *= 0.5;
        frequency *= 2.0;
    }

    total / max_value
}

/// Quantize noise into a level map (no smoothing).
pub fn generate_level_map(cols: usize, rows: usize, settings: &LevelSettings, seed: u64) -> Tilemap<i32> {
    let noise = Perlin::new(1).set_seed(seed as u32);
    let mut raw = Tilemap::new_with(cols, rows, 0.0f64);

    let scale = cols.max(rows).max(1) as f64;
    let mut min_v = f64::MAX;
    let mut max_v = f64::MIN;
    for (x, y, v) in raw.iter_mut() {
        let nx = x as f64 / scale * settings.frequency;
        let ny = y as f64 / scale * settings.frequency;
        *v = fbm(&noise, nx, ny, settings.octaves);
        min_v = min_v.min(*v);
        max_v = max_v.max(*v);
    }

    // Stretch to the full [0, 1] range so every level is represented
    let range = (max_v - min_v).max(1e-9);
    let span = (settings.max_level - settings.min_level + 1) as f64;

    raw.map(|&v| {
        let t = (v - min_v) / range;
        let level = settings.min_level + (t * span).floor() as i32;
        level.min(settings.max_level)
    })
}

/// One majority-filter pass. Returns the number of cells that changed.
pub fn smooth_levels(levels: &mut Tilemap<i32>) -> usize {
    let source = levels.clone();
    let mut changed = 0;

    for y in 0..source.height {
        for x in 0..source.width {
            let mut tally: BTreeMap<i32, usize> = BTreeMap::new();
            for &(dx, dy) in NEIGHBORS_8.iter() {
                if let Some((nx, ny)) = source.offset(x, y, dx, dy) {
                    *tally.entry(*source.get(nx, ny)).or_insert(0) += 1;
                }
            }

            let current = *source.get(x, y);
            if let Some((&level, _)) = tally.iter().find(|(&l, &n)| n >= MAJORITY && l != current) {
                levels.set(x, y, level);
                changed += 1;
            }
        }
    }

    changed
}

/// Write a level map into the grid, classifying every cell.
pub fn apply_level_map(grid: &mut Grid, level_map: &Tilemap<i32>, boundary_margin: usize) -> Result<LevelStats> {
    let mut stats = LevelStats::default();
    let cols = grid.cols();
    let rows = grid.rows();

    for (x, y, &level) in level_map.iter() {
        grid.assign_level(x, y, level)?;
        *stats.counts.entry(level).or_insert(0) += 1;

        let on_edge = x < boundary_margin
            || y < boundary_margin
            || x + boundary_margin >= cols
            || y + boundary_margin >= rows;
        if on_edge {
            grid.cell_mut(x, y)?.mark(CellFlags::BOUNDARY);
            stats.boundary_cells += 1;
        }
    }

    Ok(stats)
}

/// Levels phase: noise, smoothing, classification.
pub fn assign_levels(grid: &mut Grid, settings: &LevelSettings, boundary_margin: usize, seed: u64) -> Result<LevelStats> {
    let mut level_map = generate_level_map(grid.cols(), grid.rows(), settings, seed);

    for pass in 0..settings.smoothing_passes {
        let changed = smooth_levels(&mut level_map);
        tracing::debug!(pass, changed, "level smoothing");
        if changed == 0 {
            break;
        }
    }

    let stats = apply_level_map(grid, &level_map, boundary_margin)?;
    for (level, count) in &stats.counts {
        tracing::info!(
            "  Level {:>2} ({}): {} cells",
            level,
            grid.levels().describe(*level),
            count
        );
    }
    Ok(stats)
}

/// Add plateau detail noise through the ramp mask. Returns the number of cells changed.
pub fn apply_surface_detail(writer: &mut MaskedHeightWriter<'_>, seed: u64) -> Result<usize> {
    let noise = Perlin::new(1).set_seed(seed as u32);
    let amplitude = writer.grid().levels().max_variation;
    let cols = writer.grid().cols();
    let rows = writer.grid().rows();
    let mut changed = 0;

    for y in 0..rows {
        for x in 0..cols {
            let cell = writer.grid().cell(x, y);
            if cell.is_water() || cell.is_road() {
                continue;
            }

            let n = fbm(&noise, x as f64 * DETAIL_FREQUENCY, y as f64 * DETAIL_FREQUENCY, 3) as f32;
            if writer.apply_delta(x, y, n * amplitude)? != 0.0 {
                changed += 1;
            }
        }
    }

    Ok(changed)
}
