//! Point of Interest placement
//!
//! POIs are rolled by type, assigned an intended level from the type's
//! preference, then snapped to the nearest valid cell of that level. Two POIs
//! on the same level never sit closer than the minimum spacing.

use std::collections::BTreeMap;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::{PoiConfig, PoiWeights};
use crate::error::{Result, TerrainError};
use crate::grid::{Cell, Grid, Pos};

/// Stable POI handle; POIs live in a plain `Vec` indexed by id
pub type PoiId = u32;

/// Kind of landmark
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoiType {
    Town,
    Dungeon,
    Exit,
    Portal,
}

impl PoiType {
    pub fn all() -> &'static [Self] {
        &[Self::Town, Self::Dungeon, Self::Exit, Self::Portal]
    }

    fn weight(self, weights: &PoiWeights) -> f32 {
        match self {
            PoiType::Town => weights.town,
            PoiType::Dungeon => weights.dungeon,
            PoiType::Exit => weights.exit,
            PoiType::Portal => weights.portal,
        }
    }

    /// Levels this type would like to sit on, most preferred first.
    pub fn preferred_levels(self, max_walkable: i32) -> Vec<i32> {
        match self {
            // Towns on the ground, spilling onto the first plateau
            PoiType::Town => vec![0, 1],
            // Dungeons up on the highest plateaus
            PoiType::Dungeon => (0..=max_walkable).rev().collect(),
            PoiType::Exit => vec![0],
            PoiType::Portal => (1..=max_walkable).chain(std::iter::once(0)).collect(),
        }
    }

    pub fn map_char(self) -> char {
        match self {
            PoiType::Town => 'T',
            PoiType::Dungeon => 'D',
            PoiType::Exit => 'E',
            PoiType::Portal => 'P',
        }
    }
}

impl std::fmt::Display for PoiType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoiType::Town => write!(f, "town"),
            PoiType::Dungeon => write!(f, "dungeon"),
            PoiType::Exit => write!(f, "exit"),
            PoiType::Portal => write!(f, "portal"),
        }
    }
}

/// A placed landmark
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoiNode {
    pub id: PoiId,
    pub x: usize,
    pub y: usize,
    pub level: i32,
    pub poi_type: PoiType,
}

impl PoiNode {
    pub fn new(id: PoiId, x: usize, y: usize, level: i32, poi_type: PoiType) -> Self {
        Self {
            id,
            x,
            y,
            level,
            poi_type,
        }
    }

    pub fn pos(&self) -> Pos {
        (self.x, self.y)
    }

    pub fn distance_to(&self, other: &PoiNode) -> f32 {
        let dx = self.x as f32 - other.x as f32;
        let dy = self.y as f32 - other.y as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Outcome of a placement run. Fewer POIs than requested is not an error.
#[derive(Clone, Debug)]
pub struct PlacementReport {
    pub pois: Vec<PoiNode>,
    pub requested: usize,
    pub placed: usize,
}

/// Whether a cell can host a POI
pub fn is_valid_poi_cell(cell: &Cell) -> bool {
    cell.is_passable() && cell.is_playable() && !cell.is_water()
}

/// Nearest valid cell on `level` within `radius` of (x, y), ties broken by row then column.
pub fn snap_to_level(grid: &Grid, x: usize, y: usize, level: i32, radius: usize) -> Option<Pos> {
    let r = radius as i64;
    let mut best: Option<(i64, usize, usize)> = None;

    for dy in -r..=r {
        for dx in -r..=r {
            let d2 = dx * dx + dy * dy;
            if d2 > r * r {
                continue;
            }
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if !grid.in_bounds(nx, ny) {
                continue;
            }
            let (nx, ny) = (nx as usize, ny as usize);
            let cell = grid.cell(nx, ny);
            if cell.level != level || !is_valid_poi_cell(cell) {
                continue;
            }
            let candidate = (d2, ny, nx);
            if best.map_or(true, |b| candidate < b) {
                best = Some(candidate);
            }
        }
    }

    best.map(|(_, y, x)| (x, y))
}

/// Valid POI cells per level.
pub fn valid_cells_by_level(grid: &Grid) -> BTreeMap<i32, usize> {
    let mut counts = BTreeMap::new();
    for (_, _, cell) in grid.iter() {
        if is_valid_poi_cell(cell) {
            *counts.entry(cell.level).or_insert(0) += 1;
        }
    }
    counts
}

/// Rough upper bound on how many POIs fit with the given same-level spacing.
///
/// Uses hexagonal packing density per level plus one for edge effects.
pub fn placement_capacity(grid: &Grid, min_spacing: f32) -> usize {
    let area_per_poi = (3.0f32.sqrt() / 2.0 * min_spacing * min_spacing).max(1.0);
    valid_cells_by_level(grid)
        .values()
        .map(|&cells| (cells as f32 / area_per_poi).floor() as usize + 1)
        .sum()
}

fn roll_type(rng: &mut ChaCha8Rng, weights: &PoiWeights) -> PoiType {
    let total: f32 = PoiType::all().iter().map(|t| t.weight(weights).max(0.0)).sum();
    if total <= 0.0 {
        return PoiType::Town;
    }
    let mut roll = rng.gen_range(0.0..total);
    for &t in PoiType::all() {
        let w = t.weight(weights).max(0.0);
        if roll < w {
            return t;
        }
        roll -= w;
    }
    PoiType::Town
}

fn spacing_ok(pois: &[PoiNode], x: usize, y: usize, level: i32, min_spacing: f32) -> bool {
    pois.iter().filter(|p| p.level == level).all(|p| {
        let dx = p.x as f32 - x as f32;
        let dy = p.y as f32 - y as f32;
        (dx * dx + dy * dy).sqrt() >= min_spacing
    })
}

/// Place up to `config.count` POIs.
///
/// Fails with `PlacementInfeasible` only when the spacing makes the requested
/// count impossible outright; otherwise POIs that can't find a spot after the
/// relocation attempts are skipped and the report says how many were placed.
pub fn place_pois(grid: &Grid, config: &PoiConfig, rng: &mut ChaCha8Rng) -> Result<PlacementReport> {
    let capacity = placement_capacity(grid, config.min_spacing);
    if config.count > capacity {
        return Err(TerrainError::PlacementInfeasible {
            requested: config.count,
            capacity,
            min_spacing: config.min_spacing,
        });
    }

    let available = valid_cells_by_level(grid);
    let max_walkable = grid.levels().max_walkable_level;
    let mut pois: Vec<PoiNode> = Vec::with_capacity(config.count);

    for _ in 0..config.count {
        let poi_type = roll_type(rng, &config.weights);
        let mut levels: Vec<i32> = poi_type
            .preferred_levels(max_walkable)
            .into_iter()
            .filter(|l| available.contains_key(l))
            .collect();
        if levels.is_empty() {
            levels = available.keys().copied().collect();
        }

        let mut placed = None;
        for attempt in 0..config.relocation_attempts.max(1) {
            // Walk down the preference list as attempts run out
            let level = levels[(attempt * levels.len()) / config.relocation_attempts.max(1)];
            let x = rng.gen_range(0..grid.cols());
            let y = rng.gen_range(0..grid.rows());

            if let Some((sx, sy)) = snap_to_level(grid, x, y, level, config.snap_radius) {
                if spacing_ok(&pois, sx, sy, level, config.min_spacing) {
                    placed = Some((sx, sy, level));
                    break;
                }
            }
        }

        match placed {
            Some((x, y, level)) => {
                let id = pois.len() as PoiId;
                tracing::debug!(id, x, y, level, %poi_type, "placed POI");
                pois.push(PoiNode::new(id, x, y, level, poi_type));
            }
            None => tracing::warn!(%poi_type, "no room for POI after {} attempts", config.relocation_attempts),
        }
    }

    tracing::info!("  Placed {} of {} POIs", pois.len(), config.count);
    Ok(PlacementReport {
        placed: pois.len(),
        requested: config.count,
        pois,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellFlags;
    use rand::SeedableRng;

    /// Left half ground, right half level 1, one-cell boundary.
    fn two_level_grid(cols: usize, rows: usize) -> Grid {
        let mut grid = Grid::create(cols, rows);
        for y in 0..rows {
            for x in 0..cols {
                let level = if x < cols / 2 { 0 } else { 1 };
                grid.assign_level(x, y, level).unwrap();
                if x == 0 || y == 0 || x == cols - 1 || y == rows - 1 {
                    grid.cell_mut(x, y).unwrap().mark(CellFlags::BOUNDARY);
                }
            }
        }
        grid
    }

    #[test]
    fn test_snap_finds_nearest_valid_cell() {
        let grid = two_level_grid(20, 10);
        assert_eq!(snap_to_level(&grid, 5, 5, 1, 8), Some((10, 5)));
        assert_eq!(snap_to_level(&grid, 12, 5, 1, 8), Some((12, 5)));
        // Boundary cells are never valid
        assert_eq!(snap_to_level(&grid, 0, 0, 0, 2), Some((1, 1)));
        assert_eq!(snap_to_level(&grid, 1, 5, 1, 3), None);
    }

    #[test]
    fn test_spacing_respected_per_level() {
        let grid = two_level_grid(80, 80);
        let config = PoiConfig {
            count: 12,
            min_spacing: 10.0,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let report = place_pois(&grid, &config, &mut rng).unwrap();

        assert_eq!(report.requested, 12);
        assert_eq!(report.placed, report.pois.len());
        assert!(report.placed > 0);

        for (i, a) in report.pois.iter().enumerate() {
            assert_eq!(a.id as usize, i);
            let cell = grid.cell(a.x, a.y);
            assert_eq!(cell.level, a.level);
            assert!(is_valid_poi_cell(cell));
            for b in &report.pois[i + 1..] {
                if a.level == b.level {
                    assert!(a.distance_to(b) >= 10.0);
                }
            }
        }
    }

    #[test]
    fn test_infeasible_request_fails() {
        let grid = two_level_grid(20, 20);
        let config = PoiConfig {
            count: 50,
            min_spacing: 15.0,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            place_pois(&grid, &config, &mut rng),
            Err(TerrainError::PlacementInfeasible { requested: 50, .. })
        ));
    }

    #[test]
    fn test_placement_is_deterministic() {
        let grid = two_level_grid(60, 60);
        let config = PoiConfig::default();
        let a = place_pois(&grid, &config, &mut ChaCha8Rng::seed_from_u64(9)).unwrap();
        let b = place_pois(&grid, &config, &mut ChaCha8Rng::seed_from_u64(9)).unwrap();
        assert_eq!(a.pois, b.pois);
    }
}
