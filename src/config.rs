//! Generation configuration
//!
//! All knobs for one generation pass, grouped by phase. Every section has
//! sensible defaults so a config file only needs to name what it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};
use crate::slope::CurveType;

/// Top-level configuration for a generation pass
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub grid: GridConfig,
    pub levels: LevelSettings,
    pub pois: PoiConfig,
    pub roads: RoadConfig,
    pub slope: SlopeConfig,
    pub costs: PathCosts,
    pub mask: MaskConfig,
}

/// Grid dimensions and physical cell size
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub cols: usize,
    pub rows: usize,
    /// Horizontal size of one cell in world units
    pub cell_size: f32,
    /// Cells from the edge that are flagged as world boundary
    pub boundary_margin: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cols: 128,
            rows: 128,
            cell_size: 100.0,
            boundary_margin: 2,
        }
    }
}

/// Level model and level-assignment settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelSettings {
    /// Height of a player character in world units
    pub character_height: f32,
    /// Overrides the derived 1.5 x character height
    pub max_height_difference: Option<f32>,
    /// Lowest level (negative = underwater)
    pub min_level: i32,
    /// Highest level, including visual-only peaks
    pub max_level: i32,
    /// Highest level a player can stand on
    pub max_walkable_level: i32,
    /// Plateau detail budget as a fraction of the max height difference
    pub max_variation_fraction: f32,
    /// Noise frequency across the whole grid
    pub frequency: f64,
    pub octaves: u32,
    /// Majority-filter passes after quantization
    pub smoothing_passes: usize,
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            character_height: 180.0,
            max_height_difference: None,
            min_level: -1,
            max_level: 3,
            max_walkable_level: 2,
            max_variation_fraction: 0.05,
            frequency: 3.0,
            octaves: 4,
            smoothing_passes: 2,
        }
    }
}

/// Relative weights for each POI type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoiWeights {
    pub town: f32,
    pub dungeon: f32,
    pub exit: f32,
    pub portal: f32,
}

impl Default for PoiWeights {
    fn default() -> Self {
        Self {
            town: 0.4,
            dungeon: 0.3,
            exit: 0.2,
            portal: 0.1,
        }
    }
}

/// POI placement settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoiConfig {
    pub count: usize,
    /// Minimum distance in cells between two POIs on the same level
    pub min_spacing: f32,
    pub weights: PoiWeights,
    /// Random candidates tried per POI before giving up on it
    pub relocation_attempts: usize,
    /// Radius in cells searched when snapping to a valid cell
    pub snap_radius: usize,
}

impl Default for PoiConfig {
    fn default() -> Self {
        Self {
            count: 8,
            min_spacing: 12.0,
            weights: PoiWeights::default(),
            relocation_attempts: 32,
            snap_radius: 8,
        }
    }
}

/// Road graph, simplification and rasterization settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadConfig {
    /// Extra non-tree edges added for loops
    pub extra_edges: usize,
    /// A loop edge is only added if the existing graph route is at least this
    /// many times longer than the direct edge
    pub loop_ratio: f32,
    /// Edge weight penalty per level of difference, as a fraction of the edge length
    pub level_penalty: f32,
    /// Road width in cells
    pub width: f32,
    /// Douglas-Peucker tolerance in cells
    pub simplify_epsilon: f32,
    /// Run per-edge searches in parallel on a grid snapshot
    pub parallel: bool,
}

impl Default for RoadConfig {
    fn default() -> Self {
        Self {
            extra_edges: 2,
            loop_ratio: 1.5,
            level_penalty: 0.25,
            width: 3.0,
            simplify_epsilon: 1.0,
            parallel: false,
        }
    }
}

/// Progressive slope settings for ramps
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlopeConfig {
    /// Slope at the bottom of a ramp, in degrees
    pub start_angle: f32,
    /// Slope at the top of a ramp, in degrees
    pub end_angle: f32,
    pub curve: CurveType,
    pub min_transition_cells: usize,
    pub max_transition_cells: usize,
}

impl Default for SlopeConfig {
    fn default() -> Self {
        Self {
            start_angle: 20.0,
            end_angle: 87.0,
            curve: CurveType::EaseInOut,
            min_transition_cells: 4,
            max_transition_cells: 24,
        }
    }
}

/// Step costs for the pathfinder
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathCosts {
    /// Cost of an orthogonal step on flat terrain
    pub base: f32,
    /// Multiplier for diagonal steps, in [1, 2]
    pub diagonal: f32,
    /// Added on top of the step cost when the heading changes, so a turning
    /// step always costs more than a straight one
    pub curve: f32,
    /// Added on top of the step cost when crossing into another level without
    /// an existing ramp; must exceed `curve`
    pub level_change: f32,
    /// Added when stepping onto water
    pub water: f32,
    /// Multiplier for stepping onto an existing road (0, 1]
    pub road_factor: f32,
    /// Maximum nodes expanded before the search gives up
    pub node_budget: Option<usize>,
}

impl Default for PathCosts {
    fn default() -> Self {
        Self {
            base: 1.0,
            diagonal: std::f32::consts::SQRT_2,
            curve: 0.4,
            level_change: 12.0,
            water: 8.0,
            road_factor: 0.6,
            node_budget: None,
        }
    }
}

/// Ramp protection mask settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Distance in cells over which protection fades to zero (5-10)
    pub falloff_radius: f32,
    /// Mask values above this block all height changes
    pub protection_threshold: f32,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            falloff_radius: 6.0,
            protection_threshold: 0.95,
        }
    }
}

impl TerrainConfig {
    /// Load a config from a JSON file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: TerrainConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no generation pass could honor.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(TerrainError::InvalidConfig(msg));

        if self.grid.cols == 0 || self.grid.rows == 0 {
            return fail(format!("grid must be non-empty, got {}x{}", self.grid.cols, self.grid.rows));
        }
        if self.grid.cell_size <= 0.0 {
            return fail(format!("cell_size must be positive, got {}", self.grid.cell_size));
        }

        let levels = &self.levels;
        if levels.character_height <= 0.0 {
            return fail("character_height must be positive".into());
        }
        if let Some(max) = levels.max_height_difference {
            if max <= 0.0 {
                return fail(format!("max_height_difference must be positive, got {}", max));
            }
        }
        if levels.min_level > 0 || levels.max_level < 0 || levels.min_level >= levels.max_level {
            return fail(format!(
                "level range {}..={} must contain ground level 0",
                levels.min_level, levels.max_level
            ));
        }
        if levels.max_walkable_level < 0 || levels.max_walkable_level > levels.max_level {
            return fail(format!(
                "max_walkable_level {} outside 0..={}",
                levels.max_walkable_level, levels.max_level
            ));
        }
        if !(0.0..0.5).contains(&levels.max_variation_fraction) {
            return fail("max_variation_fraction must be in [0, 0.5)".into());
        }

        if self.pois.min_spacing < 0.0 {
            return fail("min_spacing must not be negative".into());
        }

        let roads = &self.roads;
        if roads.loop_ratio < 1.0 {
            return fail(format!("loop_ratio must be >= 1, got {}", roads.loop_ratio));
        }
        if roads.width < 1.0 || roads.simplify_epsilon < 0.0 || roads.level_penalty < 0.0 {
            return fail("road width must be >= 1 and epsilon/penalty non-negative".into());
        }

        let slope = &self.slope;
        if !(slope.start_angle > 0.0 && slope.end_angle < 90.0 && slope.start_angle < slope.end_angle) {
            return fail(format!(
                "slope angles must satisfy 0 < start ({}) < end ({}) < 90",
                slope.start_angle, slope.end_angle
            ));
        }
        if slope.min_transition_cells < 2 || slope.min_transition_cells > slope.max_transition_cells {
            return fail("transition cells must satisfy 2 <= min <= max".into());
        }

        let costs = &self.costs;
        if costs.base <= 0.0 || !(1.0..=2.0).contains(&costs.diagonal) || costs.curve < 0.0 || costs.level_change < 0.0 || costs.water < 0.0 {
            return fail("path costs must be non-negative with base > 0 and diagonal in [1, 2]".into());
        }
        if costs.level_change <= costs.curve {
            return fail(format!(
                "level_change ({}) must exceed curve ({})",
                costs.level_change, costs.curve
            ));
        }
        if !(costs.road_factor > 0.0 && costs.road_factor <= 1.0) {
            return fail(format!("road_factor must be in (0, 1], got {}", costs.road_factor));
        }

        if !(5.0..=10.0).contains(&self.mask.falloff_radius) {
            return fail(format!("falloff_radius must be in [5, 10], got {}", self.mask.falloff_radius));
        }
        if !(0.0..=1.0).contains(&self.mask.protection_threshold) {
            return fail("protection_threshold must be in [0, 1]".into());
        }

        Ok(())
    }
}
