//! Discrete level model
//!
//! Levels are quantized height tiers. Every level sits exactly one max height
//! difference above the previous one, so neighbouring levels can always be
//! bridged by a ramp and levels two apart never can.

use crate::config::LevelSettings;

/// Default character height in world units
pub const DEFAULT_CHARACTER_HEIGHT: f32 = 180.0;

/// The max height difference is this multiple of the character height
pub const HEIGHT_DIFFERENCE_FACTOR: f32 = 1.5;

/// Tolerance for comparing derived heights
const HEIGHT_EPSILON: f32 = 1e-3;

/// Derived level-to-height mapping for one generation pass
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelConfig {
    pub character_height: f32,
    /// Largest height step a ramp may bridge, and the spacing between levels
    pub max_height_difference: f32,
    /// Allowed plateau noise/detail around a level's base height
    pub max_variation: f32,
    pub min_level: i32,
    pub max_level: i32,
    pub max_walkable_level: i32,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self::from_settings(&LevelSettings::default())
    }
}

impl LevelConfig {
    pub fn from_settings(settings: &LevelSettings) -> Self {
        let max_height_difference = settings
            .max_height_difference
            .unwrap_or(HEIGHT_DIFFERENCE_FACTOR * settings.character_height);

        Self {
            character_height: settings.character_height,
            max_height_difference,
            max_variation: max_height_difference * settings.max_variation_fraction,
            min_level: settings.min_level,
            max_level: settings.max_level,
            max_walkable_level: settings.max_walkable_level,
        }
    }

    /// Base height of a level in world units.
    ///
    /// # Examples
    /// ```
    /// use tiered_terrain::level::LevelConfig;
    /// let levels = LevelConfig::default();
    /// assert_eq!(levels.base_height(0), 0.0);
    /// assert_eq!(levels.base_height(1), 270.0);
    /// assert_eq!(levels.base_height(-1), -270.0);
    /// ```
    pub fn base_height(&self, level: i32) -> f32 {
        level as f32 * self.max_height_difference
    }

    /// Whether a ramp may connect the two levels.
    pub fn height_difference_valid(&self, level_a: i32, level_b: i32) -> bool {
        let delta = (self.base_height(level_b) - self.base_height(level_a)).abs();
        delta <= self.max_height_difference + HEIGHT_EPSILON
    }

    /// Levels above the last walkable plateau are scenery only.
    pub fn is_visual_only(&self, level: i32) -> bool {
        level > self.max_walkable_level
    }

    pub fn is_underwater(&self, level: i32) -> bool {
        level < 0
    }

    /// Whether a height is reachable from the level's base within the variation budget.
    pub fn height_within_bounds(&self, level: i32, height: f32) -> bool {
        (height - self.base_height(level)).abs() <= self.max_variation + HEIGHT_EPSILON
    }

    /// Clamp a height into the variation band of its level.
    pub fn clamp_height(&self, level: i32, height: f32) -> f32 {
        let base = self.base_height(level);
        height.clamp(base - self.max_variation, base + self.max_variation)
    }

    /// Human-readable description of a level
    pub fn describe(&self, level: i32) -> &'static str {
        match level {
            l if l < 0 => "Underwater",
            0 => "Ground",
            l if l > self.max_walkable_level => "Peak (visual only)",
            _ => "Plateau",
        }
    }
}
