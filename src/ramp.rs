//! Ramp generation
//!
//! Wherever a road path steps from one level to the next, a run of path cells
//! around the crossing is turned into a ramp. Heights follow the slope
//! profile's height factor, so the ramp is walkable at the bottom and close to
//! vertical at the top. A ramp that can't stay within its angle bounds is
//! rejected, never flattened or clamped.

use crate::config::SlopeConfig;
use crate::error::{RampLimit, Result, TerrainError};
use crate::grid::{CellFlags, Grid, Pos};
use crate::level::LevelConfig;
use crate::slope::{CurveType, SlopeProfile};

/// Longest run considered when reporting how many cells a ramp would need
const MAX_REPORTED_RUN: usize = 4096;

/// A level crossing between `path[index]` and `path[index + 1]`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelTransition {
    pub index: usize,
    pub from_level: i32,
    pub to_level: i32,
}

/// Ordered ramp cells with their target heights, always bottom to top
#[derive(Clone, Debug, PartialEq)]
pub struct RampSegment {
    pub cells: Vec<Pos>,
    pub heights: Vec<f32>,
    /// Lower level
    pub from_level: i32,
    /// Upper level
    pub to_level: i32,
    pub start_angle: f32,
    pub end_angle: f32,
    pub curve: CurveType,
    pub transition_length: usize,
}

impl RampSegment {
    /// Largest height gain between two consecutive cells.
    pub fn max_step(&self) -> f32 {
        self.heights
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0, f32::max)
    }
}

/// Find the level crossings along a path that aren't already covered by a ramp.
pub fn find_level_transitions(grid: &Grid, path: &[Pos]) -> Vec<LevelTransition> {
    path.windows(2)
        .enumerate()
        .filter_map(|(index, w)| {
            let a = grid.cell(w[0].0, w[0].1);
            let b = grid.cell(w[1].0, w[1].1);
            if a.level == b.level || (a.is_ramp() && b.is_ramp()) {
                return None;
            }
            Some(LevelTransition {
                index,
                from_level: a.level,
                to_level: b.level,
            })
        })
        .collect()
}

fn gap_error(levels: &LevelConfig, from_level: i32, to_level: i32) -> TerrainError {
    TerrainError::HeightDifferenceExceeded {
        from_level,
        to_level,
        limit: RampLimit::LevelGap {
            delta: (levels.base_height(to_level) - levels.base_height(from_level)).abs(),
            max: levels.max_height_difference,
        },
    }
}

/// Whether every step of an `n`-cell ramp rising `delta` stays at or under the
/// profile's angle at the top of that step.
fn run_fits_profile(profile: &SlopeProfile, cell_size: f32, delta: f32, n: usize) -> bool {
    let factors = profile.height_factors(n);
    factors.windows(2).enumerate().all(|(i, w)| {
        let rise = delta * (w[1] - w[0]);
        let allowed = profile.angle((i + 1) as f32 / (n - 1) as f32);
        (rise / cell_size).atan().to_degrees() <= allowed + 1e-3
    })
}

/// Shortest run from `from` up to `MAX_REPORTED_RUN` that fits, found by
/// doubling and then bisecting. Spreading the same rise over more cells only
/// lowers each step, so every run longer than a fitting one fits too.
fn shortest_fitting_run(from: usize, fits: impl Fn(usize) -> bool) -> usize {
    let mut lo = from;
    let mut hi = from;
    while !fits(hi) {
        if hi >= MAX_REPORTED_RUN {
            return MAX_REPORTED_RUN;
        }
        lo = hi + 1;
        hi = (hi * 2).clamp(lo, MAX_REPORTED_RUN);
    }
    // fits(hi); everything below lo was rejected
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if fits(mid) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    hi
}

/// Minimum number of cells a ramp between two levels needs so that every
/// step's slope stays within the profile. Fails if the levels can't be
/// bridged or the run would exceed `max_cells`.
pub fn transition_length(
    levels: &LevelConfig,
    profile: &SlopeProfile,
    cell_size: f32,
    from_level: i32,
    to_level: i32,
    min_cells: usize,
    max_cells: usize,
) -> Result<usize> {
    if !levels.height_difference_valid(from_level, to_level) {
        return Err(gap_error(levels, from_level, to_level));
    }

    let delta = (levels.base_height(to_level) - levels.base_height(from_level)).abs();
    if delta == 0.0 {
        return Ok(0);
    }

    let fits = |n: usize| run_fits_profile(profile, cell_size, delta, n);
    let min_cells = min_cells.max(2);
    if let Some(n) = (min_cells..=max_cells).find(|&n| fits(n)) {
        return Ok(n);
    }

    let required = shortest_fitting_run(max_cells + 1, fits);
    Err(TerrainError::HeightDifferenceExceeded {
        from_level,
        to_level,
        limit: RampLimit::TooShort {
            required,
            available: max_cells,
        },
    })
}

/// Build a ramp over an explicit run of cells, ordered from `from_level` to `to_level`.
pub fn build_ramp(
    levels: &LevelConfig,
    profile: &SlopeProfile,
    cell_size: f32,
    cells: &[Pos],
    from_level: i32,
    to_level: i32,
) -> Result<RampSegment> {
    if !levels.height_difference_valid(from_level, to_level) {
        return Err(gap_error(levels, from_level, to_level));
    }
    if cells.len() < 2 {
        return Err(TerrainError::HeightDifferenceExceeded {
            from_level,
            to_level,
            limit: RampLimit::TooShort {
                required: 2,
                available: cells.len(),
            },
        });
    }

    // Normalize so the ramp always runs bottom to top
    let (lower, upper, ordered): (i32, i32, Vec<Pos>) = if from_level <= to_level {
        (from_level, to_level, cells.to_vec())
    } else {
        (to_level, from_level, cells.iter().rev().copied().collect())
    };

    let bottom = levels.base_height(lower);
    let top = levels.base_height(upper);
    let heights: Vec<f32> = profile
        .height_factors(ordered.len())
        .into_iter()
        .map(|g| bottom + (top - bottom) * g)
        .collect();

    let max_rise = profile.max_step_rise(cell_size);
    for (step, w) in heights.windows(2).enumerate() {
        let rise = w[1] - w[0];
        if rise > max_rise + 1e-3 {
            return Err(TerrainError::HeightDifferenceExceeded {
                from_level: lower,
                to_level: upper,
                limit: RampLimit::StepTooSteep {
                    step,
                    angle_deg: (rise / cell_size).atan().to_degrees(),
                    max_deg: profile.end_angle,
                },
            });
        }
    }

    Ok(RampSegment {
        transition_length: ordered.len(),
        cells: ordered,
        heights,
        from_level: lower,
        to_level: upper,
        start_angle: profile.start_angle,
        end_angle: profile.end_angle,
        curve: profile.curve,
    })
}

/// Choose a window of `n` path indices centred on the crossing, kept inside
/// `[lo, hi]`, which must contain both sides of the crossing. Returns the
/// first index of the window.
fn place_window(crossing: usize, n: usize, lo: usize, hi: usize) -> Option<usize> {
    if crossing < lo || crossing + 1 > hi || hi - lo + 1 < n {
        return None;
    }
    // Centre on the gap between path[crossing] and path[crossing + 1]
    let ideal = (crossing + 1).saturating_sub(n / 2);
    Some(ideal.clamp(lo, hi + 1 - n))
}

/// Generate one ramp per level crossing along a path.
///
/// Each crossing may only use the path cells between the midpoints to its
/// neighbouring crossings, so consecutive ramps never overlap.
pub fn generate_ramps(grid: &Grid, path: &[Pos], slope: &SlopeConfig) -> Result<Vec<RampSegment>> {
    let transitions = find_level_transitions(grid, path);
    if transitions.is_empty() {
        return Ok(Vec::new());
    }

    let levels = grid.levels();
    let profile = SlopeProfile::from_config(slope);
    let mut ramps = Vec::with_capacity(transitions.len());

    for (k, t) in transitions.iter().enumerate() {
        let n = transition_length(
            levels,
            &profile,
            grid.cell_size,
            t.from_level,
            t.to_level,
            slope.min_transition_cells,
            slope.max_transition_cells,
        )?;

        let mut lo = if k == 0 {
            0
        } else {
            (transitions[k - 1].index + t.index) / 2 + 1
        };
        let mut hi = match transitions.get(k + 1) {
            Some(next) => (t.index + next.index) / 2,
            None => path.len() - 1,
        };
        // Never reshape a ramp baked by an earlier road
        let is_ramp = |i: usize| grid.cell(path[i].0, path[i].1).is_ramp();
        if let Some(i) = (lo..=t.index).rev().find(|&i| is_ramp(i)) {
            lo = i + 1;
        }
        if let Some(i) = (t.index + 1..=hi).find(|&i| is_ramp(i)) {
            hi = i.saturating_sub(1);
        }

        let start = place_window(t.index, n, lo, hi).ok_or_else(|| TerrainError::HeightDifferenceExceeded {
            from_level: t.from_level,
            to_level: t.to_level,
            limit: RampLimit::TooShort {
                required: n,
                available: (hi + 1).saturating_sub(lo),
            },
        })?;

        let ramp = build_ramp(
            levels,
            &profile,
            grid.cell_size,
            &path[start..start + n],
            t.from_level,
            t.to_level,
        )?;
        tracing::debug!(
            from = ramp.from_level,
            to = ramp.to_level,
            cells = ramp.transition_length,
            max_step = ramp.max_step(),
            "ramp generated"
        );
        ramps.push(ramp);
    }

    Ok(ramps)
}

/// Write a ramp into the grid: heights plus ramp and road flags.
/// Returns how many cells were newly flagged as ramp.
pub fn bake_ramp(grid: &mut Grid, ramp: &RampSegment, road_id: u32) -> Result<usize> {
    let mut newly = 0;
    for (&(x, y), &height) in ramp.cells.iter().zip(&ramp.heights) {
        let cell = grid.cell_mut(x, y)?;
        cell.height = height;
        if cell.mark(CellFlags::RAMP | CellFlags::ROAD) {
            newly += 1;
        }
        cell.road_id.get_or_insert(road_id);
    }
    Ok(newly)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(curve: CurveType) -> SlopeProfile {
        SlopeProfile::new(20.0, 87.0, curve)
    }

    /// A 1-row grid: level 0 for x < split, level `upper` from there.
    fn step_grid(cols: usize, split: usize, upper: i32) -> Grid {
        let mut grid = Grid::create(cols, 1);
        for x in split..cols {
            grid.assign_level(x, 0, upper).unwrap();
        }
        grid
    }

    #[test]
    fn test_linear_ramp_monotonic_with_exact_ends() {
        let levels = LevelConfig::default();
        let cells: Vec<Pos> = (0..12).map(|x| (x, 0)).collect();
        let ramp = build_ramp(&levels, &profile(CurveType::Linear), 100.0, &cells, 0, 1).unwrap();

        assert_eq!(ramp.heights[0], levels.base_height(0));
        assert!((ramp.heights[11] - levels.base_height(1)).abs() < 1e-3);
        for w in ramp.heights.windows(2) {
            assert!(w[1] >= w[0]);
        }
    }

    #[test]
    fn test_twenty_cell_ease_in_out_ramp() {
        let levels = LevelConfig::default();
        let slope = profile(CurveType::EaseInOut);
        let cells: Vec<Pos> = (0..20).map(|x| (x, 0)).collect();
        let ramp = build_ramp(&levels, &slope, 100.0, &cells, 0, 1).unwrap();

        assert_eq!(ramp.transition_length, 20);
        for w in ramp.heights.windows(2) {
            assert!(w[1] > w[0]);
        }
        assert!(ramp.max_step() <= slope.max_step_rise(100.0));
        assert!((ramp.heights[19] - ramp.heights[0] - 270.0).abs() < 1e-3);
        // Gentle entrance, steep exit
        assert!(ramp.heights[1] - ramp.heights[0] < ramp.heights[19] - ramp.heights[18]);
    }

    #[test]
    fn test_descending_ramp_is_normalized() {
        let levels = LevelConfig::default();
        let cells: Vec<Pos> = (0..6).map(|x| (x, 0)).collect();
        let ramp = build_ramp(&levels, &profile(CurveType::Linear), 100.0, &cells, 1, 0).unwrap();

        assert_eq!(ramp.from_level, 0);
        assert_eq!(ramp.to_level, 1);
        assert_eq!(ramp.cells[0], (5, 0));
        assert_eq!(ramp.heights[0], 0.0);
    }

    #[test]
    fn test_level_gap_rejected() {
        let levels = LevelConfig::default();
        let cells: Vec<Pos> = (0..30).map(|x| (x, 0)).collect();
        let err = build_ramp(&levels, &profile(CurveType::Linear), 100.0, &cells, 0, 2).unwrap_err();
        assert!(matches!(
            err,
            TerrainError::HeightDifferenceExceeded {
                limit: RampLimit::LevelGap { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_steep_step_rejected_not_clamped() {
        let levels = LevelConfig::default();
        // Tiny cells make two cells far too short for 270 units of rise
        let cells: Vec<Pos> = vec![(0, 0), (1, 0)];
        let err = build_ramp(&levels, &profile(CurveType::Linear), 1.0, &cells, 0, 1).unwrap_err();
        assert!(matches!(
            err,
            TerrainError::HeightDifferenceExceeded {
                limit: RampLimit::StepTooSteep { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_transition_length_grows_as_cells_shrink() {
        let levels = LevelConfig::default();
        let slope = profile(CurveType::EaseInOut);
        let coarse = transition_length(&levels, &slope, 100.0, 0, 1, 2, 200).unwrap();
        let fine = transition_length(&levels, &slope, 10.0, 0, 1, 2, 200).unwrap();
        assert!(coarse >= 2);
        assert!(fine > coarse);
        assert_eq!(transition_length(&levels, &slope, 100.0, 1, 1, 4, 24).unwrap(), 0);
    }

    #[test]
    fn test_shortest_fitting_run_bisects_to_the_boundary() {
        assert_eq!(shortest_fitting_run(5, |n| n >= 37), 37);
        assert_eq!(shortest_fitting_run(5, |n| n >= 5), 5);
        assert_eq!(shortest_fitting_run(5, |_| false), MAX_REPORTED_RUN);

        let calls = std::cell::Cell::new(0);
        let found = shortest_fitting_run(25, |n| {
            calls.set(calls.get() + 1);
            n >= 3000
        });
        assert_eq!(found, 3000);
        assert!(calls.get() < 30, "{} checks", calls.get());
    }

    #[test]
    fn test_transition_length_too_short() {
        let levels = LevelConfig::default();
        let err = transition_length(&levels, &profile(CurveType::Linear), 5.0, 0, 1, 2, 3).unwrap_err();
        match err {
            TerrainError::HeightDifferenceExceeded {
                limit: RampLimit::TooShort { required, available },
                ..
            } => {
                assert_eq!(available, 3);
                assert!(required > 3);
                // The reported length is enough on its own
                assert!(transition_length(&levels, &profile(CurveType::Linear), 5.0, 0, 1, 2, required).is_ok());
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_generate_and_bake_along_path() {
        let mut grid = step_grid(30, 15, 1);
        let path: Vec<Pos> = (0..30).map(|x| (x, 0)).collect();
        let slope = SlopeConfig::default();

        let ramps = generate_ramps(&grid, &path, &slope).unwrap();
        assert_eq!(ramps.len(), 1);
        let ramp = &ramps[0];
        assert!(ramp.transition_length >= slope.min_transition_cells);
        // The window straddles the crossing between x = 14 and x = 15
        assert!(ramp.cells.contains(&(14, 0)));
        assert!(ramp.cells.contains(&(15, 0)));

        let baked = bake_ramp(&mut grid, ramp, 3).unwrap();
        assert_eq!(baked, ramp.transition_length);
        assert!(grid.cell(14, 0).is_ramp());
        assert!(grid.cell(14, 0).is_road());
        assert_eq!(grid.cell(14, 0).road_id, Some(3));

        // Baking again changes no flags
        assert_eq!(bake_ramp(&mut grid, ramp, 4).unwrap(), 0);
        assert_eq!(grid.cell(14, 0).road_id, Some(3));

        // The crossing is now covered by a ramp and won't be ramped twice
        assert!(find_level_transitions(&grid, &path).is_empty());
    }

    #[test]
    fn test_path_too_short_for_ramp() {
        let grid = step_grid(4, 2, 1);
        let path: Vec<Pos> = (0..4).map(|x| (x, 0)).collect();
        let slope = SlopeConfig {
            min_transition_cells: 6,
            ..Default::default()
        };
        assert!(matches!(
            generate_ramps(&grid, &path, &slope),
            Err(TerrainError::HeightDifferenceExceeded {
                limit: RampLimit::TooShort { required: 6, available: 4 },
                ..
            })
        ));
    }

    #[test]
    fn test_window_avoids_existing_ramp_cells() {
        let mut grid = step_grid(30, 15, 1);
        for x in 5..10 {
            grid.cell_mut(x, 0).unwrap().mark(CellFlags::RAMP);
        }
        let path: Vec<Pos> = (0..30).map(|x| (x, 0)).collect();

        let ramps = generate_ramps(&grid, &path, &SlopeConfig::default()).unwrap();
        assert_eq!(ramps.len(), 1);
        assert!(ramps[0].cells.iter().all(|&(x, _)| x >= 10));
    }

    #[test]
    fn test_window_placement() {
        assert_eq!(place_window(10, 6, 0, 29), Some(8));
        assert_eq!(place_window(1, 6, 0, 29), Some(0));
        assert_eq!(place_window(28, 6, 0, 29), Some(24));
        assert_eq!(place_window(5, 6, 3, 7), None);
        assert_eq!(place_window(9, 4, 10, 29), None);
    }
}
