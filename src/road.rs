//! Road simplification and rasterization
//!
//! Pathfinder output is a staircase of cells. Douglas-Peucker reduces it to
//! the corners that matter, then the centerline is redrawn with Bresenham and
//! widened by a disc to the configured road width.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::grid::{CellFlags, Grid, Pos};

/// Distance from `p` to the segment `a..b`, in cells.
pub fn segment_distance(p: Pos, a: Pos, b: Pos) -> f32 {
    let (px, py) = (p.0 as f32, p.1 as f32);
    let (ax, ay) = (a.0 as f32, a.1 as f32);
    let (bx, by) = (b.0 as f32, b.1 as f32);
    let (vx, vy) = (bx - ax, by - ay);
    let len2 = vx * vx + vy * vy;
    if len2 == 0.0 {
        return ((px - ax).powi(2) + (py - ay).powi(2)).sqrt();
    }
    let t = (((px - ax) * vx + (py - ay) * vy) / len2).clamp(0.0, 1.0);
    let (cx, cy) = (ax + t * vx, ay + t * vy);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

/// Douglas-Peucker simplification. Both endpoints are always kept and no
/// dropped point lies further than `epsilon` from the simplified polyline.
pub fn simplify(path: &[Pos], epsilon: f32) -> Vec<Pos> {
    if path.len() < 3 {
        return path.to_vec();
    }

    let mut keep = vec![false; path.len()];
    keep[0] = true;
    keep[path.len() - 1] = true;

    let mut stack = vec![(0usize, path.len() - 1)];
    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }
        let (index, deviation) = (first + 1..last)
            .map(|i| (i, segment_distance(path[i], path[first], path[last])))
            .fold((first, -1.0f32), |best, cur| if cur.1 > best.1 { cur } else { best });

        if deviation > epsilon {
            keep[index] = true;
            stack.push((first, index));
            stack.push((index, last));
        }
    }

    path.iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// Simplify each stretch between anchor points separately so anchors (ramp
/// cells, level crossings) survive exactly.
pub fn simplify_with_anchors(path: &[Pos], epsilon: f32, is_anchor: impl Fn(usize, Pos) -> bool) -> Vec<Pos> {
    simplify_pieces(path, epsilon, is_anchor, |_, _| true)
}

/// Anchored simplification of a walked route. Ramp cells and level crossings
/// are anchors, and a stretch whose redrawn chord would leave its level or
/// cross an impassable cell is kept exactly as walked.
pub fn simplify_on_grid(grid: &Grid, path: &[Pos], epsilon: f32) -> Vec<Pos> {
    let is_anchor = |i: usize, (x, y): Pos| {
        let (px, py) = path[i - 1];
        grid.cell(x, y).is_ramp() || grid.level_at(x, y) != grid.level_at(px, py)
    };
    simplify_pieces(path, epsilon, is_anchor, |walked, piece| chord_stays_on_level(grid, walked, piece))
}

fn simplify_pieces(
    path: &[Pos],
    epsilon: f32,
    is_anchor: impl Fn(usize, Pos) -> bool,
    accept: impl Fn(&[Pos], &[Pos]) -> bool,
) -> Vec<Pos> {
    if path.len() < 3 {
        return path.to_vec();
    }

    let mut out: Vec<Pos> = Vec::with_capacity(path.len());
    let mut start = 0;
    for i in 1..path.len() {
        if i == path.len() - 1 || is_anchor(i, path[i]) {
            let walked = &path[start..=i];
            let mut piece = simplify(walked, epsilon);
            if !accept(walked, &piece) {
                piece = walked.to_vec();
            }
            // The first point of each piece is the last point of the previous one
            let skip = usize::from(!out.is_empty());
            out.extend(piece.into_iter().skip(skip));
            start = i;
        }
    }
    out
}

/// Every cell the redrawn piece covers was either walked or is a passable,
/// non-ramp cell on the level the stretch starts on.
fn chord_stays_on_level(grid: &Grid, walked: &[Pos], piece: &[Pos]) -> bool {
    let Some(&(x0, y0)) = walked.first() else {
        return true;
    };
    let level = grid.level_at(x0, y0);
    let on_route: BTreeSet<Pos> = walked.iter().copied().collect();
    densify(piece).into_iter().all(|p| {
        if on_route.contains(&p) {
            return true;
        }
        let cell = grid.cell(p.0, p.1);
        cell.is_passable() && !cell.is_ramp() && cell.level == level
    })
}

/// Bresenham's line algorithm, both ends inclusive.
fn bresenham_line(from: Pos, to: Pos) -> Vec<Pos> {
    let mut line = Vec::new();

    let (x1, y1) = (to.0 as i64, to.1 as i64);
    let dx = (x1 - from.0 as i64).abs();
    let dy = -(y1 - from.1 as i64).abs();
    let sx = if (from.0 as i64) < x1 { 1 } else { -1 };
    let sy = if (from.1 as i64) < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let mut x = from.0 as i64;
    let mut y = from.1 as i64;

    loop {
        line.push((x as usize, y as usize));
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }

    line
}

/// Redraw a simplified polyline as a connected run of cells.
pub fn densify(path: &[Pos]) -> Vec<Pos> {
    let Some(&first) = path.first() else {
        return Vec::new();
    };
    let mut cells = vec![first];
    for w in path.windows(2) {
        cells.extend(bresenham_line(w[0], w[1]).into_iter().skip(1));
    }
    cells
}

/// Offsets covered by a disc of diameter `width` centred on a cell.
fn disc_offsets(width: f32) -> Vec<(i64, i64)> {
    let r = (width / 2.0).max(0.5);
    let reach = r.floor() as i64;
    let mut offsets = Vec::new();
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            if ((dx * dx + dy * dy) as f32) <= r * r {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

fn shifted(p: Pos, (dx, dy): (i64, i64)) -> Option<Pos> {
    let x = usize::try_from(p.0 as i64 + dx).ok()?;
    let y = usize::try_from(p.1 as i64 + dy).ok()?;
    Some((x, y))
}

/// Cells covered by a centerline widened by `width / 2` on each side.
/// Positions left of or above the origin are dropped; callers clip the rest.
pub fn rasterize(path: &[Pos], width: f32) -> BTreeSet<Pos> {
    let offsets = disc_offsets(width);
    densify(path)
        .into_iter()
        .flat_map(|p| offsets.iter().filter_map(move |&o| shifted(p, o)))
        .collect()
}

/// Write a road into the grid. Each centerline cell widens only onto passable
/// cells of its own level; ramp cells are flagged but never widened across.
/// Returns how many cells were newly flagged as road.
pub fn mark_road(grid: &mut Grid, path: &[Pos], width: f32, road_id: u32) -> Result<usize> {
    let offsets = disc_offsets(width);
    let mut newly = 0;

    for center in densify(path) {
        let center_cell = *grid.get_cell(center.0, center.1)?;
        if !center_cell.is_passable() {
            continue;
        }
        if center_cell.is_ramp() {
            newly += usize::from(flag_road(grid, center, road_id)?);
            continue;
        }
        for &o in &offsets {
            let Some((x, y)) = shifted(center, o) else {
                continue;
            };
            if !grid.in_bounds(x as i64, y as i64) || (x, y) == center {
                continue;
            }
            let cell = grid.cell(x, y);
            if !cell.is_passable() || cell.level != center_cell.level || cell.is_ramp() {
                continue;
            }
            newly += usize::from(flag_road(grid, (x, y), road_id)?);
        }
        newly += usize::from(flag_road(grid, center, road_id)?);
    }

    Ok(newly)
}

fn flag_road(grid: &mut Grid, (x, y): Pos, road_id: u32) -> Result<bool> {
    let cell = grid.cell_mut(x, y)?;
    cell.road_id.get_or_insert(road_id);
    Ok(cell.mark(CellFlags::ROAD))
}

/// Flag every non-ramp cell that borders a different level. Returns how many
/// cells were newly flagged.
pub fn mark_cliffs(grid: &mut Grid) -> Result<usize> {
    let cliffs: Vec<Pos> = grid
        .iter()
        .filter(|(x, y, cell)| {
            !cell.is_ramp() && grid.neighbors(*x, *y).any(|(nx, ny)| grid.cell(nx, ny).level != cell.level)
        })
        .map(|(x, y, _)| (x, y))
        .collect();

    let mut newly = 0;
    for (x, y) in cliffs {
        newly += usize::from(grid.cell_mut(x, y)?.mark(CellFlags::CLIFF));
    }
    tracing::debug!(newly, "cliff cells flagged");
    Ok(newly)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Largest distance from any original point to the simplified polyline.
    fn max_deviation(original: &[Pos], simplified: &[Pos]) -> f32 {
        original
            .iter()
            .map(|&p| {
                simplified
                    .windows(2)
                    .map(|w| segment_distance(p, w[0], w[1]))
                    .fold(f32::INFINITY, f32::min)
            })
            .fold(0.0, f32::max)
    }

    fn wiggly_path() -> Vec<Pos> {
        let mut path = Vec::new();
        for x in 0..40usize {
            let y = 10 + ((x as f32 * 0.35).sin() * 6.0).round() as usize;
            path.push((x, y));
        }
        path
    }

    #[test]
    fn test_straight_line_collapses_to_endpoints() {
        let path: Vec<Pos> = (0..15).map(|i| (i, i)).collect();
        assert_eq!(simplify(&path, 0.5), vec![(0, 0), (14, 14)]);
    }

    #[test]
    fn test_simplify_respects_epsilon() {
        let path = wiggly_path();
        for epsilon in [0.5f32, 1.0, 2.0, 4.0] {
            let simplified = simplify(&path, epsilon);
            assert_eq!(simplified[0], path[0]);
            assert_eq!(*simplified.last().unwrap(), *path.last().unwrap());
            assert!(simplified.len() <= path.len());
            assert!(max_deviation(&path, &simplified) <= epsilon + 1e-4, "epsilon {}", epsilon);
        }
        assert!(simplify(&path, 4.0).len() < simplify(&path, 0.5).len());
    }

    #[test]
    fn test_short_paths_unchanged() {
        assert!(simplify(&[], 1.0).is_empty());
        assert_eq!(simplify(&[(3, 3)], 1.0), vec![(3, 3)]);
        assert_eq!(simplify(&[(0, 0), (5, 2)], 1.0), vec![(0, 0), (5, 2)]);
    }

    #[test]
    fn test_anchors_survive_simplification() {
        let path: Vec<Pos> = (0..20).map(|i| (i, 5)).collect();
        let simplified = simplify_with_anchors(&path, 1.0, |i, _| i == 7 || i == 12);
        assert_eq!(simplified, vec![(0, 5), (7, 5), (12, 5), (19, 5)]);
    }

    #[test]
    fn test_chord_never_cuts_across_a_plateau_corner() {
        let mut grid = Grid::create(10, 6);
        for y in 1..=4 {
            for x in 1..=4 {
                grid.assign_level(x, y, 1).unwrap();
            }
        }
        let path: Vec<Pos> = vec![(0, 0), (1, 0), (2, 0), (3, 0), (4, 0), (5, 1)];

        // Plain simplification takes the shortcut through (3, 1)
        assert!(densify(&simplify(&path, 1.0)).contains(&(3, 1)));

        let centerline = simplify_on_grid(&grid, &path, 1.0);
        assert_eq!(centerline.first(), Some(&(0, 0)));
        assert_eq!(centerline.last(), Some(&(5, 1)));
        for (x, y) in densify(&centerline) {
            assert_eq!(grid.level_at(x, y), 0, "centerline left level 0 at ({}, {})", x, y);
        }
    }

    #[test]
    fn test_grid_simplification_still_reduces_open_stretches() {
        let grid = Grid::create(30, 10);
        let path: Vec<Pos> = (0..20).map(|i| (i, 5)).collect();
        assert_eq!(simplify_on_grid(&grid, &path, 1.0), vec![(0, 5), (19, 5)]);
    }

    #[test]
    fn test_densify_is_connected() {
        let cells = densify(&[(0, 0), (9, 4), (2, 12)]);
        assert_eq!(cells[0], (0, 0));
        assert_eq!(*cells.last().unwrap(), (2, 12));
        for w in cells.windows(2) {
            assert!(w[0].0.abs_diff(w[1].0) <= 1 && w[0].1.abs_diff(w[1].1) <= 1);
        }
    }

    #[test]
    fn test_rasterize_width() {
        let narrow = rasterize(&[(5, 5), (15, 5)], 1.0);
        assert_eq!(narrow.len(), 11);

        let wide = rasterize(&[(5, 5), (15, 5)], 3.0);
        assert!(wide.contains(&(10, 4)) && wide.contains(&(10, 6)));
        assert!(!wide.contains(&(10, 7)));
        assert_eq!(wide.len(), 13 * 3);
    }

    #[test]
    fn test_mark_road_is_idempotent() {
        let mut grid = Grid::create(20, 10);
        let path = vec![(2, 5), (17, 5)];

        let first = mark_road(&mut grid, &path, 3.0, 0).unwrap();
        assert!(first > 0);
        assert_eq!(grid.count_flag(CellFlags::ROAD), first);
        assert_eq!(mark_road(&mut grid, &path, 3.0, 1).unwrap(), 0);
        assert_eq!(grid.cell(10, 5).road_id, Some(0));
    }

    #[test]
    fn test_mark_road_stays_on_level() {
        let mut grid = Grid::create(20, 10);
        for x in 0..20 {
            grid.assign_level(x, 6, 1).unwrap();
        }
        grid.cell_mut(10, 4).unwrap().mark(CellFlags::BLOCKED);

        mark_road(&mut grid, &[(2, 5), (17, 5)], 3.0, 0).unwrap();
        assert!(grid.cell(10, 5).is_road());
        assert!(!grid.cell(10, 6).is_road());
        assert!(!grid.cell(10, 4).is_road());
        assert!(grid.cell(11, 4).is_road());
    }

    #[test]
    fn test_cliffs_border_level_changes() {
        let mut grid = Grid::create(6, 3);
        for y in 0..3 {
            for x in 3..6 {
                grid.assign_level(x, y, 1).unwrap();
            }
        }
        grid.cell_mut(2, 1).unwrap().mark(CellFlags::RAMP);

        let newly = mark_cliffs(&mut grid).unwrap();
        assert_eq!(newly, 5);
        assert!(grid.cell(2, 0).has(CellFlags::CLIFF));
        assert!(grid.cell(3, 1).has(CellFlags::CLIFF));
        assert!(!grid.cell(2, 1).has(CellFlags::CLIFF));
        assert!(!grid.cell(1, 1).has(CellFlags::CLIFF));
        assert_eq!(mark_cliffs(&mut grid).unwrap(), 0);
    }
}
