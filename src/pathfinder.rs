//! Level-aware A* pathfinding
//!
//! Searches over (cell, heading) states on an 8-connected grid so that
//! direction changes can be priced. A neighbour on a level whose height gap
//! can't be bridged by a ramp is never expanded: the max height difference is
//! enforced by the search, not repaired afterwards.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;

use crate::config::PathCosts;
use crate::error::{Result, TerrainError};
use crate::grid::{Cell, Grid, Pos};
use crate::road_graph::EdgeId;
use crate::tilemap::NEIGHBORS_8;

/// Heading slot for the start state, which has no incoming direction
const NO_HEADING: usize = NEIGHBORS_8.len();
const HEADINGS: usize = NEIGHBORS_8.len() + 1;
const NO_PARENT: u32 = u32::MAX;

/// Lifecycle of a single search
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchState {
    /// Seeded with the start state, nothing expanded yet
    Open,
    Expanding,
    /// Goal reached; the path is available
    Found,
    /// Open set ran dry or the node budget ran out
    Exhausted,
}

/// One search to run as part of a batch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathRequest {
    pub edge: EdgeId,
    pub start: Pos,
    pub goal: Pos,
}

/// A found path and what it cost
#[derive(Clone, Debug, PartialEq)]
pub struct PathResult {
    pub path: Vec<Pos>,
    pub cost: f32,
    pub expanded: usize,
}

/// Priority queue entry
#[derive(Clone, Copy)]
struct OpenNode {
    f: f32,
    seq: u64,
    state: u32,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap; equal f goes to the earlier insertion
        other.f.total_cmp(&self.f).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Cost of stepping from `from` onto `to` along heading `dir`, or `None` if the
/// step is not allowed at all.
fn step_cost(grid: &Grid, costs: &PathCosts, from: &Cell, to: &Cell, dir: usize, prev_dir: usize) -> Option<f32> {
    if !to.is_passable() {
        return None;
    }
    if from.level != to.level {
        if !grid.levels().height_difference_valid(from.level, to.level) {
            return None;
        }
        // Ramps are entered and left along their own run, never over the side
        if from.is_ramp() != to.is_ramp() {
            return None;
        }
    }

    let (dx, dy) = NEIGHBORS_8[dir];
    let mut cost = if dx != 0 && dy != 0 {
        costs.base * costs.diagonal
    } else {
        costs.base
    };
    if to.is_road() {
        cost *= costs.road_factor;
    }
    if prev_dir != NO_HEADING && prev_dir != dir {
        cost += costs.curve;
    }
    if from.level != to.level && !(from.is_ramp() && to.is_ramp()) {
        cost += costs.level_change;
    }
    if to.is_water() {
        cost += costs.water;
    }
    Some(cost)
}

/// Octile distance scaled by the cheapest possible step, so it never
/// overestimates even along existing roads.
pub fn heuristic(costs: &PathCosts, from: Pos, to: Pos) -> f32 {
    let dx = from.0.abs_diff(to.0) as f32;
    let dy = from.1.abs_diff(to.1) as f32;
    let (lo, hi) = if dx < dy { (dx, dy) } else { (dy, dx) };
    (hi - lo + costs.diagonal * lo) * costs.base * costs.road_factor
}

/// A single A* search, stepped until it reaches a terminal state
pub struct AStar<'a> {
    grid: &'a Grid,
    costs: &'a PathCosts,
    start: Pos,
    goal: Pos,
    state: SearchState,
    open: BinaryHeap<OpenNode>,
    g: Vec<f32>,
    parent: Vec<u32>,
    closed: Vec<bool>,
    seq: u64,
    expanded: usize,
    found: Option<u32>,
}

impl<'a> AStar<'a> {
    pub fn new(grid: &'a Grid, start: Pos, goal: Pos, costs: &'a PathCosts) -> Result<Self> {
        grid.get_cell(start.0, start.1)?;
        grid.get_cell(goal.0, goal.1)?;

        let states = grid.cols() * grid.rows() * HEADINGS;
        let mut search = Self {
            grid,
            costs,
            start,
            goal,
            state: SearchState::Open,
            open: BinaryHeap::new(),
            g: vec![f32::INFINITY; states],
            parent: vec![NO_PARENT; states],
            closed: vec![false; states],
            seq: 0,
            expanded: 0,
            found: None,
        };
        let s = search.state_index(start, NO_HEADING);
        search.g[s as usize] = 0.0;
        search.push(s, heuristic(costs, start, goal));
        Ok(search)
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn expanded(&self) -> usize {
        self.expanded
    }

    fn state_index(&self, pos: Pos, heading: usize) -> u32 {
        ((pos.1 * self.grid.cols() + pos.0) * HEADINGS + heading) as u32
    }

    fn decode(&self, state: u32) -> (Pos, usize) {
        let state = state as usize;
        let cell = state / HEADINGS;
        ((cell % self.grid.cols(), cell / self.grid.cols()), state % HEADINGS)
    }

    fn push(&mut self, state: u32, f: f32) {
        self.open.push(OpenNode { f, seq: self.seq, state });
        self.seq += 1;
    }

    /// Expand one node. Returns the state after the step.
    pub fn step(&mut self) -> SearchState {
        if matches!(self.state, SearchState::Found | SearchState::Exhausted) {
            return self.state;
        }
        self.state = SearchState::Expanding;

        let node = loop {
            let Some(node) = self.open.pop() else {
                self.state = SearchState::Exhausted;
                return self.state;
            };
            if !self.closed[node.state as usize] {
                break node;
            }
        };

        let (pos, heading) = self.decode(node.state);
        if pos == self.goal {
            self.found = Some(node.state);
            self.state = SearchState::Found;
            return self.state;
        }

        if let Some(budget) = self.costs.node_budget {
            if self.expanded >= budget {
                self.state = SearchState::Exhausted;
                return self.state;
            }
        }

        self.closed[node.state as usize] = true;
        self.expanded += 1;

        let grid = self.grid;
        let here = grid.cell(pos.0, pos.1);
        let g_here = self.g[node.state as usize];

        for (dir, &(dx, dy)) in NEIGHBORS_8.iter().enumerate() {
            let Some(next) = grid.offset(pos, dx, dy) else {
                continue;
            };
            // No squeezing diagonally between two impassable cells
            if dx != 0 && dy != 0 {
                let side_a = grid.cell(next.0, pos.1);
                let side_b = grid.cell(pos.0, next.1);
                if !side_a.is_passable() && !side_b.is_passable() {
                    continue;
                }
            }

            let there = grid.cell(next.0, next.1);
            let Some(cost) = step_cost(grid, self.costs, here, there, dir, heading) else {
                continue;
            };

            let s = self.state_index(next, dir);
            if self.closed[s as usize] {
                continue;
            }
            let tentative = g_here + cost;
            if tentative < self.g[s as usize] {
                self.g[s as usize] = tentative;
                self.parent[s as usize] = node.state;
                self.push(s, tentative + heuristic(self.costs, next, self.goal));
            }
        }

        self.state
    }

    /// Step until the search terminates.
    pub fn run(&mut self) -> SearchState {
        while !matches!(self.step(), SearchState::Found | SearchState::Exhausted) {}
        self.state
    }

    /// Path from start to goal once the search is `Found`.
    pub fn path(&self) -> Option<PathResult> {
        let end = self.found?;
        let mut path = Vec::new();
        let mut current = end;
        while current != NO_PARENT {
            path.push(self.decode(current).0);
            current = self.parent[current as usize];
        }
        path.reverse();
        Some(PathResult {
            path,
            cost: self.g[end as usize],
            expanded: self.expanded,
        })
    }

    fn into_result(self) -> Result<PathResult> {
        self.path().ok_or(TerrainError::PathNotFound {
            start: self.start,
            goal: self.goal,
            expanded: self.expanded,
        })
    }
}

/// Find the cheapest path from `start` to `goal`, both inclusive.
pub fn find_path(grid: &Grid, start: Pos, goal: Pos, costs: &PathCosts) -> Result<PathResult> {
    let mut search = AStar::new(grid, start, goal, costs)?;
    search.run();
    search.into_result()
}

/// Run a batch of searches against the same grid. Results come back in
/// request order whether or not the searches ran in parallel.
pub fn find_paths(
    grid: &Grid,
    requests: &[PathRequest],
    costs: &PathCosts,
    parallel: bool,
) -> Vec<(EdgeId, Result<PathResult>)> {
    let run = |r: &PathRequest| (r.edge, find_path(grid, r.start, r.goal, costs));
    if parallel {
        requests.par_iter().map(run).collect()
    } else {
        requests.iter().map(run).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellFlags;

    fn flat_costs() -> PathCosts {
        PathCosts {
            curve: 0.0,
            ..Default::default()
        }
    }

    fn block(grid: &mut Grid, x: usize, y: usize) {
        grid.cell_mut(x, y).unwrap().mark(CellFlags::BLOCKED);
    }

    fn assert_connected(path: &[Pos]) {
        for w in path.windows(2) {
            assert!(w[0].0.abs_diff(w[1].0) <= 1 && w[0].1.abs_diff(w[1].1) <= 1);
            assert_ne!(w[0], w[1]);
        }
    }

    #[test]
    fn test_uniform_grid_is_octile_optimal() {
        let grid = Grid::create(20, 20);
        let costs = flat_costs();
        let result = find_path(&grid, (2, 3), (15, 9), &costs).unwrap();

        let expected = 7.0 + 6.0 * std::f32::consts::SQRT_2;
        assert!((result.cost - expected).abs() < 1e-3, "cost {}", result.cost);
        assert_eq!(result.path.len(), 14);
        assert_eq!(result.path[0], (2, 3));
        assert_eq!(*result.path.last().unwrap(), (15, 9));
        assert_connected(&result.path);
    }

    #[test]
    fn test_start_equals_goal() {
        let grid = Grid::create(5, 5);
        let result = find_path(&grid, (2, 2), (2, 2), &PathCosts::default()).unwrap();
        assert_eq!(result.path, vec![(2, 2)]);
        assert_eq!(result.cost, 0.0);
    }

    #[test]
    fn test_curve_cost_prefers_straight_runs() {
        let grid = Grid::create(12, 5);
        let result = find_path(&grid, (1, 2), (10, 2), &PathCosts::default()).unwrap();
        assert!(result.path.iter().all(|&(_, y)| y == 2));
        assert!((result.cost - 9.0).abs() < 1e-4);
    }

    #[test]
    fn test_routes_around_walls() {
        let mut grid = Grid::create(10, 10);
        for y in 0..9 {
            block(&mut grid, 5, y);
        }
        let result = find_path(&grid, (1, 1), (8, 1), &flat_costs()).unwrap();
        assert!(result.path.contains(&(5, 9)));
        assert!(result.path.iter().all(|&(x, y)| !grid.cell(x, y).has(CellFlags::BLOCKED)));
        assert_connected(&result.path);
    }

    #[test]
    fn test_enclosed_goal_is_not_found() {
        let mut grid = Grid::create(10, 10);
        for (dx, dy) in NEIGHBORS_8 {
            let (x, y) = ((6 + dx) as usize, (6 + dy) as usize);
            block(&mut grid, x, y);
        }
        let err = find_path(&grid, (1, 1), (6, 6), &PathCosts::default()).unwrap_err();
        assert!(matches!(err, TerrainError::PathNotFound { goal: (6, 6), .. }));
    }

    #[test]
    fn test_level_gap_is_never_crossed_directly() {
        // Level 0 on the left, level 2 on the right, a level 1 landing along the bottom
        let mut grid = Grid::create(20, 12);
        for y in 0..12 {
            for x in 10..20 {
                grid.assign_level(x, y, 2).unwrap();
            }
        }
        for y in 9..12 {
            for x in 7..13 {
                grid.assign_level(x, y, 1).unwrap();
            }
        }

        let result = find_path(&grid, (2, 2), (17, 2), &PathCosts::default()).unwrap();
        let levels: Vec<i32> = result.path.iter().map(|&(x, y)| grid.level_at(x, y)).collect();
        for w in levels.windows(2) {
            assert!((w[1] - w[0]).abs() <= 1, "stepped {} -> {}", w[0], w[1]);
        }
        assert!(levels.contains(&1));
    }

    #[test]
    fn test_unbridgeable_levels_have_no_path() {
        let mut grid = Grid::create(10, 5);
        for y in 0..5 {
            for x in 5..10 {
                grid.assign_level(x, y, 2).unwrap();
            }
        }
        assert!(matches!(
            find_path(&grid, (1, 2), (8, 2), &PathCosts::default()),
            Err(TerrainError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_existing_roads_are_preferred() {
        let mut grid = Grid::create(20, 10);
        // A road one row below the straight line
        for x in 0..20 {
            grid.cell_mut(x, 6).unwrap().mark(CellFlags::ROAD);
        }
        let result = find_path(&grid, (1, 5), (18, 5), &PathCosts::default()).unwrap();
        let on_road = result.path.iter().filter(|&&(x, y)| grid.cell(x, y).is_road()).count();
        assert!(on_road > result.path.len() / 2);
    }

    #[test]
    fn test_node_budget_exhausts() {
        let grid = Grid::create(40, 40);
        let costs = PathCosts {
            node_budget: Some(10),
            ..Default::default()
        };
        let mut search = AStar::new(&grid, (0, 0), (39, 39), &costs).unwrap();
        assert_eq!(search.state(), SearchState::Open);
        assert_eq!(search.run(), SearchState::Exhausted);
        assert_eq!(search.expanded(), 10);
        assert!(search.path().is_none());
    }

    #[test]
    fn test_out_of_bounds_endpoints() {
        let grid = Grid::create(5, 5);
        assert!(matches!(
            find_path(&grid, (0, 0), (5, 0), &PathCosts::default()),
            Err(TerrainError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_batch_matches_sequential_in_order() {
        let mut grid = Grid::create(30, 30);
        for y in 5..25 {
            block(&mut grid, 15, y);
        }
        let requests: Vec<PathRequest> = (0..6)
            .map(|i| PathRequest {
                edge: i,
                start: (1 + i as usize, 2),
                goal: (28, 27 - i as usize),
            })
            .collect();
        let costs = PathCosts::default();

        let sequential = find_paths(&grid, &requests, &costs, false);
        let parallel = find_paths(&grid, &requests, &costs, true);
        assert_eq!(sequential.len(), 6);
        for ((ea, a), (eb, b)) in sequential.iter().zip(&parallel) {
            assert_eq!(ea, eb);
            assert_eq!(a.as_ref().unwrap(), b.as_ref().unwrap());
        }
        let ids: Vec<EdgeId> = parallel.iter().map(|(e, _)| *e).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    }
}
