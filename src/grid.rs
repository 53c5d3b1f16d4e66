//! Cell grid
//!
//! The grid is the single mutable artifact of a generation pass. Each phase
//! takes it by `&mut` in turn, so no two phases ever see it at the same time.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};
use crate::level::LevelConfig;
use crate::tilemap::Tilemap;

/// A grid position (x = column, y = row)
pub type Pos = (usize, usize);

/// Independent per-cell flags packed into a bitfield
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellFlags(u16);

impl CellFlags {
    pub const NONE: CellFlags = CellFlags(0);
    pub const ROAD: CellFlags = CellFlags(1 << 0);
    pub const RAMP: CellFlags = CellFlags(1 << 1);
    pub const WATER: CellFlags = CellFlags(1 << 2);
    pub const UNDERWATER: CellFlags = CellFlags(1 << 3);
    pub const BLOCKED: CellFlags = CellFlags(1 << 4);
    pub const CLIFF: CellFlags = CellFlags(1 << 5);
    pub const PLAYABLE: CellFlags = CellFlags(1 << 6);
    pub const VISUAL_ONLY: CellFlags = CellFlags(1 << 7);
    pub const BOUNDARY: CellFlags = CellFlags(1 << 8);

    const ALL_BITS: u16 = (1 << 9) - 1;

    pub fn bits(self) -> u16 {
        self.0
    }

    /// Rebuild flags from raw bits, dropping unknown bits.
    pub fn from_bits_truncate(bits: u16) -> Self {
        CellFlags(bits & Self::ALL_BITS)
    }

    pub fn contains(self, other: CellFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: CellFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for CellFlags {
    type Output = CellFlags;

    fn bitor(self, rhs: CellFlags) -> CellFlags {
        CellFlags(self.0 | rhs.0)
    }
}

/// Atomic grid unit
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cell {
    /// Discrete level (negative = underwater, 0 = ground, positive = plateau)
    pub level: i32,
    /// Height in world units
    pub height: f32,
    flags: CellFlags,
    /// Road edge that owns this cell, if any
    pub road_id: Option<u32>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            level: 0,
            height: 0.0,
            flags: CellFlags::NONE,
            road_id: None,
        }
    }
}

impl Cell {
    /// Create a cell, rejecting flag sets where a visual-only cell is playable.
    pub fn new(level: i32, height: f32, flags: CellFlags) -> Result<Self> {
        if flags.contains(CellFlags::VISUAL_ONLY) && flags.contains(CellFlags::PLAYABLE) {
            return Err(TerrainError::ConflictingFlags {
                flags: flags.bits(),
                reason: "visual-only cell cannot be playable",
            });
        }
        Ok(Self {
            level,
            height,
            flags,
            road_id: None,
        })
    }

    pub fn flags(&self) -> CellFlags {
        self.flags
    }

    pub fn has(&self, flag: CellFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Set a flag. Marking a cell visual-only also clears playable, and
    /// playable is refused on visual-only cells. Returns whether anything changed.
    pub fn mark(&mut self, flag: CellFlags) -> bool {
        let mut next = self.flags | flag;
        if next.contains(CellFlags::VISUAL_ONLY) {
            next = CellFlags(next.0 & !CellFlags::PLAYABLE.0);
        }
        let changed = next != self.flags;
        self.flags = next;
        changed
    }

    pub fn clear(&mut self, flag: CellFlags) {
        self.flags = CellFlags(self.flags.0 & !flag.0);
    }

    pub fn is_road(&self) -> bool {
        self.has(CellFlags::ROAD)
    }

    pub fn is_ramp(&self) -> bool {
        self.has(CellFlags::RAMP)
    }

    pub fn is_water(&self) -> bool {
        self.has(CellFlags::WATER)
    }

    pub fn is_playable(&self) -> bool {
        self.has(CellFlags::PLAYABLE)
    }

    pub fn is_visual_only(&self) -> bool {
        self.has(CellFlags::VISUAL_ONLY)
    }

    /// Cells a road may be routed through
    pub fn is_passable(&self) -> bool {
        !self.flags.intersects(CellFlags::BLOCKED | CellFlags::BOUNDARY | CellFlags::VISUAL_ONLY)
    }
}

/// Dense grid of cells plus the level model it was built with
#[derive(Clone, Debug)]
pub struct Grid {
    cells: Tilemap<Cell>,
    levels: LevelConfig,
    /// Horizontal size of one cell in world units
    pub cell_size: f32,
}

impl Grid {
    /// Create a grid with every cell at ground level, height 0 and no flags.
    pub fn create(cols: usize, rows: usize) -> Self {
        Self::with_levels(cols, rows, LevelConfig::default(), 100.0)
    }

    pub fn with_levels(cols: usize, rows: usize, levels: LevelConfig, cell_size: f32) -> Self {
        Self {
            cells: Tilemap::new(cols, rows),
            levels,
            cell_size,
        }
    }

    pub fn cols(&self) -> usize {
        self.cells.width
    }

    pub fn rows(&self) -> usize {
        self.cells.height
    }

    pub fn levels(&self) -> &LevelConfig {
        &self.levels
    }

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        self.cells.in_bounds(x, y)
    }

    fn out_of_bounds(&self, x: usize, y: usize) -> TerrainError {
        TerrainError::OutOfBounds {
            x: x as i64,
            y: y as i64,
            cols: self.cols(),
            rows: self.rows(),
        }
    }

    pub fn get_cell(&self, x: usize, y: usize) -> Result<&Cell> {
        self.cells.try_get(x, y).ok_or_else(|| self.out_of_bounds(x, y))
    }

    pub fn cell_mut(&mut self, x: usize, y: usize) -> Result<&mut Cell> {
        if x >= self.cols() || y >= self.rows() {
            return Err(self.out_of_bounds(x, y));
        }
        Ok(self.cells.get_mut(x, y))
    }

    pub fn set_cell(&mut self, x: usize, y: usize, cell: Cell) -> Result<()> {
        *self.cell_mut(x, y)? = cell;
        Ok(())
    }

    /// Unchecked read for loops that already iterate in bounds.
    pub fn cell(&self, x: usize, y: usize) -> &Cell {
        self.cells.get(x, y)
    }

    pub fn level_at(&self, x: usize, y: usize) -> i32 {
        self.cells.get(x, y).level
    }

    /// Assign a level and reset the cell's height and level-derived flags.
    pub fn assign_level(&mut self, x: usize, y: usize, level: i32) -> Result<()> {
        let levels = self.levels;
        let cell = self.cell_mut(x, y)?;
        cell.level = level;
        cell.height = levels.base_height(level);
        cell.clear(CellFlags::WATER | CellFlags::UNDERWATER | CellFlags::VISUAL_ONLY | CellFlags::PLAYABLE);

        if levels.is_underwater(level) {
            cell.mark(CellFlags::WATER | CellFlags::UNDERWATER);
        } else if levels.is_visual_only(level) {
            cell.mark(CellFlags::VISUAL_ONLY);
        } else {
            cell.mark(CellFlags::PLAYABLE);
        }
        Ok(())
    }

    pub fn neighbors(&self, x: usize, y: usize) -> impl Iterator<Item = Pos> + '_ {
        self.cells.neighbors(x, y)
    }

    pub fn offset(&self, pos: Pos, dx: i32, dy: i32) -> Option<Pos> {
        self.cells.offset(pos.0, pos.1, dx, dy)
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Cell)> {
        self.cells.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, usize, &mut Cell)> {
        self.cells.iter_mut()
    }

    pub fn count_flag(&self, flag: CellFlags) -> usize {
        self.cells.iter().filter(|(_, _, c)| c.has(flag)).count()
    }

    /// Dense, serializable copy of the grid for persistence and export.
    pub fn snapshot(&self) -> GridSnapshot {
        let cells = self.cells.as_slice();
        GridSnapshot {
            cols: self.cols(),
            rows: self.rows(),
            cell_size: self.cell_size,
            max_height_difference: self.levels.max_height_difference,
            heights: cells.iter().map(|c| c.height).collect(),
            level_ids: cells.iter().map(|c| c.level).collect(),
            flags: cells.iter().map(|c| c.flags.bits()).collect(),
            road_ids: cells.iter().map(|c| c.road_id).collect(),
            ramp_mask: None,
        }
    }

    /// Rebuild a grid from a snapshot, validating every cell.
    pub fn from_snapshot(snapshot: &GridSnapshot, levels: LevelConfig) -> Result<Self> {
        let n = snapshot.cols * snapshot.rows;
        if snapshot.heights.len() != n
            || snapshot.level_ids.len() != n
            || snapshot.flags.len() != n
            || snapshot.road_ids.len() != n
        {
            return Err(TerrainError::InvalidConfig(format!(
                "snapshot arrays don't match {}x{}",
                snapshot.cols, snapshot.rows
            )));
        }

        let mut cells = Vec::with_capacity(n);
        for i in 0..n {
            let flags = CellFlags::from_bits_truncate(snapshot.flags[i]);
            let mut cell = Cell::new(snapshot.level_ids[i], snapshot.heights[i], flags).map_err(|e| {
                TerrainError::InvalidCell {
                    x: i % snapshot.cols,
                    y: i / snapshot.cols,
                    reason: e.to_string(),
                }
            })?;
            cell.road_id = snapshot.road_ids[i];
            cells.push(cell);
        }

        let cells = Tilemap::from_vec(snapshot.cols, snapshot.rows, cells)
            .ok_or_else(|| TerrainError::InvalidConfig("snapshot size mismatch".into()))?;

        Ok(Self {
            cells,
            levels,
            cell_size: snapshot.cell_size,
        })
    }
}

/// Serializable dense arrays describing a finished grid
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub cols: usize,
    pub rows: usize,
    pub cell_size: f32,
    pub max_height_difference: f32,
    pub heights: Vec<f32>,
    pub level_ids: Vec<i32>,
    pub flags: Vec<u16>,
    pub road_ids: Vec<Option<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ramp_mask: Option<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_defaults() {
        let grid = Grid::create(10, 5);
        assert_eq!(grid.cols(), 10);
        assert_eq!(grid.rows(), 5);

        let cell = grid.get_cell(9, 4).unwrap();
        assert_eq!(cell.level, 0);
        assert_eq!(cell.height, 0.0);
        assert!(cell.flags().is_empty());
        assert!(cell.road_id.is_none());
    }

    #[test]
    fn test_out_of_bounds() {
        let mut grid = Grid::create(10, 5);
        assert!(matches!(grid.get_cell(10, 0), Err(TerrainError::OutOfBounds { x: 10, .. })));
        assert!(matches!(grid.get_cell(0, 5), Err(TerrainError::OutOfBounds { y: 5, .. })));
        assert!(grid.set_cell(11, 11, Cell::default()).is_err());
        assert!(grid.set_cell(3, 3, Cell::default()).is_ok());
    }

    #[test]
    fn test_visual_only_never_playable() {
        assert!(matches!(
            Cell::new(3, 810.0, CellFlags::VISUAL_ONLY | CellFlags::PLAYABLE),
            Err(TerrainError::ConflictingFlags { .. })
        ));

        let mut cell = Cell::new(2, 540.0, CellFlags::PLAYABLE).unwrap();
        cell.mark(CellFlags::VISUAL_ONLY);
        assert!(cell.is_visual_only());
        assert!(!cell.is_playable());

        assert!(!cell.mark(CellFlags::PLAYABLE));
        assert!(!cell.is_playable());
    }

    #[test]
    fn test_assign_level_classifies_cells() {
        let mut grid = Grid::create(4, 1);
        grid.assign_level(0, 0, -1).unwrap();
        grid.assign_level(1, 0, 0).unwrap();
        grid.assign_level(2, 0, 2).unwrap();
        grid.assign_level(3, 0, 3).unwrap();

        assert!(grid.cell(0, 0).is_water());
        assert!(grid.cell(0, 0).has(CellFlags::UNDERWATER));
        assert!(grid.cell(1, 0).is_playable());
        assert_eq!(grid.cell(2, 0).height, 540.0);
        assert!(grid.cell(3, 0).is_visual_only());
        assert!(!grid.cell(3, 0).is_playable());
        assert!(!grid.cell(3, 0).is_passable());
    }

    #[test]
    fn test_marking_is_idempotent() {
        let mut cell = Cell::default();
        assert!(cell.mark(CellFlags::ROAD));
        assert!(!cell.mark(CellFlags::ROAD));
        assert!(cell.is_road());
    }

    #[test]
    fn test_snapshot_json_restores_grid() {
        let mut grid = Grid::create(3, 2);
        grid.assign_level(1, 1, 1).unwrap();
        grid.cell_mut(2, 0).unwrap().mark(CellFlags::ROAD | CellFlags::RAMP);
        grid.cell_mut(2, 0).unwrap().road_id = Some(7);

        let json = serde_json::to_string(&grid.snapshot()).unwrap();
        let snapshot: GridSnapshot = serde_json::from_str(&json).unwrap();
        let restored = Grid::from_snapshot(&snapshot, *grid.levels()).unwrap();

        assert_eq!(restored.cell(1, 1), grid.cell(1, 1));
        assert_eq!(restored.cell(2, 0).road_id, Some(7));
        assert!(restored.cell(2, 0).is_ramp());
    }

    #[test]
    fn test_snapshot_rejects_invalid_cells() {
        let grid = Grid::create(2, 1);
        let mut snapshot = grid.snapshot();
        snapshot.flags[1] = (CellFlags::VISUAL_ONLY | CellFlags::PLAYABLE).bits();
        assert!(matches!(
            Grid::from_snapshot(&snapshot, *grid.levels()),
            Err(TerrainError::InvalidCell { x: 1, y: 0, .. })
        ));
    }
}
