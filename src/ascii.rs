//! ASCII rendering for generated terrain
//!
//! One character per cell: POIs on top, then ramps and roads, then the level.

use crate::grid::{Cell, CellFlags, Grid};
use crate::poi::PoiNode;

/// Character for a cell's level, ignoring roads and ramps.
pub fn level_char(level: i32) -> char {
    match level {
        l if l < 0 => '~',
        0 => '.',
        1 => ':',
        2 => '=',
        _ => '^',
    }
}

pub fn cell_char(cell: &Cell) -> char {
    if cell.is_ramp() {
        '/'
    } else if cell.is_road() {
        '#'
    } else if cell.has(CellFlags::BOUNDARY) {
        ' '
    } else if cell.has(CellFlags::BLOCKED) {
        'X'
    } else {
        level_char(cell.level)
    }
}

/// Render the grid as text, one row per line.
pub fn render_ascii_map(grid: &Grid, pois: &[PoiNode]) -> String {
    let mut rows: Vec<Vec<char>> = (0..grid.rows())
        .map(|y| (0..grid.cols()).map(|x| cell_char(grid.cell(x, y))).collect())
        .collect();

    for poi in pois {
        if let Some(slot) = rows.get_mut(poi.y).and_then(|row| row.get_mut(poi.x)) {
            *slot = poi.poi_type.map_char();
        }
    }

    let mut result = String::with_capacity((grid.cols() + 1) * grid.rows());
    for row in rows {
        result.extend(row);
        result.push('\n');
    }
    result
}

pub fn legend() -> String {
    [
        "~ underwater   . ground   : level 1   = level 2   ^ visual-only peak",
        "# road   / ramp   X blocked   T town   D dungeon   E exit   P portal",
    ]
    .join("\n")
}
