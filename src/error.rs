//! Error types for terrain generation
//!
//! Every variant is recoverable at the call site; the pipeline decides whether to
//! retry with relaxed parameters or report the failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("cell ({x}, {y}) is outside the {cols}x{rows} grid")]
    OutOfBounds {
        x: i64,
        y: i64,
        cols: usize,
        rows: usize,
    },

    #[error("cannot place {requested} POIs with spacing {min_spacing:.1} (capacity about {capacity})")]
    PlacementInfeasible {
        requested: usize,
        capacity: usize,
        min_spacing: f32,
    },

    #[error("no admissible path from {start:?} to {goal:?} ({expanded} nodes expanded)")]
    PathNotFound {
        start: (usize, usize),
        goal: (usize, usize),
        expanded: usize,
    },

    #[error("ramp from level {from_level} to level {to_level} cannot be bridged: {limit}")]
    HeightDifferenceExceeded {
        from_level: i32,
        to_level: i32,
        limit: RampLimit,
    },

    #[error("conflicting cell flags {flags:#06x}: {reason}")]
    ConflictingFlags { flags: u16, reason: &'static str },

    #[error("invalid cell at ({x}, {y}): {reason}")]
    InvalidCell { x: usize, y: usize, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which bound a rejected ramp ran into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RampLimit {
    /// The two levels are further apart than the max height difference.
    LevelGap { delta: f32, max: f32 },
    /// The path doesn't have enough cells for the transition.
    TooShort { required: usize, available: usize },
    /// A single step would be steeper than the end angle.
    StepTooSteep { step: usize, angle_deg: f32, max_deg: f32 },
}

impl std::fmt::Display for RampLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RampLimit::LevelGap { delta, max } => {
                write!(f, "height delta {:.1} exceeds {:.1}", delta, max)
            }
            RampLimit::TooShort { required, available } => {
                write!(f, "needs {} cells, only {} available", required, available)
            }
            RampLimit::StepTooSteep { step, angle_deg, max_deg } => {
                write!(f, "step {} rises at {:.1} deg (max {:.1})", step, angle_deg, max_deg)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TerrainError>;
