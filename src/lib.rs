//! Multi-level terrain generation library
//!
//! Builds a playable grid of discrete height levels, places POIs, connects
//! them with a road network routed by level-aware A*, and carves ramps whose
//! slope progresses from walkable to effectively unclimbable. Re-exports
//! modules for use by binaries and tools.

pub mod ascii;
pub mod config;
pub mod error;
pub mod grid;
pub mod level;
pub mod pathfinder;
pub mod pipeline;
pub mod plateaus;
pub mod poi;
pub mod ramp;
pub mod ramp_mask;
pub mod road;
pub mod road_graph;
pub mod seeds;
pub mod slope;
pub mod tilemap;

pub use config::TerrainConfig;
pub use error::{Result, TerrainError};
pub use grid::{Cell, CellFlags, Grid, GridSnapshot, Pos};
pub use pipeline::{generate, GeneratedTerrain, GenerationReport};
pub use seeds::TerrainSeeds;
