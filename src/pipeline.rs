//! Generation pipeline
//!
//! Runs the phases in their fixed order: grid, levels, POIs, road graph,
//! per-edge pathfinding with ramp baking, ramp mask, road rasterization, cliff
//! marking and finally masked surface detail. Each phase owns the grid
//! exclusively while it runs.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::ascii;
use crate::config::{PoiConfig, RoadConfig, SlopeConfig, TerrainConfig};
use crate::error::{Result, TerrainError};
use crate::grid::{CellFlags, Grid, GridSnapshot, Pos};
use crate::level::LevelConfig;
use crate::pathfinder::{find_path, find_paths, PathRequest, PathResult};
use crate::plateaus::{apply_surface_detail, assign_levels};
use crate::poi::{place_pois, PlacementReport, PoiId, PoiNode};
use crate::ramp::{bake_ramp, generate_ramps, RampSegment};
use crate::ramp_mask::{compute_ramp_mask, MaskedHeightWriter, RampMask};
use crate::road::{mark_cliffs, mark_road, simplify_on_grid};
use crate::road_graph::{build_road_graph, EdgeId, EdgeKind, RoadEdge, RoadGraph};
use crate::seeds::TerrainSeeds;

/// A routed road edge
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoadRoute {
    pub edge: EdgeId,
    pub kind: EdgeKind,
    pub a: PoiId,
    pub b: PoiId,
    /// Every cell the search walked through, start to goal
    pub path: Vec<Pos>,
    /// Simplified polyline the road was rasterized from
    pub centerline: Vec<Pos>,
    pub cost: f32,
    pub ramps: usize,
}

/// A tree edge that could not be routed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeFailure {
    pub edge: EdgeId,
    pub a: PoiId,
    pub b: PoiId,
    pub reason: String,
}

/// What the pathfinding and ramp phases produced
#[derive(Clone, Debug, Default)]
pub struct RoadNetwork {
    pub routes: Vec<RoadRoute>,
    pub ramps: Vec<RampSegment>,
    pub dropped_loops: Vec<EdgeId>,
    pub failures: Vec<EdgeFailure>,
}

/// Summary of a generation pass
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenerationReport {
    pub pois_requested: usize,
    pub pois_placed: usize,
    /// Placement attempts repeated with a smaller count
    pub poi_retries: usize,
    pub level_counts: BTreeMap<i32, usize>,
    pub tree_edges: usize,
    pub loop_edges: usize,
    pub routed_edges: usize,
    pub dropped_loops: Vec<EdgeId>,
    pub failed_edges: Vec<EdgeFailure>,
    pub ramps: usize,
    pub road_cells: usize,
    pub ramp_cells: usize,
    pub cliff_cells: usize,
    pub masked_cells: usize,
    pub detail_cells: usize,
}

impl GenerationReport {
    /// Every tree edge got a road.
    pub fn is_fully_connected(&self) -> bool {
        self.failed_edges.is_empty()
    }
}

impl std::fmt::Display for GenerationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "POIs: {} placed of {} requested", self.pois_placed, self.pois_requested)?;
        writeln!(
            f,
            "Edges: {} tree, {} loop, {} routed, {} loops dropped, {} failed",
            self.tree_edges,
            self.loop_edges,
            self.routed_edges,
            self.dropped_loops.len(),
            self.failed_edges.len()
        )?;
        writeln!(
            f,
            "Cells: {} road, {} ramp ({} ramps), {} cliff, {} masked, {} with detail",
            self.road_cells, self.ramp_cells, self.ramps, self.cliff_cells, self.masked_cells, self.detail_cells
        )?;
        for failure in &self.failed_edges {
            writeln!(f, "  edge {} ({} - {}): {}", failure.edge, failure.a, failure.b, failure.reason)?;
        }
        Ok(())
    }
}

/// Everything a generation pass produced
pub struct GeneratedTerrain {
    pub seeds: TerrainSeeds,
    pub grid: Grid,
    pub pois: Vec<PoiNode>,
    pub graph: RoadGraph,
    pub routes: Vec<RoadRoute>,
    pub ramps: Vec<RampSegment>,
    pub mask: RampMask,
    pub report: GenerationReport,
}

/// Serializable form of a finished pass
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TerrainExport {
    pub master_seed: u64,
    pub report: GenerationReport,
    pub pois: Vec<PoiNode>,
    pub edges: Vec<RoadEdge>,
    pub routes: Vec<RoadRoute>,
    pub grid: GridSnapshot,
}

impl GeneratedTerrain {
    /// Grid snapshot including the ramp mask.
    pub fn snapshot(&self) -> GridSnapshot {
        let mut snapshot = self.grid.snapshot();
        snapshot.ramp_mask = Some(self.mask.values().as_slice().to_vec());
        snapshot
    }

    pub fn export(&self) -> TerrainExport {
        TerrainExport {
            master_seed: self.seeds.master,
            report: self.report.clone(),
            pois: self.pois.clone(),
            edges: self.graph.edges.clone(),
            routes: self.routes.clone(),
            grid: self.snapshot(),
        }
    }

    pub fn render_ascii(&self) -> String {
        ascii::render_ascii_map(&self.grid, &self.pois)
    }
}

/// Place POIs, lowering the count while the spacing makes it infeasible.
fn place_with_retry(grid: &Grid, config: &PoiConfig, seed: u64, report: &mut GenerationReport) -> Result<PlacementReport> {
    let mut config = config.clone();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    loop {
        match place_pois(grid, &config, &mut rng) {
            Err(TerrainError::PlacementInfeasible { requested, capacity, .. }) if requested > 0 => {
                let next = capacity.min(requested - 1);
                tracing::warn!("  {} POIs don't fit (capacity {}), retrying with {}", requested, capacity, next);
                config.count = next;
                report.poi_retries += 1;
            }
            other => return other,
        }
    }
}

/// Ramps along a path, retrying once with twice the transition budget.
fn ramps_with_retry(grid: &Grid, path: &[Pos], slope: &SlopeConfig) -> Result<Vec<RampSegment>> {
    match generate_ramps(grid, path, slope) {
        Err(TerrainError::HeightDifferenceExceeded { .. }) => {
            let relaxed = SlopeConfig {
                max_transition_cells: slope.max_transition_cells * 2,
                ..slope.clone()
            };
            tracing::debug!(max_cells = relaxed.max_transition_cells, "retrying ramps with a longer budget");
            generate_ramps(grid, path, &relaxed)
        }
        other => other,
    }
}

/// Turn one search result into a baked road, or record why it couldn't be.
fn settle_edge(
    grid: &mut Grid,
    edge: &RoadEdge,
    found: Result<PathResult>,
    config: &TerrainConfig,
    network: &mut RoadNetwork,
) -> Result<()> {
    let outcome = found.and_then(|result| {
        let ramps = ramps_with_retry(grid, &result.path, &config.slope)?;
        Ok((result, ramps))
    });

    match outcome {
        Ok((result, ramps)) => {
            for ramp in &ramps {
                bake_ramp(grid, ramp, edge.id)?;
            }
            // The bare route, so later searches can reuse it
            mark_road(grid, &result.path, 1.0, edge.id)?;

            network.routes.push(RoadRoute {
                edge: edge.id,
                kind: edge.kind,
                a: edge.a,
                b: edge.b,
                path: result.path,
                centerline: Vec::new(),
                cost: result.cost,
                ramps: ramps.len(),
            });
            network.ramps.extend(ramps);
        }
        Err(e @ (TerrainError::PathNotFound { .. } | TerrainError::HeightDifferenceExceeded { .. })) => match edge.kind {
            EdgeKind::Loop => {
                tracing::debug!(edge = edge.id, "dropping loop edge: {}", e);
                network.dropped_loops.push(edge.id);
            }
            EdgeKind::Tree => {
                tracing::warn!("  Edge {} ({} - {}) has no road: {}", edge.id, edge.a, edge.b, e);
                network.failures.push(EdgeFailure {
                    edge: edge.id,
                    a: edge.a,
                    b: edge.b,
                    reason: e.to_string(),
                });
            }
        },
        Err(e) => return Err(e),
    }
    Ok(())
}

/// Pathfinding and ramp phases: route every graph edge in edge id order and
/// bake its ramps and bare route into the grid.
///
/// In parallel mode all searches run first against the grid as it was when
/// the phase began; results are then settled one by one in edge id order.
pub fn build_roads(grid: &mut Grid, pois: &[PoiNode], graph: &RoadGraph, config: &TerrainConfig) -> Result<RoadNetwork> {
    let mut network = RoadNetwork::default();
    let endpoints = |e: &RoadEdge| (pois[e.a as usize].pos(), pois[e.b as usize].pos());

    if config.roads.parallel {
        let requests: Vec<PathRequest> = graph
            .edges
            .iter()
            .map(|e| {
                let (start, goal) = endpoints(e);
                PathRequest { edge: e.id, start, goal }
            })
            .collect();
        let results = find_paths(grid, &requests, &config.costs, true);
        for (edge, (_, found)) in graph.edges.iter().zip(results) {
            settle_edge(grid, edge, found, config, &mut network)?;
        }
    } else {
        for edge in &graph.edges {
            let (start, goal) = endpoints(edge);
            let found = find_path(grid, start, goal, &config.costs);
            settle_edge(grid, edge, found, config, &mut network)?;
        }
    }

    tracing::info!(
        "  Routed {} of {} edges with {} ramps",
        network.routes.len(),
        graph.edges.len(),
        network.ramps.len()
    );
    Ok(network)
}

/// Rasterization phase: simplify each route (ramp cells and level crossings
/// kept exactly, no shortcut off the route's level) and widen it to the road
/// width. Returns newly flagged cells.
pub fn rasterize_roads(grid: &mut Grid, routes: &mut [RoadRoute], roads: &RoadConfig) -> Result<usize> {
    let mut newly = 0;
    for route in routes.iter_mut() {
        let centerline = simplify_on_grid(grid, &route.path, roads.simplify_epsilon);
        newly += mark_road(grid, &centerline, roads.width, route.edge)?;
        route.centerline = centerline;
    }
    Ok(newly)
}

/// Run a full generation pass.
pub fn generate(config: &TerrainConfig, seeds: &TerrainSeeds) -> Result<GeneratedTerrain> {
    config.validate()?;
    tracing::info!("Generating {}x{} terrain with {}", config.grid.cols, config.grid.rows, seeds);

    let mut report = GenerationReport {
        pois_requested: config.pois.count,
        ..Default::default()
    };

    let levels = LevelConfig::from_settings(&config.levels);
    let mut grid = Grid::with_levels(config.grid.cols, config.grid.rows, levels, config.grid.cell_size);

    tracing::info!("Assigning levels...");
    let stats = assign_levels(&mut grid, &config.levels, config.grid.boundary_margin, seeds.levels)?;
    report.level_counts = stats.counts;

    tracing::info!("Placing POIs...");
    let placement = place_with_retry(&grid, &config.pois, seeds.pois, &mut report)?;
    report.pois_placed = placement.placed;
    let pois = placement.pois;

    tracing::info!("Building road graph...");
    let graph = build_road_graph(&pois, &config.roads);
    report.tree_edges = graph.tree_edges().count();
    report.loop_edges = graph.loop_edges().count();

    tracing::info!("Routing roads...");
    let RoadNetwork {
        mut routes,
        ramps,
        dropped_loops,
        failures,
    } = build_roads(&mut grid, &pois, &graph, config)?;

    tracing::info!("Computing ramp mask...");
    let mask = compute_ramp_mask(&grid, &config.mask);

    tracing::info!("Rasterizing roads...");
    rasterize_roads(&mut grid, &mut routes, &config.roads)?;
    report.cliff_cells = mark_cliffs(&mut grid)?;

    tracing::info!("Adding surface detail...");
    report.detail_cells = {
        let mut writer = MaskedHeightWriter::new(&mut grid, &mask);
        apply_surface_detail(&mut writer, seeds.detail)?
    };

    report.routed_edges = routes.len();
    report.dropped_loops = dropped_loops;
    report.failed_edges = failures;
    report.ramps = ramps.len();
    report.road_cells = grid.count_flag(CellFlags::ROAD);
    report.ramp_cells = grid.count_flag(CellFlags::RAMP);
    report.masked_cells = mask.covered_cells();

    if report.is_fully_connected() {
        tracing::info!("Done: {} roads, {} ramps", report.routed_edges, report.ramps);
    } else {
        tracing::warn!("Done with {} unrouted tree edges", report.failed_edges.len());
    }

    Ok(GeneratedTerrain {
        seeds: seeds.clone(),
        grid,
        pois,
        graph,
        routes,
        ramps,
        mask,
        report,
    })
}
