//! Road graph construction
//!
//! Connects every POI with a minimum spanning tree (Prim's algorithm over the
//! complete Euclidean graph), then adds a few short loop edges where the tree
//! route between two POIs is much longer than the direct connection.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::config::RoadConfig;
use crate::poi::{PoiId, PoiNode};

pub type EdgeId = u32;

/// Whether an edge belongs to the spanning tree or was added for redundancy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    Tree,
    Loop,
}

/// An undirected weighted edge between two POIs (`a < b`)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoadEdge {
    pub id: EdgeId,
    pub a: PoiId,
    pub b: PoiId,
    /// Straight-line distance in cells
    pub length: f32,
    /// Length with the level penalty applied
    pub weight: f32,
    pub kind: EdgeKind,
}

/// POIs as vertices, roads as edges
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RoadGraph {
    pub node_count: usize,
    pub edges: Vec<RoadEdge>,
}

/// Candidate edge for the priority queue
#[derive(Clone, Copy)]
struct Candidate {
    weight: f32,
    a: PoiId,
    b: PoiId,
}

impl Candidate {
    fn key(&self) -> (PoiId, PoiId) {
        (self.a.min(self.b), self.a.max(self.b))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap; equal weights go to the lower id pair
        other
            .weight
            .total_cmp(&self.weight)
            .then_with(|| other.key().cmp(&self.key()))
    }
}

/// Edge weight: Euclidean length, penalized per level of difference.
pub fn edge_weight(a: &PoiNode, b: &PoiNode, level_penalty: f32) -> f32 {
    let levels = (a.level - b.level).unsigned_abs() as f32;
    a.distance_to(b) * (1.0 + level_penalty * levels)
}

/// Compute the minimum spanning tree as `(from, to)` index pairs, in the order
/// Prim's algorithm adds them.
pub fn compute_mst(pois: &[PoiNode], level_penalty: f32) -> Vec<(usize, usize)> {
    let n = pois.len();
    if n < 2 {
        return Vec::new();
    }

    let mut in_mst = vec![false; n];
    let mut mst_edges = Vec::with_capacity(n - 1);
    let mut pq = BinaryHeap::new();

    // Start from the lowest id
    in_mst[0] = true;
    for j in 1..n {
        pq.push(Candidate {
            weight: edge_weight(&pois[0], &pois[j], level_penalty),
            a: 0,
            b: j as PoiId,
        });
    }

    while mst_edges.len() < n - 1 {
        let Some(Candidate { a, b, .. }) = pq.pop() else {
            break;
        };
        let to = b as usize;
        if in_mst[to] {
            continue;
        }

        in_mst[to] = true;
        mst_edges.push((a as usize, to));

        for j in 0..n {
            if !in_mst[j] {
                pq.push(Candidate {
                    weight: edge_weight(&pois[to], &pois[j], level_penalty),
                    a: to as PoiId,
                    b: j as PoiId,
                });
            }
        }
    }

    mst_edges
}

impl RoadGraph {
    /// Adjacency list of (neighbor, edge weight)
    fn adjacency(&self) -> Vec<Vec<(usize, f32)>> {
        let mut adj = vec![Vec::new(); self.node_count];
        for e in &self.edges {
            adj[e.a as usize].push((e.b as usize, e.weight));
            adj[e.b as usize].push((e.a as usize, e.weight));
        }
        adj
    }

    pub fn degree(&self, node: PoiId) -> usize {
        self.edges.iter().filter(|e| e.a == node || e.b == node).count()
    }

    pub fn contains_edge(&self, a: PoiId, b: PoiId) -> bool {
        let (a, b) = (a.min(b), a.max(b));
        self.edges.iter().any(|e| e.a == a && e.b == b)
    }

    /// Every vertex reachable from vertex 0.
    pub fn is_connected(&self) -> bool {
        if self.node_count == 0 {
            return true;
        }
        let adj = self.adjacency();
        let mut seen = vec![false; self.node_count];
        let mut queue = VecDeque::from([0usize]);
        seen[0] = true;
        while let Some(u) = queue.pop_front() {
            for &(v, _) in &adj[u] {
                if !seen[v] {
                    seen[v] = true;
                    queue.push_back(v);
                }
            }
        }
        seen.into_iter().all(|s| s)
    }

    pub fn total_weight(&self) -> f32 {
        self.edges.iter().map(|e| e.weight).sum()
    }

    /// Weight of the shortest route between two vertices over existing edges.
    pub fn route_weight(&self, from: PoiId, to: PoiId) -> Option<f32> {
        let adj = self.adjacency();
        let mut dist = vec![f32::INFINITY; self.node_count];
        let mut pq = BinaryHeap::new();
        dist[from as usize] = 0.0;
        pq.push(Candidate {
            weight: 0.0,
            a: from,
            b: from,
        });

        while let Some(Candidate { weight, b: u, .. }) = pq.pop() {
            if u == to {
                return Some(weight);
            }
            if weight > dist[u as usize] {
                continue;
            }
            for &(v, w) in &adj[u as usize] {
                let next = weight + w;
                if next < dist[v] {
                    dist[v] = next;
                    pq.push(Candidate {
                        weight: next,
                        a: u,
                        b: v as PoiId,
                    });
                }
            }
        }
        None
    }

    fn push_edge(&mut self, pois: &[PoiNode], i: usize, j: usize, level_penalty: f32, kind: EdgeKind) {
        let (a, b) = (i.min(j), i.max(j));
        self.edges.push(RoadEdge {
            id: self.edges.len() as EdgeId,
            a: pois[a].id,
            b: pois[b].id,
            length: pois[a].distance_to(&pois[b]),
            weight: edge_weight(&pois[a], &pois[b], level_penalty),
            kind,
        });
    }

    pub fn tree_edges(&self) -> impl Iterator<Item = &RoadEdge> {
        self.edges.iter().filter(|e| e.kind == EdgeKind::Tree)
    }

    pub fn loop_edges(&self) -> impl Iterator<Item = &RoadEdge> {
        self.edges.iter().filter(|e| e.kind == EdgeKind::Loop)
    }
}

/// Build the road graph: MST plus up to `extra_edges` loop edges.
///
/// POI ids must equal their index in `pois`.
pub fn build_road_graph(pois: &[PoiNode], config: &RoadConfig) -> RoadGraph {
    debug_assert!(pois.iter().enumerate().all(|(i, p)| p.id as usize == i));

    let mut graph = RoadGraph {
        node_count: pois.len(),
        edges: Vec::new(),
    };

    for (i, j) in compute_mst(pois, config.level_penalty) {
        graph.push_edge(pois, i, j, config.level_penalty, EdgeKind::Tree);
    }

    if config.extra_edges > 0 {
        let mut candidates: Vec<Candidate> = Vec::new();
        for i in 0..pois.len() {
            for j in (i + 1)..pois.len() {
                if !graph.contains_edge(i as PoiId, j as PoiId) {
                    candidates.push(Candidate {
                        weight: edge_weight(&pois[i], &pois[j], config.level_penalty),
                        a: i as PoiId,
                        b: j as PoiId,
                    });
                }
            }
        }
        // Ascending by weight, then id pair
        candidates.sort_by(|x, y| y.cmp(x));

        let mut added = 0;
        for c in candidates {
            if added >= config.extra_edges {
                break;
            }
            // Skip pairs the graph already connects with a reasonably short route
            let existing = graph.route_weight(c.a, c.b).unwrap_or(f32::INFINITY);
            if existing <= c.weight * config.loop_ratio {
                continue;
            }
            graph.push_edge(pois, c.a as usize, c.b as usize, config.level_penalty, EdgeKind::Loop);
            added += 1;
        }
    }

    tracing::info!(
        "  Road graph: {} tree edges, {} loop edges, total weight {:.1}",
        graph.tree_edges().count(),
        graph.loop_edges().count(),
        graph.total_weight()
    );
    graph
}
