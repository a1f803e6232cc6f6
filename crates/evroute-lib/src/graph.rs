//! Station graph construction and graph-level queries.
//!
//! The graph is undirected: every edge is stored in the adjacency list of
//! both endpoints. Node and adjacency storage sit behind [`Arc`], so cloning a
//! [`Graph`] is cheap and mutations on the clone (virtual node insertion,
//! removal, filtering) copy the storage first. A planning call that clones the
//! caller's graph therefore works on a private snapshot and can never leak
//! virtual nodes into unrelated queries.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geo::Coordinate;
use crate::station::{Station, StationCatalog};

/// Dense identifier of a node inside one [`Graph`].
pub type NodeId = u32;

/// How station nodes are connected when building the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NeighborSelection {
    /// Connect each node to its `k` nearest other nodes.
    Nearest(usize),
    /// Connect every pair of nodes closer than the given distance in km.
    WithinDistance(f64),
}

/// Options controlling graph construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphBuildOptions {
    pub neighbors: NeighborSelection,
    /// Average speed used to derive edge travel times.
    pub avg_speed_kmh: f64,
}

impl Default for GraphBuildOptions {
    fn default() -> Self {
        Self {
            neighbors: NeighborSelection::Nearest(8),
            avg_speed_kmh: 60.0,
        }
    }
}

/// Options controlling how a virtual node is attached to the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualNodeOptions {
    /// Maximum number of existing nodes to connect to.
    pub k_neighbors: usize,
    /// Only nodes closer than this are connected.
    pub max_dist_km: f64,
}

impl Default for VirtualNodeOptions {
    fn default() -> Self {
        Self {
            k_neighbors: 8,
            max_dist_km: 100.0,
        }
    }
}

/// Road-class filter applied before searching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeFilter {
    pub avoid_highway: bool,
    pub avoid_toll: bool,
}

impl EdgeFilter {
    pub fn is_empty(&self) -> bool {
        !self.avoid_highway && !self.avoid_toll
    }

    fn allows(&self, edge: &Edge) -> bool {
        !(self.avoid_highway && edge.is_highway) && !(self.avoid_toll && edge.toll)
    }
}

/// Node within the routing graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    #[serde(skip)]
    pub id: NodeId,
    /// Station identifier, or the synthetic id of a virtual node.
    pub key: String,
    pub name: String,
    pub coordinate: Coordinate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_kw: Option<f64>,
    pub is_virtual: bool,
}

/// Edge within the routing graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub target: NodeId,
    /// Haversine distance between the endpoints in km.
    pub distance_km: f64,
    /// Travel time at the graph's average speed, in hours.
    pub travel_time_h: f64,
    pub is_highway: bool,
    pub toll: bool,
}

/// Result of a graph shortest-path query.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortestPath {
    pub distance_km: f64,
    /// Nodes from source to target, both inclusive.
    pub nodes: Vec<NodeId>,
}

/// Graph structure used by search and simulation.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Arc<BTreeMap<NodeId, Node>>,
    adjacency: Arc<HashMap<NodeId, Vec<Edge>>>,
    lookup: Arc<HashMap<String, NodeId>>,
    next_id: NodeId,
    avg_speed_kmh: f64,
}

impl Default for Graph {
    fn default() -> Self {
        Self {
            nodes: Arc::new(BTreeMap::new()),
            adjacency: Arc::new(HashMap::new()),
            lookup: Arc::new(HashMap::new()),
            next_id: 0,
            avg_speed_kmh: GraphBuildOptions::default().avg_speed_kmh,
        }
    }
}

/// Build the station graph using the requested neighbour selection.
pub fn build_graph(stations: &[Station], options: &GraphBuildOptions) -> Graph {
    let mut graph = Graph {
        avg_speed_kmh: options.avg_speed_kmh,
        ..Graph::default()
    };

    {
        let nodes = Arc::make_mut(&mut graph.nodes);
        let lookup = Arc::make_mut(&mut graph.lookup);
        let adjacency = Arc::make_mut(&mut graph.adjacency);
        for station in stations {
            let id = graph.next_id;
            graph.next_id += 1;
            lookup.insert(station.id.clone(), id);
            adjacency.insert(id, Vec::new());
            nodes.insert(
                id,
                Node {
                    id,
                    key: station.id.clone(),
                    name: station.name.clone(),
                    coordinate: station.coordinate,
                    power_kw: station.power_kw,
                    is_virtual: false,
                },
            );
        }
    }

    let positioned: Vec<(NodeId, Coordinate)> = graph
        .nodes
        .values()
        .map(|node| (node.id, node.coordinate))
        .collect();

    match options.neighbors {
        NeighborSelection::Nearest(k) => {
            for &(id, coordinate) in &positioned {
                let mut candidates: Vec<(NodeId, f64)> = positioned
                    .iter()
                    .filter(|(other, _)| *other != id)
                    .map(|(other, other_coord)| (*other, coordinate.distance_to(other_coord)))
                    .collect();
                candidates.sort_by(|a, b| compare_distance(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
                for (other, distance) in candidates.into_iter().take(k) {
                    if !graph.has_edge(id, other) {
                        graph.connect(id, other, distance);
                    }
                }
            }
        }
        NeighborSelection::WithinDistance(max_edge_km) => {
            for (i, &(a, coord_a)) in positioned.iter().enumerate() {
                for &(b, coord_b) in &positioned[i + 1..] {
                    let distance = coord_a.distance_to(&coord_b);
                    if distance <= max_edge_km {
                        graph.connect(a, b, distance);
                    }
                }
            }
        }
    }

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        mode = ?options.neighbors,
        "built station graph"
    );
    graph
}

impl Graph {
    /// Build a graph from every station in the catalog.
    pub fn from_catalog(catalog: &StationCatalog, options: &GraphBuildOptions) -> Self {
        build_graph(catalog.stations(), options)
    }

    /// Average speed used for edge travel times.
    pub fn avg_speed_kmh(&self) -> f64 {
        self.avg_speed_kmh
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum::<usize>() / 2
    }

    /// Iterate nodes in ascending identifier order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Resolve a station or virtual-node key to its node identifier.
    pub fn node_id(&self, key: &str) -> Option<NodeId> {
        self.lookup.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lookup.contains_key(key)
    }

    /// Key of a node, or an empty string if it does not exist.
    pub fn key(&self, id: NodeId) -> &str {
        self.nodes.get(&id).map(|n| n.key.as_str()).unwrap_or("")
    }

    /// Return the neighbours for a given node.
    pub fn neighbours(&self, id: NodeId) -> &[Edge] {
        self.adjacency.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edge connecting `from` and `to`, if any.
    pub fn edge(&self, from: NodeId, to: NodeId) -> Option<&Edge> {
        self.neighbours(from).iter().find(|edge| edge.target == to)
    }

    fn has_edge(&self, a: NodeId, b: NodeId) -> bool {
        self.edge(a, b).is_some()
    }

    fn connect(&mut self, a: NodeId, b: NodeId, distance_km: f64) {
        let travel_time_h = if self.avg_speed_kmh > 0.0 {
            distance_km / self.avg_speed_kmh
        } else {
            0.0
        };
        let adjacency = Arc::make_mut(&mut self.adjacency);
        for (from, to) in [(a, b), (b, a)] {
            adjacency.entry(from).or_default().push(Edge {
                target: to,
                distance_km,
                travel_time_h,
                is_highway: false,
                toll: false,
            });
        }
    }

    /// Return a copy of the graph without edges rejected by `filter`.
    pub fn filtered(&self, filter: &EdgeFilter) -> Graph {
        let mut graph = self.clone();
        if filter.is_empty() {
            return graph;
        }
        for edges in Arc::make_mut(&mut graph.adjacency).values_mut() {
            edges.retain(|edge| filter.allows(edge));
        }
        graph
    }

    /// Insert a virtual node at `coordinate`, connecting it to up to
    /// `k_neighbors` existing nodes within `max_dist_km`, closest first.
    pub fn add_virtual_node(
        &mut self,
        key: &str,
        coordinate: Coordinate,
        options: &VirtualNodeOptions,
    ) -> Result<NodeId> {
        if self.contains(key) {
            return Err(Error::DuplicateNode {
                id: key.to_string(),
            });
        }

        let mut candidates = self.nodes_within(coordinate, options.max_dist_km, None);
        candidates.truncate(options.k_neighbors);

        let id = self.next_id;
        self.next_id += 1;
        Arc::make_mut(&mut self.lookup).insert(key.to_string(), id);
        Arc::make_mut(&mut self.adjacency).insert(id, Vec::new());
        Arc::make_mut(&mut self.nodes).insert(
            id,
            Node {
                id,
                key: key.to_string(),
                name: key.to_string(),
                coordinate,
                power_kw: None,
                is_virtual: true,
            },
        );
        for (other, distance) in candidates {
            self.connect(id, other, distance);
        }

        debug!(
            key,
            neighbours = self.neighbours(id).len(),
            "inserted virtual node"
        );
        Ok(id)
    }

    /// Remove a virtual node and every edge touching it.
    ///
    /// Returns `false` if `key` is unknown or names a curated station.
    pub fn remove_virtual_node(&mut self, key: &str) -> bool {
        let Some(id) = self.node_id(key) else {
            return false;
        };
        if !self.nodes.get(&id).map(|n| n.is_virtual).unwrap_or(false) {
            return false;
        }

        let adjacency = Arc::make_mut(&mut self.adjacency);
        let edges = adjacency.remove(&id).unwrap_or_default();
        for edge in edges {
            if let Some(back) = adjacency.get_mut(&edge.target) {
                back.retain(|e| e.target != id);
            }
        }
        Arc::make_mut(&mut self.nodes).remove(&id);
        Arc::make_mut(&mut self.lookup).remove(key);
        debug!(key, "removed virtual node");
        true
    }

    /// Insert a virtual node, run `f`, and remove the node again.
    pub fn with_virtual_node<T>(
        &mut self,
        key: &str,
        coordinate: Coordinate,
        options: &VirtualNodeOptions,
        f: impl FnOnce(&Graph, NodeId) -> T,
    ) -> Result<T> {
        let id = self.add_virtual_node(key, coordinate, options)?;
        let result = f(self, id);
        self.remove_virtual_node(key);
        Ok(result)
    }

    /// Generate a node key derived from `base` that is not yet in use
    /// (`base`, `base_1`, `base_2`, ...).
    pub fn unique_node_key(&self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut suffix = 0usize;
        while self.contains(&candidate) {
            suffix += 1;
            candidate = format!("{base}_{suffix}");
        }
        candidate
    }

    /// Closest node to `coordinate`, if it lies within `radius_km`.
    pub fn nearest_station(&self, coordinate: Coordinate, radius_km: f64) -> Option<(&Node, f64)> {
        let mut best: Option<(&Node, f64)> = None;
        for node in self.nodes.values() {
            let distance = coordinate.distance_to(&node.coordinate);
            if best.map(|(_, d)| distance < d).unwrap_or(true) {
                best = Some((node, distance));
            }
        }
        best.filter(|(_, distance)| *distance <= radius_km)
    }

    /// Nodes within `radius_km` of `coordinate`, sorted by straight-line
    /// distance and then by identifier.
    pub fn nodes_within(
        &self,
        coordinate: Coordinate,
        radius_km: f64,
        exclude: Option<NodeId>,
    ) -> Vec<(NodeId, f64)> {
        let mut found: Vec<(NodeId, f64)> = self
            .nodes
            .values()
            .filter(|node| Some(node.id) != exclude)
            .map(|node| (node.id, coordinate.distance_to(&node.coordinate)))
            .filter(|(_, distance)| *distance <= radius_km)
            .collect();
        found.sort_by(|a, b| compare_distance(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
        found
    }

    /// Shortest path by edge distance between two nodes.
    pub fn shortest_path(&self, from: NodeId, to: NodeId) -> Option<ShortestPath> {
        self.shortest_paths(from, &[to]).remove(&to)
    }

    /// Run Dijkstra from `source` until every reachable target is settled.
    ///
    /// Unreachable targets are absent from the returned map.
    pub fn shortest_paths(
        &self,
        source: NodeId,
        targets: &[NodeId],
    ) -> HashMap<NodeId, ShortestPath> {
        let mut results = HashMap::new();
        if !self.nodes.contains_key(&source) {
            return results;
        }

        let mut pending: HashSet<NodeId> = targets.iter().copied().collect();
        let mut distances: HashMap<NodeId, f64> = HashMap::new();
        let mut parents: HashMap<NodeId, Option<NodeId>> = HashMap::new();
        let mut queue = BinaryHeap::new();

        distances.insert(source, 0.0);
        parents.insert(source, None);
        queue.push(QueueEntry::new(source, 0.0));

        while let Some(entry) = queue.pop() {
            if pending.is_empty() {
                break;
            }
            let current_distance = match distances.get(&entry.node) {
                Some(distance) if *distance < entry.cost.0 => continue,
                Some(distance) => *distance,
                None => continue,
            };

            if pending.remove(&entry.node) {
                results.insert(
                    entry.node,
                    ShortestPath {
                        distance_km: current_distance,
                        nodes: reconstruct_path(&parents, source, entry.node),
                    },
                );
            }

            for edge in self.neighbours(entry.node) {
                let next_cost = current_distance + edge.distance_km;
                if next_cost < *distances.get(&edge.target).unwrap_or(&f64::INFINITY) {
                    distances.insert(edge.target, next_cost);
                    parents.insert(edge.target, Some(entry.node));
                    queue.push(QueueEntry::new(edge.target, next_cost));
                }
            }
        }

        results
    }
}

fn reconstruct_path(
    parents: &HashMap<NodeId, Option<NodeId>>,
    start: NodeId,
    goal: NodeId,
) -> Vec<NodeId> {
    let mut path = Vec::new();
    let mut current = Some(goal);
    while let Some(node) = current {
        path.push(node);
        if node == start {
            break;
        }
        current = parents.get(&node).copied().flatten();
    }
    path.reverse();
    path
}

pub(crate) fn compare_distance(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Greater)
}

/// Total-ordered `f64` wrapper for priority queues.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct FloatOrd(pub(crate) f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct QueueEntry {
    node: NodeId,
    cost: FloatOrd,
}

impl QueueEntry {
    fn new(node: NodeId, cost: f64) -> Self {
        Self {
            node,
            cost: FloatOrd(cost),
        }
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering so BinaryHeap becomes a min-heap by cost.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
