//! Range-constrained route search over the station graph.
//!
//! This module provides:
//! - [`SearchAlgorithm`] - Supported search algorithms (uniform-cost, A*)
//! - [`SearchCost`] - Quantity minimised (time or distance)
//! - [`SearchOptions`] - Tuning knobs for the transition model
//! - [`ChargingRoute`] - Result of a successful search
//! - [`search_route`] - Convenience entry point selecting a planner
//!
//! # Strategy Pattern
//!
//! Both algorithms share one transition model and differ only in the priority
//! key pushed onto the frontier. Each is wrapped in a [`RoutePlanner`]
//! implementation so callers can pick a strategy at runtime.
//!
//! # State space
//!
//! A search state is a node plus the battery percentage on arrival. Arriving
//! at the same node with more charge is a different, better state, so the
//! visited set is keyed on `(node, SOC rounded to 0.1 %)`.

mod planner;

pub use planner::{select_planner, AStarPlanner, RoutePlanner, UniformCostPlanner};

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::energy::{usable_power, VehicleParams};
use crate::geo::Coordinate;
use crate::graph::{FloatOrd, Graph, NodeId, ShortestPath};

/// Tolerance used when comparing SOC percentages.
pub(crate) const SOC_EPSILON: f64 = 1e-9;

/// Supported search algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchAlgorithm {
    /// Uniform-cost search ordered by accumulated time.
    #[serde(rename = "ucs")]
    UniformCost,
    /// A* search with a straight-line travel-time heuristic.
    #[default]
    #[serde(rename = "a-star")]
    AStar,
}

impl fmt::Display for SearchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            SearchAlgorithm::UniformCost => "ucs",
            SearchAlgorithm::AStar => "a-star",
        };
        f.write_str(value)
    }
}

impl FromStr for SearchAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ucs" | "uniform-cost" | "uniform_cost" => Ok(SearchAlgorithm::UniformCost),
            "a-star" | "astar" | "a*" => Ok(SearchAlgorithm::AStar),
            other => Err(format!("unknown search algorithm '{other}'")),
        }
    }
}

/// Quantity minimised by the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchCost {
    /// Driving plus charging minutes.
    #[default]
    Time,
    /// Kilometres driven; charging is free.
    Distance,
}

impl SearchCost {
    /// Cost accumulated by `state`.
    fn of(&self, state: &SearchState) -> f64 {
        match self {
            SearchCost::Time => state.time_min,
            SearchCost::Distance => state.distance_km,
        }
    }

    /// Convert a straight-line distance into a lower bound in this cost's unit.
    pub fn estimate(&self, vehicle: &VehicleParams, distance_km: f64) -> f64 {
        match self {
            SearchCost::Time => vehicle.drive_minutes(distance_km),
            SearchCost::Distance => distance_km,
        }
    }
}

impl fmt::Display for SearchCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchCost::Time => "time",
            SearchCost::Distance => "distance",
        })
    }
}

/// Options for a single search call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub algorithm: SearchAlgorithm,
    /// Frontier priority and dominance are measured in this cost.
    pub cost: SearchCost,
    /// Consider chargers that are not direct neighbours of the current node.
    pub nearby_fallback: bool,
    /// Maximum number of chargers considered by the nearby fallback.
    pub nearby_k: usize,
    /// Straight-line radius for nearby fallback candidates.
    pub max_search_distance_km: f64,
    /// Fixed time added to every charging stop.
    pub charge_penalty_minutes: f64,
    /// Hard ceiling on the number of expanded states.
    pub max_expansions: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            algorithm: SearchAlgorithm::default(),
            cost: SearchCost::default(),
            nearby_fallback: true,
            nearby_k: 5,
            max_search_distance_km: 100.0,
            charge_penalty_minutes: 0.0,
            max_expansions: 50_000,
        }
    }
}

/// A single step of a charging route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "node", rename_all = "snake_case")]
pub enum RouteAction {
    /// Arrive at (or depart from) a node.
    Visit(NodeId),
    /// Charge at the node the vehicle is currently at.
    Charge(NodeId),
}

impl RouteAction {
    pub fn node(&self) -> NodeId {
        match self {
            RouteAction::Visit(node) | RouteAction::Charge(node) => *node,
        }
    }
}

/// A charging stop recorded by search or simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargingEvent {
    pub station_id: String,
    pub arrival_soc: f64,
    pub departure_soc: f64,
    pub charge_minutes: f64,
    /// Extra distance driven to reach the charger, if it was off the route.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detour_km: Option<f64>,
    /// Road geometry of the detour, when a road router supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detour_geometry: Option<Vec<Coordinate>>,
}

/// Result of a successful range-constrained search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargingRoute {
    pub algorithm: SearchAlgorithm,
    pub start: NodeId,
    pub goal: NodeId,
    pub steps: Vec<RouteAction>,
    pub total_distance_km: f64,
    pub total_time_min: f64,
    pub charges: Vec<ChargingEvent>,
    /// SOC on arrival at the goal.
    pub final_soc: f64,
    /// Number of states expanded before the goal was reached.
    pub expansions: usize,
}

impl ChargingRoute {
    /// Nodes visited along the route, without charge markers.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let node = step.node();
            if nodes.last() != Some(&node) {
                nodes.push(node);
            }
        }
        nodes
    }

    /// Station keys visited along the route.
    pub fn node_keys(&self, graph: &Graph) -> Vec<String> {
        self.nodes()
            .into_iter()
            .map(|id| graph.key(id).to_string())
            .collect()
    }

    pub fn charge_count(&self) -> usize {
        self.charges.len()
    }

    pub fn hop_count(&self) -> usize {
        self.nodes().len().saturating_sub(1)
    }
}

/// Run the planner selected by `options.algorithm`.
pub fn search_route(
    graph: &Graph,
    start: NodeId,
    goal: NodeId,
    vehicle: &VehicleParams,
    options: &SearchOptions,
) -> Option<ChargingRoute> {
    select_planner(options.algorithm).find_path(graph, start, goal, vehicle, options)
}

#[derive(Debug, Clone)]
struct SearchState {
    node: NodeId,
    soc: f64,
    steps: Vec<RouteAction>,
    distance_km: f64,
    time_min: f64,
    charges: Vec<ChargingEvent>,
}

#[derive(Debug)]
struct FrontierEntry {
    priority: FloatOrd,
    sequence: u64,
    state: SearchState,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry {}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on priority; equal priorities pop in insertion order.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Frontier<H> {
    heap: BinaryHeap<FrontierEntry>,
    sequence: u64,
    cost: SearchCost,
    heuristic: H,
}

impl<H: Fn(NodeId) -> f64> Frontier<H> {
    fn push(&mut self, state: SearchState) {
        let priority = self.cost.of(&state) + (self.heuristic)(state.node);
        self.heap.push(FrontierEntry {
            priority: FloatOrd(priority),
            sequence: self.sequence,
            state,
        });
        self.sequence += 1;
    }
}

fn visited_key(state: &SearchState) -> (NodeId, i64) {
    (state.node, (state.soc * 10.0).round() as i64)
}

/// Shared best-first search; `heuristic` returns an estimate of the
/// remaining cost from a node to the goal, in the unit of `options.cost`.
pub(crate) fn run_search(
    graph: &Graph,
    start: NodeId,
    goal: NodeId,
    vehicle: &VehicleParams,
    options: &SearchOptions,
    heuristic: impl Fn(NodeId) -> f64,
) -> Option<ChargingRoute> {
    graph.node(start)?;
    graph.node(goal)?;

    let mut frontier = Frontier {
        heap: BinaryHeap::new(),
        sequence: 0,
        cost: options.cost,
        heuristic,
    };
    frontier.push(SearchState {
        node: start,
        soc: vehicle.start_soc_percent,
        steps: vec![RouteAction::Visit(start)],
        distance_km: 0.0,
        time_min: 0.0,
        charges: Vec::new(),
    });

    let mut visited: HashMap<(NodeId, i64), f64> = HashMap::new();
    let mut nearby_cache: HashMap<NodeId, Vec<(NodeId, ShortestPath)>> = HashMap::new();
    let mut expansions = 0usize;

    while let Some(FrontierEntry { state, .. }) = frontier.heap.pop() {
        if state.node == goal {
            debug!(
                algorithm = %options.algorithm,
                cost = %options.cost,
                expansions,
                distance_km = state.distance_km,
                time_min = state.time_min,
                charges = state.charges.len(),
                "search reached goal"
            );
            return Some(ChargingRoute {
                algorithm: options.algorithm,
                start,
                goal,
                steps: state.steps,
                total_distance_km: state.distance_km,
                total_time_min: state.time_min,
                charges: state.charges,
                final_soc: state.soc,
                expansions,
            });
        }

        let key = visited_key(&state);
        let cost = options.cost.of(&state);
        if visited.get(&key).is_some_and(|&seen| seen <= cost) {
            continue;
        }
        visited.insert(key, cost);

        expansions += 1;
        if expansions > options.max_expansions {
            debug!(
                algorithm = %options.algorithm,
                max_expansions = options.max_expansions,
                "search expansion budget exceeded"
            );
            return None;
        }

        expand_neighbours(graph, vehicle, options, &state, &mut frontier);

        if options.nearby_fallback {
            let candidates = nearby_cache
                .entry(state.node)
                .or_insert_with(|| nearby_chargers(graph, state.node, options));
            expand_nearby(graph, vehicle, options, &state, candidates, &mut frontier);
        }
    }

    debug!(
        algorithm = %options.algorithm,
        expansions,
        "search frontier exhausted"
    );
    None
}

fn expand_neighbours<H: Fn(NodeId) -> f64>(
    graph: &Graph,
    vehicle: &VehicleParams,
    options: &SearchOptions,
    state: &SearchState,
    frontier: &mut Frontier<H>,
) {
    let power = graph.node(state.node).and_then(|n| usable_power(n.power_kw));

    for edge in graph.neighbours(state.node) {
        let need = vehicle.percent_for_distance(edge.distance_km);
        if need > state.soc {
            continue;
        }

        if state.soc - need < vehicle.safe_soc_percent - SOC_EPSILON {
            let Some(power_kw) = power else {
                continue;
            };
            let target = (vehicle.safe_soc_percent + need)
                .max(state.soc)
                .min(vehicle.charge_target_percent);
            if target <= state.soc + SOC_EPSILON {
                continue;
            }
            frontier.push(charge_here(graph, vehicle, options, state, power_kw, target));
            continue;
        }

        let mut steps = state.steps.clone();
        steps.push(RouteAction::Visit(edge.target));
        frontier.push(SearchState {
            node: edge.target,
            soc: state.soc - need,
            steps,
            distance_km: state.distance_km + edge.distance_km,
            time_min: state.time_min + vehicle.drive_minutes(edge.distance_km),
            charges: state.charges.clone(),
        });
    }
}

fn charge_here(
    graph: &Graph,
    vehicle: &VehicleParams,
    options: &SearchOptions,
    state: &SearchState,
    power_kw: f64,
    target: f64,
) -> SearchState {
    let minutes = vehicle.charge_minutes_between(power_kw, state.soc, target);
    let mut steps = state.steps.clone();
    steps.push(RouteAction::Charge(state.node));
    let mut charges = state.charges.clone();
    charges.push(ChargingEvent {
        station_id: graph.key(state.node).to_string(),
        arrival_soc: state.soc,
        departure_soc: target,
        charge_minutes: minutes,
        detour_km: None,
        detour_geometry: None,
    });
    SearchState {
        node: state.node,
        soc: target,
        steps,
        distance_km: state.distance_km,
        time_min: state.time_min + minutes + options.charge_penalty_minutes,
        charges,
    }
}

/// Chargers near `node` by straight-line distance, paired with their graph
/// shortest path. The node itself is included when it has usable power.
fn nearby_chargers(
    graph: &Graph,
    node: NodeId,
    options: &SearchOptions,
) -> Vec<(NodeId, ShortestPath)> {
    let Some(origin) = graph.node(node) else {
        return Vec::new();
    };
    let candidates: Vec<NodeId> = graph
        .nodes_within(origin.coordinate, options.max_search_distance_km, None)
        .into_iter()
        .filter(|(id, _)| graph.node(*id).is_some_and(|n| !n.is_virtual))
        .take(options.nearby_k)
        .map(|(id, _)| id)
        .collect();

    let mut paths = graph.shortest_paths(node, &candidates);
    candidates
        .into_iter()
        .filter(|id| {
            graph
                .node(*id)
                .and_then(|n| usable_power(n.power_kw))
                .is_some()
        })
        .filter_map(|id| paths.remove(&id).map(|path| (id, path)))
        .collect()
}

fn expand_nearby<H: Fn(NodeId) -> f64>(
    graph: &Graph,
    vehicle: &VehicleParams,
    options: &SearchOptions,
    state: &SearchState,
    candidates: &[(NodeId, ShortestPath)],
    frontier: &mut Frontier<H>,
) {
    for (station, path) in candidates {
        let Some(power_kw) = graph.node(*station).and_then(|n| usable_power(n.power_kw)) else {
            continue;
        };
        let need = vehicle.percent_for_distance(path.distance_km);
        if need > state.soc {
            continue;
        }
        let arrival = state.soc - need;
        let target = vehicle.charge_target_percent;
        if target <= arrival + SOC_EPSILON {
            continue;
        }

        let minutes = vehicle.charge_minutes_between(power_kw, arrival, target);
        let mut steps = state.steps.clone();
        steps.extend(path.nodes.iter().skip(1).map(|&n| RouteAction::Visit(n)));
        steps.push(RouteAction::Charge(*station));
        let mut charges = state.charges.clone();
        charges.push(ChargingEvent {
            station_id: graph.key(*station).to_string(),
            arrival_soc: arrival,
            departure_soc: target,
            charge_minutes: minutes,
            detour_km: (path.distance_km > 0.0).then_some(path.distance_km),
            detour_geometry: None,
        });

        frontier.push(SearchState {
            node: *station,
            soc: target,
            steps,
            distance_km: state.distance_km + path.distance_km,
            time_min: state.time_min
                + vehicle.drive_minutes(path.distance_km)
                + minutes
                + options.charge_penalty_minutes,
            charges,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, GraphBuildOptions, NeighborSelection};
    use crate::station::Station;

    fn pair(distance_deg: f64, start_power: Option<f64>) -> Graph {
        let stations = vec![
            Station::new("A", "Alpha", 0.0, 0.0, start_power),
            Station::new("B", "Bravo", 0.0, distance_deg, Some(50.0)),
        ];
        build_graph(
            &stations,
            &GraphBuildOptions {
                neighbors: NeighborSelection::Nearest(1),
                avg_speed_kmh: 60.0,
            },
        )
    }

    #[test]
    fn algorithm_parses_and_displays() {
        assert_eq!("ucs".parse::<SearchAlgorithm>(), Ok(SearchAlgorithm::UniformCost));
        assert_eq!("A-Star".parse::<SearchAlgorithm>(), Ok(SearchAlgorithm::AStar));
        assert!("bfs".parse::<SearchAlgorithm>().is_err());
        assert_eq!(SearchAlgorithm::AStar.to_string(), "a-star");
    }

    #[test]
    fn start_equal_to_goal_returns_trivial_route() {
        let graph = pair(0.1, Some(50.0));
        let a = graph.node_id("A").unwrap();
        let route = search_route(&graph, a, a, &VehicleParams::default(), &SearchOptions::default())
            .expect("trivial route");
        assert_eq!(route.steps, vec![RouteAction::Visit(a)]);
        assert_eq!(route.total_distance_km, 0.0);
    }

    #[test]
    fn rule_three_charges_in_place_instead_of_moving() {
        // ~111 km: needs about 30 %, start at 40 % leaves 10 % < 20 % floor.
        let graph = pair(1.0, Some(50.0));
        let a = graph.node_id("A").unwrap();
        let b = graph.node_id("B").unwrap();
        let vehicle = VehicleParams {
            start_soc_percent: 40.0,
            ..VehicleParams::default()
        };
        let options = SearchOptions {
            nearby_fallback: false,
            ..SearchOptions::default()
        };
        let route = search_route(&graph, a, b, &vehicle, &options).expect("route");
        assert_eq!(route.steps[1], RouteAction::Charge(a));
        let charge = &route.charges[0];
        let need = vehicle.percent_for_distance(route.total_distance_km);
        let expected = (vehicle.safe_soc_percent + need).min(vehicle.charge_target_percent);
        assert!((charge.departure_soc - expected).abs() < 1e-9);
        assert!(route.final_soc >= vehicle.safe_soc_percent - 1e-9);
    }

    #[test]
    fn missing_power_blocks_in_place_charge() {
        let graph = pair(1.0, None);
        let a = graph.node_id("A").unwrap();
        let b = graph.node_id("B").unwrap();
        let vehicle = VehicleParams {
            start_soc_percent: 40.0,
            ..VehicleParams::default()
        };
        assert!(search_route(&graph, a, b, &vehicle, &SearchOptions::default()).is_none());
    }

    #[test]
    fn expansion_budget_stops_search() {
        let graph = pair(0.1, Some(50.0));
        let a = graph.node_id("A").unwrap();
        let b = graph.node_id("B").unwrap();
        let options = SearchOptions {
            max_expansions: 0,
            ..SearchOptions::default()
        };
        assert!(search_route(&graph, a, b, &VehicleParams::default(), &options).is_none());
    }

    #[test]
    fn route_nodes_drop_charge_markers() {
        let route = ChargingRoute {
            algorithm: SearchAlgorithm::UniformCost,
            start: 0,
            goal: 2,
            steps: vec![
                RouteAction::Visit(0),
                RouteAction::Charge(0),
                RouteAction::Visit(1),
                RouteAction::Visit(2),
            ],
            total_distance_km: 0.0,
            total_time_min: 0.0,
            charges: Vec::new(),
            final_soc: 0.0,
            expansions: 0,
        };
        assert_eq!(route.nodes(), vec![0, 1, 2]);
        assert_eq!(route.hop_count(), 2);
    }
}
