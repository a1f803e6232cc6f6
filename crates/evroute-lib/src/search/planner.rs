//! Search strategies implementing the Strategy pattern.
//!
//! Each planner runs the shared transition model from the parent module and
//! supplies its own frontier priority.

use crate::energy::VehicleParams;
use crate::graph::{Graph, NodeId};

use super::{run_search, ChargingRoute, SearchAlgorithm, SearchOptions};

/// Trait for range-constrained search strategies.
pub trait RoutePlanner: Send + Sync {
    /// The algorithm identifier for this planner.
    fn algorithm(&self) -> SearchAlgorithm;

    /// Search for a battery-feasible route from `start` to `goal`.
    ///
    /// Returns `None` when the frontier is exhausted or the expansion budget
    /// is exceeded; the two cases are not distinguished.
    fn find_path(
        &self,
        graph: &Graph,
        start: NodeId,
        goal: NodeId,
        vehicle: &VehicleParams,
        options: &SearchOptions,
    ) -> Option<ChargingRoute>;
}

/// Uniform-cost planner: priority is the accumulated cost alone.
#[derive(Debug, Clone, Default)]
pub struct UniformCostPlanner;

impl RoutePlanner for UniformCostPlanner {
    fn algorithm(&self) -> SearchAlgorithm {
        SearchAlgorithm::UniformCost
    }

    fn find_path(
        &self,
        graph: &Graph,
        start: NodeId,
        goal: NodeId,
        vehicle: &VehicleParams,
        options: &SearchOptions,
    ) -> Option<ChargingRoute> {
        let options = SearchOptions {
            algorithm: self.algorithm(),
            ..*options
        };
        run_search(graph, start, goal, vehicle, &options, |_| 0.0)
    }
}

/// A* planner: priority is accumulated cost plus the straight-line distance
/// to the goal, expressed as driving time at the vehicle's average speed or
/// as kilometres when searching by distance.
///
/// The heuristic ignores charging time and never exceeds the time of a
/// direct graph edge, but nearby-fallback transitions can make it optimistic
/// relative to the true remaining cost. Use [`UniformCostPlanner`] when strict
/// optimality matters.
#[derive(Debug, Clone, Default)]
pub struct AStarPlanner;

impl RoutePlanner for AStarPlanner {
    fn algorithm(&self) -> SearchAlgorithm {
        SearchAlgorithm::AStar
    }

    fn find_path(
        &self,
        graph: &Graph,
        start: NodeId,
        goal: NodeId,
        vehicle: &VehicleParams,
        options: &SearchOptions,
    ) -> Option<ChargingRoute> {
        let goal_coord = graph.node(goal)?.coordinate;
        let options = SearchOptions {
            algorithm: self.algorithm(),
            ..*options
        };
        let cost = options.cost;
        run_search(graph, start, goal, vehicle, &options, |node| {
            graph
                .node(node)
                .map(|n| cost.estimate(vehicle, n.coordinate.distance_to(&goal_coord)))
                .unwrap_or(0.0)
        })
    }
}

/// Select the appropriate planner for an algorithm.
pub fn select_planner(algorithm: SearchAlgorithm) -> Box<dyn RoutePlanner> {
    match algorithm {
        SearchAlgorithm::UniformCost => Box::new(UniformCostPlanner),
        SearchAlgorithm::AStar => Box::new(AStarPlanner),
    }
}
