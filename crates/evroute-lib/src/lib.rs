//! evroute library entry points.
//!
//! This crate loads charging-station catalogs, builds a station graph, runs
//! battery-aware route search over it, and replays routes or road polylines
//! against a simple energy model to find charging stops. Higher-level
//! consumers (the CLI) should only depend on the functions exported here
//! instead of reimplementing behavior.

pub mod energy;
pub mod error;
pub mod evaluate;
pub mod geo;
pub mod graph;
pub mod output;
pub mod planner;
pub mod search;
pub mod services;
pub mod simulate;
pub mod station;

pub use energy::{
    charge_minutes, energy_needed, km_from_percent, percent_from_kwh, usable_power, VehicleParams,
};
pub use error::{Error, Result};
pub use evaluate::{evaluate_routes, rank_evaluations, CandidateEvaluation, RankBy};
pub use geo::{haversine_km, Coordinate};
pub use graph::{
    build_graph, EdgeFilter, Graph, GraphBuildOptions, NeighborSelection, Node, NodeId,
    VirtualNodeOptions,
};
pub use output::{RenderMode, SummaryKind, TripSummary};
pub use planner::{
    plan_trip, resolve_endpoint, PlanningContext, RoutePreference, RouteSource, TripPlan,
    TripRequest, Waypoint,
};
pub use search::{
    search_route, select_planner, ChargingEvent, ChargingRoute, RouteAction, RoutePlanner,
    SearchAlgorithm, SearchCost, SearchOptions,
};
pub use services::{
    GeocodeCandidate, Geocoder, NominatimClient, OsrmClient, RoadRoute, RoadRouter,
    DEFAULT_NOMINATIM_URL, DEFAULT_OSRM_URL,
};
pub use simulate::{
    simulate_nodes, simulate_path, simulate_polyline, InfeasibleReason, SimulationOptions,
    SimulationOutcome, SimulationReport,
};
pub use station::{Endpoint, Station, StationCatalog};
