//! Trip planning orchestration.
//!
//! [`plan_trip`] is the main entry point. It:
//! 1. Resolves start/goal input to stations or coordinates
//! 2. Takes a private, filtered snapshot of the station graph
//! 3. Inserts virtual nodes for coordinate endpoints
//! 4. Tries road-router alternatives through polyline simulation
//! 5. Falls back to graph search followed by path evaluation
//! 6. Picks the best candidate by the requested preference

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::energy::{usable_power, VehicleParams};
use crate::error::{Error, Result};
use crate::evaluate::{compare_evaluations, evaluate_routes, CandidateEvaluation, RankBy};
use crate::geo::Coordinate;
use crate::graph::{EdgeFilter, Graph, Node, NodeId, VirtualNodeOptions};
use crate::search::{
    select_planner, ChargingRoute, RouteAction, SearchAlgorithm, SearchCost, SearchOptions,
};
use crate::services::{Geocoder, RoadRouter};
use crate::simulate::{simulate_polyline, SegmentTrace, SimulationOptions, SimulationReport};
use crate::station::{Endpoint, StationCatalog};

/// Charge target used when minimising the number of stops.
pub const FEWEST_CHARGES_TARGET_PERCENT: f64 = 90.0;

/// What the caller wants the chosen route to minimise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RoutePreference {
    #[default]
    Time,
    Distance,
    FewestCharges,
}

impl RoutePreference {
    pub fn rank_by(&self) -> RankBy {
        match self {
            RoutePreference::Time => RankBy::Time,
            RoutePreference::Distance => RankBy::Distance,
            RoutePreference::FewestCharges => RankBy::Charges,
        }
    }

    /// Cost the graph search minimises for this preference.
    pub fn search_cost(&self) -> SearchCost {
        match self {
            RoutePreference::Distance => SearchCost::Distance,
            RoutePreference::Time | RoutePreference::FewestCharges => SearchCost::Time,
        }
    }

    /// Vehicle parameters adjusted for this preference.
    pub fn adjust_vehicle(&self, vehicle: &VehicleParams) -> VehicleParams {
        match self {
            RoutePreference::FewestCharges => VehicleParams {
                charge_target_percent: vehicle
                    .charge_target_percent
                    .max(FEWEST_CHARGES_TARGET_PERCENT),
                ..*vehicle
            },
            RoutePreference::Time | RoutePreference::Distance => *vehicle,
        }
    }
}

impl fmt::Display for RoutePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            RoutePreference::Time => "time",
            RoutePreference::Distance => "distance",
            RoutePreference::FewestCharges => "fewest-charges",
        };
        f.write_str(value)
    }
}

impl FromStr for RoutePreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "time" => Ok(RoutePreference::Time),
            "distance" => Ok(RoutePreference::Distance),
            "fewest-charges" | "charges" => Ok(RoutePreference::FewestCharges),
            other => Err(format!("unknown route preference '{other}'")),
        }
    }
}

/// High-level trip planning request.
#[derive(Debug, Clone)]
pub struct TripRequest {
    /// Station id, partial station name, `"lat,lon"` or free text.
    pub start: String,
    pub goal: String,
    pub vehicle: VehicleParams,
    pub preference: RoutePreference,
    /// Search options; `cost` is taken from `preference`.
    pub search: SearchOptions,
    pub simulation: SimulationOptions,
    pub filter: EdgeFilter,
    /// Attachment of virtual start/end nodes.
    pub virtual_node: VirtualNodeOptions,
    /// Radius used to snap road polylines onto stations.
    pub snap_radius_km: f64,
}

impl TripRequest {
    pub fn new(start: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            goal: goal.into(),
            vehicle: VehicleParams::default(),
            preference: RoutePreference::default(),
            search: SearchOptions::default(),
            simulation: SimulationOptions::default(),
            filter: EdgeFilter::default(),
            virtual_node: VirtualNodeOptions::default(),
            snap_radius_km: 5.0,
        }
    }
}

/// Inputs shared by planning calls.
#[derive(Clone, Copy)]
pub struct PlanningContext<'a> {
    pub catalog: &'a StationCatalog,
    pub graph: &'a Graph,
    pub road_router: Option<&'a dyn RoadRouter>,
    pub geocoder: Option<&'a dyn Geocoder>,
}

impl<'a> PlanningContext<'a> {
    pub fn new(catalog: &'a StationCatalog, graph: &'a Graph) -> Self {
        Self {
            catalog,
            graph,
            road_router: None,
            geocoder: None,
        }
    }

    pub fn with_road_router(mut self, router: &'a dyn RoadRouter) -> Self {
        self.road_router = Some(router);
        self
    }

    pub fn with_geocoder(mut self, geocoder: &'a dyn Geocoder) -> Self {
        self.geocoder = Some(geocoder);
        self
    }
}

/// Where the chosen route came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// A road-router polyline simulated against the battery model.
    Road,
    /// Range-constrained search over the station graph.
    Graph,
}

/// Node on the chosen route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waypoint {
    pub id: String,
    pub name: String,
    pub coordinate: Coordinate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_kw: Option<f64>,
    pub is_virtual: bool,
}

impl From<&Node> for Waypoint {
    fn from(node: &Node) -> Self {
        Self {
            id: node.key.clone(),
            name: node.name.clone(),
            coordinate: node.coordinate,
            power_kw: node.power_kw,
            is_virtual: node.is_virtual,
        }
    }
}

/// Statistics from the graph search, when one ran.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchStats {
    pub algorithm: SearchAlgorithm,
    pub expansions: usize,
    pub total_distance_km: f64,
    pub total_time_min: f64,
}

/// Result of [`plan_trip`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripPlan {
    pub source: RouteSource,
    pub preference: RoutePreference,
    pub start: Waypoint,
    pub goal: Waypoint,
    pub waypoints: Vec<Waypoint>,
    /// Road polyline of the chosen route, for road-sourced plans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polyline: Option<Vec<Coordinate>>,
    pub report: SimulationReport,
    /// False when the battery simulation rejected the searched route and
    /// `report` was rebuilt from the search's own bookkeeping.
    pub simulation_feasible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchStats>,
    /// Every candidate considered, best first.
    pub candidates: Vec<CandidateEvaluation>,
}

impl TripPlan {
    pub fn route_ids(&self) -> Vec<&str> {
        self.waypoints.iter().map(|w| w.id.as_str()).collect()
    }
}

/// Resolve `input` to a catalog station or a coordinate.
///
/// Falls back to the geocoder only when the input matches no station name at
/// all; ambiguous names are reported with their candidates.
pub fn resolve_endpoint(
    catalog: &StationCatalog,
    geocoder: Option<&dyn Geocoder>,
    input: &str,
) -> Result<Endpoint> {
    match catalog.resolve(input) {
        Ok(endpoint) => Ok(endpoint),
        Err(err @ Error::UnknownStation { .. }) => {
            let Some(geocoder) = geocoder else {
                return Err(err);
            };
            if !catalog.find_by_name(input).is_empty() {
                return Err(err);
            }
            let candidates = geocoder.geocode(input.trim(), 5)?;
            let Some(first) = candidates.into_iter().next() else {
                return Err(Error::UnresolvedEndpoint {
                    input: input.to_string(),
                });
            };
            info!(input, label = %first.label, coordinate = %first.coordinate, "geocoded endpoint");
            Ok(Endpoint::Coordinate(first.coordinate))
        }
        Err(err) => Err(err),
    }
}

/// Plan a trip between two free-form endpoints.
pub fn plan_trip(context: &PlanningContext<'_>, request: &TripRequest) -> Result<TripPlan> {
    let vehicle = request.preference.adjust_vehicle(&request.vehicle);
    vehicle.validate()?;

    let start_endpoint = resolve_endpoint(context.catalog, context.geocoder, &request.start)?;
    let goal_endpoint = resolve_endpoint(context.catalog, context.geocoder, &request.goal)?;

    let mut snapshot = context.graph.filtered(&request.filter);
    let start = attach_endpoint(&mut snapshot, &start_endpoint, "START", &request.virtual_node)?;
    let goal = attach_endpoint(&mut snapshot, &goal_endpoint, "END", &request.virtual_node)?;
    let rank_by = request.preference.rank_by();

    if let Some(router) = context.road_router {
        if let Some(plan) = plan_on_roads(&snapshot, router, start, goal, &vehicle, request)? {
            return Ok(plan);
        }
    }

    let search = SearchOptions {
        cost: request.preference.search_cost(),
        ..request.search
    };
    let route = select_planner(search.algorithm)
        .find_path(&snapshot, start, goal, &vehicle, &search)
        .ok_or_else(|| Error::RouteNotFound {
            start: request.start.clone(),
            goal: request.goal.clone(),
        })?;

    let keys = route.node_keys(&snapshot);
    let candidates = evaluate_routes(
        &snapshot,
        std::slice::from_ref(&keys),
        &vehicle,
        &request.simulation,
        rank_by,
    )?;
    let (report, simulation_feasible) = match candidates.first().and_then(|c| c.report()) {
        Some(report) => (report.clone(), true),
        None => {
            warn!("simulation rejected the searched route; reporting search totals");
            (report_from_route(&snapshot, &route, &vehicle), false)
        }
    };

    let plan = TripPlan {
        source: RouteSource::Graph,
        preference: request.preference,
        start: waypoint(&snapshot, start)?,
        goal: waypoint(&snapshot, goal)?,
        waypoints: route
            .nodes()
            .into_iter()
            .map(|id| waypoint(&snapshot, id))
            .collect::<Result<Vec<_>>>()?,
        polyline: None,
        report,
        simulation_feasible,
        search: Some(SearchStats {
            algorithm: route.algorithm,
            expansions: route.expansions,
            total_distance_km: route.total_distance_km,
            total_time_min: route.total_time_min,
        }),
        candidates,
    };
    log_plan(&plan);
    Ok(plan)
}

fn attach_endpoint(
    graph: &mut Graph,
    endpoint: &Endpoint,
    base: &str,
    options: &VirtualNodeOptions,
) -> Result<NodeId> {
    match endpoint {
        Endpoint::Station(id) => graph
            .node_id(id)
            .ok_or_else(|| Error::UnknownNode { id: id.clone() }),
        Endpoint::Coordinate(coordinate) => {
            let key = graph.unique_node_key(base);
            graph.add_virtual_node(&key, *coordinate, options)
        }
    }
}

fn plan_on_roads(
    graph: &Graph,
    router: &dyn RoadRouter,
    start: NodeId,
    goal: NodeId,
    vehicle: &VehicleParams,
    request: &TripRequest,
) -> Result<Option<TripPlan>> {
    let (Some(start_node), Some(goal_node)) = (graph.node(start), graph.node(goal)) else {
        return Ok(None);
    };
    let routes = match router.routes(start_node.coordinate, goal_node.coordinate, true) {
        Ok(routes) => routes,
        Err(err) => {
            warn!(error = %err, "road router failed; falling back to graph search");
            return Ok(None);
        }
    };

    let mut feasible = Vec::new();
    for route in routes {
        let outcome = simulate_polyline(
            graph,
            &route.points,
            vehicle,
            &request.simulation,
            Some(router),
        )?;
        if !outcome.is_feasible() {
            continue;
        }
        let snapped = snap_polyline(graph, &route.points, request.snap_radius_km, start, goal);
        let candidate = CandidateEvaluation {
            route: snapped.iter().map(|&id| graph.key(id).to_string()).collect(),
            outcome,
        };
        feasible.push((candidate, snapped, route.points));
    }
    if feasible.is_empty() {
        info!("no feasible road alternative; falling back to graph search");
        return Ok(None);
    }

    let rank_by = request.preference.rank_by();
    feasible.sort_by(|a, b| compare_evaluations(&a.0, &b.0, rank_by));
    let candidates: Vec<CandidateEvaluation> = feasible.iter().map(|f| f.0.clone()).collect();
    let (best, nodes, points) = feasible.swap_remove(0);
    let Some(report) = best.outcome.into_report() else {
        return Ok(None);
    };

    let plan = TripPlan {
        source: RouteSource::Road,
        preference: request.preference,
        start: waypoint(graph, start)?,
        goal: waypoint(graph, goal)?,
        waypoints: nodes
            .into_iter()
            .map(|id| waypoint(graph, id))
            .collect::<Result<Vec<_>>>()?,
        polyline: Some(points),
        report,
        simulation_feasible: true,
        search: None,
        candidates,
    };
    log_plan(&plan);
    Ok(Some(plan))
}

/// Map a polyline onto curated stations within `radius_km` of its points.
///
/// Consecutive duplicates are removed and the route is forced to begin at
/// `start` and end at `goal`.
pub fn snap_polyline(
    graph: &Graph,
    points: &[Coordinate],
    radius_km: f64,
    start: NodeId,
    goal: NodeId,
) -> Vec<NodeId> {
    let mut snapped = vec![start];
    for point in points {
        let Some((node, _)) = graph.nearest_station(*point, radius_km) else {
            continue;
        };
        if node.is_virtual && node.id != start && node.id != goal {
            continue;
        }
        if snapped.last() != Some(&node.id) {
            snapped.push(node.id);
        }
    }
    // The goal may have been passed earlier; only its final visit matters.
    while snapped.len() > 1 && snapped.last() == Some(&goal) {
        snapped.pop();
    }
    snapped.push(goal);
    snapped
}

fn waypoint(graph: &Graph, id: NodeId) -> Result<Waypoint> {
    graph
        .node(id)
        .map(Waypoint::from)
        .ok_or_else(|| Error::UnknownNode { id: id.to_string() })
}

/// Build a report from the search's own bookkeeping.
fn report_from_route(
    graph: &Graph,
    route: &ChargingRoute,
    vehicle: &VehicleParams,
) -> SimulationReport {
    let mut segments = Vec::new();
    let mut soc = vehicle.start_soc_percent;
    let mut charges = route.charges.iter();
    let mut previous: Option<NodeId> = None;

    for step in &route.steps {
        match *step {
            RouteAction::Visit(node) => {
                if let (Some(from), Some(a), Some(b)) =
                    (previous, previous.and_then(|p| graph.node(p)), graph.node(node))
                {
                    let distance = a.coordinate.distance_to(&b.coordinate);
                    let soc_after = soc - vehicle.percent_for_distance(distance);
                    segments.push(SegmentTrace {
                        from: graph.key(from).to_string(),
                        to: b.key.clone(),
                        distance_km: distance,
                        soc_before: soc,
                        soc_after,
                    });
                    soc = soc_after;
                }
                previous = Some(node);
            }
            RouteAction::Charge(_) => {
                if let Some(event) = charges.next() {
                    soc = event.departure_soc;
                }
            }
        }
    }

    let total_charging_min: f64 = route.charges.iter().map(|c| c.charge_minutes).sum();
    SimulationReport {
        total_distance_km: route.total_distance_km,
        total_driving_min: vehicle.drive_minutes(route.total_distance_km),
        total_charging_min,
        total_time_min: route.total_time_min,
        final_soc: route.final_soc,
        charges: route.charges.clone(),
        detour_geometries: Vec::new(),
        segments,
    }
}

fn log_plan(plan: &TripPlan) {
    info!(
        source = ?plan.source,
        start = %plan.start.id,
        goal = %plan.goal.id,
        stops = plan.report.charges.len(),
        distance_km = plan.report.total_distance_km,
        time_min = plan.report.total_time_min,
        chargers_on_route = plan
            .waypoints
            .iter()
            .filter(|w| usable_power(w.power_kw).is_some())
            .count(),
        "planned trip"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, GraphBuildOptions};
    use crate::services::GeocodeCandidate;
    use crate::station::Station;

    struct FixedGeocoder(Option<Coordinate>);

    impl Geocoder for FixedGeocoder {
        fn geocode(&self, query: &str, _limit: usize) -> Result<Vec<GeocodeCandidate>> {
            Ok(self
                .0
                .map(|coordinate| GeocodeCandidate {
                    coordinate,
                    label: query.to_string(),
                })
                .into_iter()
                .collect())
        }
    }

    fn catalog() -> StationCatalog {
        StationCatalog::from_stations(vec![
            Station::new("ST01", "Ben Thanh", 10.7725, 106.6980, Some(60.0)),
            Station::new("ST02", "Thu Duc", 10.8500, 106.7720, None),
            Station::new("ST03", "Bien Hoa", 10.9447, 106.8243, Some(150.0)),
        ])
        .expect("valid catalog")
    }

    #[test]
    fn preference_adjusts_charge_target() {
        let vehicle = VehicleParams::default();
        let adjusted = RoutePreference::FewestCharges.adjust_vehicle(&vehicle);
        assert_eq!(adjusted.charge_target_percent, FEWEST_CHARGES_TARGET_PERCENT);
        assert_eq!(RoutePreference::Time.adjust_vehicle(&vehicle), vehicle);
        assert_eq!(RoutePreference::FewestCharges.rank_by(), RankBy::Charges);
        assert_eq!(RoutePreference::Distance.search_cost(), SearchCost::Distance);
        assert_eq!(RoutePreference::FewestCharges.search_cost(), SearchCost::Time);
        assert_eq!(
            "fewest-charges".parse::<RoutePreference>(),
            Ok(RoutePreference::FewestCharges)
        );
    }

    #[test]
    fn geocoder_used_only_for_unmatched_text() {
        let catalog = catalog();
        let target = Coordinate::new(10.9, 106.8);
        let geocoder = FixedGeocoder(Some(target));
        assert_eq!(
            resolve_endpoint(&catalog, Some(&geocoder), "Cho Lon market").unwrap(),
            Endpoint::Coordinate(target)
        );
        assert_eq!(
            resolve_endpoint(&catalog, Some(&geocoder), "thu duc").unwrap(),
            Endpoint::Station("ST02".to_string())
        );
        // "Th" matches two stations: ambiguous, never geocoded.
        assert!(matches!(
            resolve_endpoint(&catalog, Some(&geocoder), "Th"),
            Err(Error::UnknownStation { .. })
        ));
        assert!(matches!(
            resolve_endpoint(&catalog, Some(&FixedGeocoder(None)), "Nowhere"),
            Err(Error::UnresolvedEndpoint { .. })
        ));
    }

    #[test]
    fn snapping_forces_endpoints_and_dedupes() {
        let catalog = catalog();
        let graph = build_graph(catalog.stations(), &GraphBuildOptions::default());
        let s1 = graph.node_id("ST01").unwrap();
        let s2 = graph.node_id("ST02").unwrap();
        let s3 = graph.node_id("ST03").unwrap();
        let points = [
            Coordinate::new(10.7726, 106.6981),
            Coordinate::new(10.8501, 106.7721),
            Coordinate::new(10.8502, 106.7722),
            Coordinate::new(10.9447, 106.8243),
        ];
        assert_eq!(snap_polyline(&graph, &points, 5.0, s1, s3), vec![s1, s2, s3]);
        assert_eq!(snap_polyline(&graph, &points[1..3], 0.001, s1, s3), vec![s1, s3]);
    }

    #[test]
    fn plans_between_coordinates_with_virtual_nodes() {
        let catalog = catalog();
        let graph = build_graph(catalog.stations(), &GraphBuildOptions::default());
        let context = PlanningContext::new(&catalog, &graph);
        let request = TripRequest::new("10.7700,106.6950", "Bien Hoa");
        let plan = plan_trip(&context, &request).expect("plan");
        assert_eq!(plan.source, RouteSource::Graph);
        assert!(plan.start.is_virtual);
        assert_eq!(plan.start.id, "START");
        assert_eq!(plan.goal.id, "ST03");
        assert!(!graph.contains("START"), "caller graph must stay untouched");
        assert!(plan.search.is_some());
    }
}
