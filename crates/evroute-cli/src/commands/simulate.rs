//! Simulate command handler: replay a station route or a polyline against the
//! battery model.

use anyhow::{Context, Result};

use evroute_lib::{
    simulate_path, simulate_polyline, Coordinate, Error as SimError, Graph, OsrmClient,
    RoadRouter, SimulationOptions, SimulationOutcome, SimulationReport, SummaryKind,
    TripSummary, Waypoint,
};

use crate::commands::read_polyline;
use crate::commands::route::format_unknown_station_message;
use crate::output::{render_summary, OutputFormat};
use crate::SimulateArgs;

/// Handle the simulate subcommand.
pub fn handle_simulate_command(
    graph: &Graph,
    format: OutputFormat,
    args: &SimulateArgs,
) -> Result<()> {
    let vehicle = args.vehicle.to_params();
    vehicle.validate().context("invalid vehicle parameters")?;
    let options = SimulationOptions {
        nearby_k: args.nearby_k,
        nearby_radius_km: args.nearby_radius,
        ..SimulationOptions::default()
    };

    let (waypoints, outcome) = if let Some(path) = &args.polyline {
        let points = read_polyline(path)?;
        let road_router = if args.road.road {
            let client = OsrmClient::new(args.road.osrm_url.as_str())
                .context("failed to build road router")?;
            Some(client)
        } else {
            None
        };
        let router = road_router.as_ref().map(|r| r as &dyn RoadRouter);
        let outcome = simulate_polyline(graph, &points, &vehicle, &options, router)
            .context("polyline simulation failed")?;
        (polyline_waypoints(&points), outcome)
    } else {
        let outcome = match simulate_path(graph, &args.route, &vehicle, &options) {
            Ok(outcome) => outcome,
            Err(SimError::UnknownStation { name, .. }) => {
                let suggestions = suggest_ids(graph, &name);
                let message = format_unknown_station_message(&name, &suggestions);
                return Err(anyhow::anyhow!(message));
            }
            Err(other) => return Err(anyhow::Error::new(other)),
        };
        let waypoints = args
            .route
            .iter()
            .filter_map(|id| graph.node_id(id).and_then(|n| graph.node(n)))
            .map(Waypoint::from)
            .collect::<Vec<_>>();
        (waypoints, outcome)
    };

    let report = into_report(outcome)?;
    let summary = TripSummary::from_report(SummaryKind::Simulation, &waypoints, &report)
        .context("failed to build simulation summary")?;
    render_summary(&summary, format).context("failed to write simulation")
}

fn into_report(outcome: SimulationOutcome) -> Result<SimulationReport> {
    match outcome {
        SimulationOutcome::Feasible(report) => Ok(report),
        SimulationOutcome::Infeasible {
            segment_index,
            reason,
        } => Err(anyhow::anyhow!(
            "Route is infeasible at segment {}: {}. Try a higher --start-soc or --charge-target.",
            segment_index + 1,
            reason
        )),
    }
}

fn polyline_waypoints(points: &[Coordinate]) -> Vec<Waypoint> {
    let endpoint = |id: &str, coordinate: Coordinate| Waypoint {
        id: id.to_string(),
        name: coordinate.to_string(),
        coordinate,
        power_kw: None,
        is_virtual: true,
    };
    match (points.first(), points.last()) {
        (Some(first), Some(last)) => vec![endpoint("START", *first), endpoint("END", *last)],
        _ => Vec::new(),
    }
}

/// Station ids sharing a prefix with `name`, for error hints.
fn suggest_ids(graph: &Graph, name: &str) -> Vec<String> {
    let prefix: String = name.to_lowercase().chars().take(2).collect();
    let mut ids: Vec<String> = graph
        .nodes()
        .filter(|n| !n.is_virtual && n.key.to_lowercase().starts_with(&prefix))
        .map(|n| n.key.clone())
        .collect();
    ids.sort();
    ids.truncate(3);
    ids
}
