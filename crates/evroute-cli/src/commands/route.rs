//! Route command handler for planning a trip between two endpoints.

use anyhow::{Context, Result};

use evroute_lib::{
    plan_trip, Error as PlanError, Graph, NominatimClient, OsrmClient, PlanningContext,
    RouteSource, StationCatalog, TripRequest, TripSummary,
};

use crate::output::{render_summary, OutputFormat};
use crate::RouteArgs;

/// Handle the route subcommand.
pub fn handle_route_command(
    catalog: &StationCatalog,
    graph: &Graph,
    format: OutputFormat,
    args: &RouteArgs,
) -> Result<()> {
    let request = args.to_request();

    let road_router = if args.road.road {
        let client =
            OsrmClient::new(args.road.osrm_url.as_str()).context("failed to build road router")?;
        Some(client)
    } else {
        None
    };
    let geocoder = if args.geocode {
        let client =
            NominatimClient::new(args.nominatim_url.as_str()).context("failed to build geocoder")?;
        Some(client)
    } else {
        None
    };

    let mut context = PlanningContext::new(catalog, graph);
    if let Some(router) = road_router.as_ref() {
        context = context.with_road_router(router);
    }
    if let Some(geocoder) = geocoder.as_ref() {
        context = context.with_geocoder(geocoder);
    }

    let plan = match plan_trip(&context, &request) {
        Ok(plan) => plan,
        Err(err) => return Err(handle_route_failure(&request, args, err)),
    };

    let summary = TripSummary::from_plan(&plan).context("failed to build trip summary")?;
    if format != OutputFormat::Json {
        let source = match plan.source {
            RouteSource::Road => "road router",
            RouteSource::Graph => "station graph",
        };
        println!("Planned via {source} ({} preference)", plan.preference);
    }
    render_summary(&summary, format).context("failed to write route")
}

fn handle_route_failure(request: &TripRequest, args: &RouteArgs, err: PlanError) -> anyhow::Error {
    match err {
        PlanError::UnknownStation { name, suggestions } => {
            anyhow::anyhow!(format_unknown_station_message(&name, &suggestions))
        }
        PlanError::RouteNotFound { start, goal } => {
            anyhow::anyhow!(format_route_not_found_message(&start, &goal, request, args))
        }
        other => anyhow::Error::new(other),
    }
}

pub(crate) fn format_unknown_station_message(name: &str, suggestions: &[String]) -> String {
    let mut message = format!("Unknown station '{}'.", name);
    match suggestions {
        [] => {}
        [only] => message.push_str(&format!(" Did you mean '{only}'?")),
        many => {
            let joined = many
                .iter()
                .map(|s| format!("'{}'", s))
                .collect::<Vec<_>>()
                .join(", ");
            message.push_str(&format!(" Did you mean one of: {}?", joined));
        }
    }
    message
}

fn format_route_not_found_message(
    start: &str,
    goal: &str,
    request: &TripRequest,
    args: &RouteArgs,
) -> String {
    let mut message = format!("No route found between {} and {}.", start, goal);
    let mut tips = Vec::new();
    if request.filter.avoid_highway {
        tips.push("allow highways (omit --avoid-highway)");
    }
    if request.filter.avoid_toll {
        tips.push("allow toll roads (omit --avoid-toll)");
    }
    if !request.search.nearby_fallback {
        tips.push("allow nearby chargers (omit --no-nearby-fallback)");
    }
    if args.max_expansions < 50_000 {
        tips.push("raise --max-expansions");
    }
    if tips.is_empty() {
        message.push_str(
            " Try a higher --start-soc or --charge-target, or more --neighbors per station.",
        );
    } else {
        message.push(' ');
        message.push_str(&format!("Try {}.", tips.join(", ")));
    }
    message
}
