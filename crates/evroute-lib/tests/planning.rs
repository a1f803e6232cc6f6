mod common;

use evroute_lib::output::UNSIMULATED_NOTE;
use evroute_lib::{
    plan_trip, Coordinate, Error, PlanningContext, RenderMode, RoutePreference, RouteSource,
    StationCatalog, TripRequest, TripSummary, VehicleParams,
};

use common::{
    distance_bound_graph, dogleg_catalog, fixture_graph, station_at_km, FailingRouter, FixedRouter,
};

fn station_coordinate(catalog: &StationCatalog, id: &str) -> Coordinate {
    catalog.get(id).expect("fixture station").coordinate
}

#[test]
fn road_alternatives_are_ranked_and_snapped() {
    let (catalog, graph) = fixture_graph(8);
    let via = |id: &str| station_coordinate(&catalog, id);
    let router = FixedRouter(vec![
        vec![via("ST01"), via("ST04"), via("ST03")],
        vec![via("ST01"), via("ST02"), via("ST03")],
    ]);
    let context = PlanningContext::new(&catalog, &graph).with_road_router(&router);

    let plan = plan_trip(&context, &TripRequest::new("ST01", "ST03")).expect("plan");

    assert_eq!(plan.source, RouteSource::Road);
    assert_eq!(plan.route_ids(), vec!["ST01", "ST02", "ST03"]);
    assert_eq!(plan.candidates.len(), 2);
    assert!(plan.candidates.iter().all(|c| c.is_feasible()));
    assert!(plan.search.is_none());
    assert_eq!(plan.polyline.as_ref().map(Vec::len), Some(3));
    assert!(plan.report.charges.is_empty());
    assert!(plan.report.total_distance_km < 30.0);
}

#[test]
fn failing_router_falls_back_to_graph_search() {
    let (catalog, graph) = fixture_graph(8);
    let context = PlanningContext::new(&catalog, &graph).with_road_router(&FailingRouter);

    let plan = plan_trip(&context, &TripRequest::new("ST01", "ST12")).expect("plan");

    assert_eq!(plan.source, RouteSource::Graph);
    assert!(plan.polyline.is_none());
    assert_eq!(plan.start.id, "ST01");
    assert_eq!(plan.goal.id, "ST12");
    assert_eq!(plan.route_ids().first(), Some(&"ST01"));
    assert_eq!(plan.route_ids().last(), Some(&"ST12"));
    let search = plan.search.as_ref().expect("search stats");
    assert!(search.expansions > 0);
    assert!(plan.report.total_time_min >= plan.report.total_driving_min);
}

#[test]
fn stations_resolve_by_partial_name() {
    let (catalog, graph) = fixture_graph(8);
    let context = PlanningContext::new(&catalog, &graph);

    let plan = plan_trip(&context, &TripRequest::new("ben thanh", "bien hoa")).expect("plan");

    assert_eq!(plan.start.id, "ST01");
    assert_eq!(plan.goal.id, "ST03");
}

#[test]
fn misspelled_station_suggests_close_names() {
    let (catalog, graph) = fixture_graph(8);
    let context = PlanningContext::new(&catalog, &graph);

    let err = plan_trip(&context, &TripRequest::new("ST01", "Da Lat Centre")).unwrap_err();

    match err {
        Error::UnknownStation { name, suggestions } => {
            assert_eq!(name, "Da Lat Centre");
            assert_eq!(suggestions.first().map(String::as_str), Some("Da Lat Center"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn stranded_start_reports_route_not_found() {
    let (catalog, graph) = fixture_graph(8);
    let context = PlanningContext::new(&catalog, &graph);
    let mut request = TripRequest::new("ST02", "ST12");
    request.vehicle = VehicleParams {
        start_soc_percent: 1.0,
        ..VehicleParams::default()
    };

    let err = plan_trip(&context, &request).unwrap_err();
    assert!(matches!(err, Error::RouteNotFound { .. }));
}

#[test]
fn invalid_vehicle_is_rejected_before_planning() {
    let (catalog, graph) = fixture_graph(8);
    let context = PlanningContext::new(&catalog, &graph);
    let mut request = TripRequest::new("ST01", "ST03");
    request.vehicle.battery_kwh_max = 0.0;

    let err = plan_trip(&context, &request).unwrap_err();
    assert!(matches!(err, Error::InvalidVehicle { .. }));
}

#[test]
fn plan_summary_renders_start_and_goal() {
    let (catalog, graph) = fixture_graph(8);
    let context = PlanningContext::new(&catalog, &graph);
    let plan = plan_trip(&context, &TripRequest::new("ST01", "ST03")).expect("plan");

    let summary = TripSummary::from_plan(&plan).expect("summary");
    let text = summary.render(RenderMode::PlainText);

    assert!(text.starts_with("Route: Ben Thanh Charging -> Bien Hoa Station"));
    assert_eq!(summary.source, Some(RouteSource::Graph));
    assert!(serde_json::to_string(&summary).expect("json").contains("\"kind\":\"route\""));
}

#[test]
fn distance_preference_takes_the_shorter_slower_route() {
    let catalog = dogleg_catalog();
    let graph = distance_bound_graph(&catalog, 100.0);
    let context = PlanningContext::new(&catalog, &graph);

    let mut request = TripRequest::new("A", "B");
    let fastest = plan_trip(&context, &request).expect("time plan");
    request.preference = RoutePreference::Distance;
    let shortest = plan_trip(&context, &request).expect("distance plan");

    assert_eq!(fastest.route_ids(), vec!["A", "Y", "B"]);
    assert_eq!(shortest.route_ids(), vec!["A", "X", "B"]);
    assert!((fastest.report.total_distance_km - 180.0).abs() < 1e-3);
    assert!((shortest.report.total_distance_km - 150.0).abs() < 1e-3);
    assert!(shortest.report.total_time_min > fastest.report.total_time_min);
    assert!(shortest.simulation_feasible && fastest.simulation_feasible);
}

#[test]
fn rejected_simulation_is_flagged_on_the_plan() {
    // The search tops up to 80 % at A and reaches B through the powerless M.
    // Replaying A -> M -> B charges only when a hop would cross the floor,
    // which is too late at M.
    let catalog = StationCatalog::from_stations(vec![
        station_at_km("A", 0.0, Some(50.0)),
        station_at_km("M", 100.0, None),
        station_at_km("B", 200.0, Some(50.0)),
    ])
    .expect("valid catalog");
    let graph = distance_bound_graph(&catalog, 150.0);
    let context = PlanningContext::new(&catalog, &graph);

    let plan = plan_trip(&context, &TripRequest::new("A", "B")).expect("plan");

    assert_eq!(plan.route_ids(), vec!["A", "M", "B"]);
    assert!(!plan.simulation_feasible);
    assert!(!plan.candidates[0].is_feasible());
    assert_eq!(plan.report.charges.len(), 1);
    let summary = TripSummary::from_plan(&plan).expect("summary");
    assert_eq!(summary.notes, vec![UNSIMULATED_NOTE.to_string()]);
    assert!(summary
        .render(RenderMode::PlainText)
        .contains(&format!("Note: {UNSIMULATED_NOTE}")));
}
