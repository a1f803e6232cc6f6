//! Common test utilities and fixture helpers.

use std::cell::Cell;
use std::path::PathBuf;

use evroute_lib::geo::EARTH_RADIUS_KM;
use evroute_lib::{
    build_graph, Coordinate, Error, Graph, GraphBuildOptions, NeighborSelection, Result,
    RoadRoute, RoadRouter, Station, StationCatalog,
};

/// Path to fixtures directory used by tests.
#[allow(dead_code)]
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../docs/fixtures")
}

/// The checked-in Ho Chi Minh City / Da Lat station catalog.
#[allow(dead_code)]
pub fn fixture_catalog() -> StationCatalog {
    StationCatalog::from_path(&fixtures_dir().join("stations.csv")).expect("load fixture stations")
}

#[allow(dead_code)]
pub fn fixture_graph(k: usize) -> (StationCatalog, Graph) {
    let catalog = fixture_catalog();
    let graph = build_graph(
        catalog.stations(),
        &GraphBuildOptions {
            neighbors: NeighborSelection::Nearest(k),
            avg_speed_kmh: 60.0,
        },
    );
    (catalog, graph)
}

/// Point on the equator `km` east of the origin.
#[allow(dead_code)]
pub fn equator_km(km: f64) -> Coordinate {
    Coordinate::new(0.0, (km / EARTH_RADIUS_KM).to_degrees())
}

/// Station on the equator `km` east of the origin.
#[allow(dead_code)]
pub fn station_at_km(id: &str, km: f64, power_kw: Option<f64>) -> Station {
    let c = equator_km(km);
    Station::new(id, format!("Station {id}"), c.lat, c.lon, power_kw)
}

/// Station `north_km` north and `east_km` east of the origin.
#[allow(dead_code)]
pub fn station_at_offset(id: &str, north_km: f64, east_km: f64, power_kw: Option<f64>) -> Station {
    let lat = (north_km / EARTH_RADIUS_KM).to_degrees();
    let lon = equator_km(east_km).lon;
    Station::new(id, format!("Station {id}"), lat, lon, power_kw)
}

/// A and B 150 km apart. The straight line passes a slow 3 kW charger X at
/// the midpoint; a fast charger Y sits on a 180 km dogleg (90 km + 90 km).
#[allow(dead_code)]
pub fn dogleg_catalog() -> StationCatalog {
    StationCatalog::from_stations(vec![
        station_at_km("A", 0.0, None),
        station_at_km("X", 75.0, Some(3.0)),
        station_at_offset("Y", 49.75, 75.0, Some(350.0)),
        station_at_km("B", 150.0, None),
    ])
    .expect("valid catalog")
}

/// Graph linking every pair of stations within `max_km`.
#[allow(dead_code)]
pub fn distance_bound_graph(catalog: &StationCatalog, max_km: f64) -> Graph {
    build_graph(
        catalog.stations(),
        &GraphBuildOptions {
            neighbors: NeighborSelection::WithinDistance(max_km),
            avg_speed_kmh: 60.0,
        },
    )
}

/// Two stations `km` apart, connected by a single edge.
#[allow(dead_code)]
pub fn two_station_graph(km: f64, start_power: Option<f64>) -> Graph {
    let stations = vec![
        station_at_km("A", 0.0, start_power),
        station_at_km("B", km, Some(50.0)),
    ];
    build_graph(
        &stations,
        &GraphBuildOptions {
            neighbors: NeighborSelection::Nearest(1),
            avg_speed_kmh: 60.0,
        },
    )
}

/// Road router returning a straight line, stretched by `factor`, and
/// counting how often it was called.
#[allow(dead_code)]
pub struct StraightLineRouter {
    pub factor: f64,
    pub calls: Cell<usize>,
}

#[allow(dead_code)]
impl StraightLineRouter {
    pub fn new(factor: f64) -> Self {
        Self {
            factor,
            calls: Cell::new(0),
        }
    }
}

impl RoadRouter for StraightLineRouter {
    fn routes(
        &self,
        start: Coordinate,
        end: Coordinate,
        _alternatives: bool,
    ) -> Result<Vec<RoadRoute>> {
        self.calls.set(self.calls.get() + 1);
        Ok(vec![RoadRoute {
            points: vec![start, end],
            distance_km: start.distance_to(&end) * self.factor,
        }])
    }
}

/// Road router that always fails.
#[allow(dead_code)]
pub struct FailingRouter;

impl RoadRouter for FailingRouter {
    fn routes(&self, _start: Coordinate, _end: Coordinate, _alt: bool) -> Result<Vec<RoadRoute>> {
        Err(Error::RoadRouter {
            message: "service unavailable".to_string(),
        })
    }
}

/// Road router returning fixed alternatives regardless of input.
#[allow(dead_code)]
pub struct FixedRouter(pub Vec<Vec<Coordinate>>);

impl RoadRouter for FixedRouter {
    fn routes(&self, _start: Coordinate, _end: Coordinate, _alt: bool) -> Result<Vec<RoadRoute>> {
        Ok(self
            .0
            .iter()
            .map(|points| RoadRoute {
                points: points.clone(),
                distance_km: evroute_lib::geo::polyline_length_km(points),
            })
            .collect())
    }
}
