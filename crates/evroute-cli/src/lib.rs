//! evroute CLI library.
//!
//! Argument definitions, command handlers, terminal styling and output
//! formatting for the `evroute` binary.

pub mod commands;
pub mod output;
pub mod terminal;

use std::path::PathBuf;

use clap::{ArgGroup, Args};

use evroute_lib::{
    Coordinate, EdgeFilter, RoutePreference, SearchAlgorithm, SearchOptions, TripRequest,
    VehicleParams, DEFAULT_NOMINATIM_URL, DEFAULT_OSRM_URL,
};

/// Vehicle flags shared by the planning commands.
#[derive(Args, Debug, Clone)]
pub struct VehicleArgs {
    /// Energy consumption in kWh per 100 km.
    #[arg(long, default_value_t = 16.3)]
    pub consumption: f64,
    /// Usable battery capacity in kWh.
    #[arg(long, default_value_t = 60.0)]
    pub battery: f64,
    /// State of charge at departure (percent).
    #[arg(long = "start-soc", default_value_t = 50.0)]
    pub start_soc: f64,
    /// SOC floor a hop should not cross (percent).
    #[arg(long = "safe-soc", default_value_t = 20.0)]
    pub safe_soc: f64,
    /// SOC to charge up to at a stop (percent).
    #[arg(long = "charge-target", default_value_t = 80.0)]
    pub charge_target: f64,
    /// Average driving speed in km/h.
    #[arg(long, default_value_t = 60.0)]
    pub speed: f64,
}

impl VehicleArgs {
    pub fn to_params(&self) -> VehicleParams {
        VehicleParams {
            consumption_kwh_per_100km: self.consumption,
            battery_kwh_max: self.battery,
            start_soc_percent: self.start_soc,
            safe_soc_percent: self.safe_soc,
            charge_target_percent: self.charge_target,
            avg_speed_kmh: self.speed,
        }
    }
}

/// Road-router flags.
#[derive(Args, Debug, Clone)]
pub struct RoadArgs {
    /// Query the OSRM road router for routes and detour legs.
    #[arg(long)]
    pub road: bool,
    /// Base URL of the OSRM service.
    #[arg(long = "osrm-url", env = "EVROUTE_OSRM_URL", default_value = DEFAULT_OSRM_URL)]
    pub osrm_url: String,
}

/// Arguments for the route command.
#[derive(Args, Debug, Clone)]
pub struct RouteArgs {
    /// Start: station id, partial station name, "lat,lon" or a place name.
    #[arg(long = "from")]
    pub from: String,
    /// Destination, in the same forms as --from.
    #[arg(long = "to")]
    pub to: String,
    /// Search algorithm (ucs or a-star).
    #[arg(long, default_value_t = SearchAlgorithm::AStar)]
    pub algorithm: SearchAlgorithm,
    /// What the chosen route should minimise (time, distance, fewest-charges).
    #[arg(long = "prefer", default_value_t = RoutePreference::Time)]
    pub prefer: RoutePreference,
    /// Drop highway edges before searching.
    #[arg(long = "avoid-highway")]
    pub avoid_highway: bool,
    /// Drop toll edges before searching.
    #[arg(long = "avoid-toll")]
    pub avoid_toll: bool,
    /// Only charge at stations directly connected in the graph.
    #[arg(long = "no-nearby-fallback")]
    pub no_nearby_fallback: bool,
    /// Upper bound on expanded search states.
    #[arg(long = "max-expansions", default_value_t = 50_000)]
    pub max_expansions: usize,
    /// Fixed minutes added to every charging stop.
    #[arg(long = "charge-penalty", default_value_t = 0.0)]
    pub charge_penalty: f64,
    /// Radius in km used to snap road routes onto stations.
    #[arg(long = "snap-radius", default_value_t = 5.0)]
    pub snap_radius: f64,
    /// Geocode endpoints that match no station with Nominatim.
    #[arg(long)]
    pub geocode: bool,
    /// Base URL of the Nominatim service.
    #[arg(
        long = "nominatim-url",
        env = "EVROUTE_NOMINATIM_URL",
        default_value = DEFAULT_NOMINATIM_URL
    )]
    pub nominatim_url: String,
    #[command(flatten)]
    pub road: RoadArgs,
    #[command(flatten)]
    pub vehicle: VehicleArgs,
}

impl RouteArgs {
    /// Convert CLI args to a library trip request.
    pub fn to_request(&self) -> TripRequest {
        let mut request = TripRequest::new(self.from.clone(), self.to.clone());
        request.vehicle = self.vehicle.to_params();
        request.preference = self.prefer;
        request.search = SearchOptions {
            algorithm: self.algorithm,
            nearby_fallback: !self.no_nearby_fallback,
            max_expansions: self.max_expansions,
            charge_penalty_minutes: self.charge_penalty,
            ..SearchOptions::default()
        };
        request.filter = EdgeFilter {
            avoid_highway: self.avoid_highway,
            avoid_toll: self.avoid_toll,
        };
        request.snap_radius_km = self.snap_radius;
        request
    }
}

/// Arguments for the simulate command.
#[derive(Args, Debug, Clone)]
#[command(group(ArgGroup::new("input").required(true).args(["route", "polyline"])))]
pub struct SimulateArgs {
    /// Comma-separated station ids to replay.
    #[arg(long, value_delimiter = ',')]
    pub route: Vec<String>,
    /// JSON file holding an array of {"lat", "lon"} points to replay.
    #[arg(long)]
    pub polyline: Option<PathBuf>,
    /// Chargers considered per detour search.
    #[arg(long = "nearby-k", default_value_t = 5)]
    pub nearby_k: usize,
    /// Radius in km for detour candidates.
    #[arg(long = "nearby-radius", default_value_t = 100.0)]
    pub nearby_radius: f64,
    #[command(flatten)]
    pub road: RoadArgs,
    #[command(flatten)]
    pub vehicle: VehicleArgs,
}

/// Arguments for the nearest command.
#[derive(Args, Debug, Clone)]
pub struct NearestArgs {
    /// Coordinate to search around, as "lat,lon".
    #[arg(long = "at", allow_hyphen_values = true)]
    pub at: Coordinate,
    /// Search radius in km.
    #[arg(long, default_value_t = 50.0)]
    pub radius: f64,
}

/// Arguments for the stations command.
#[derive(Args, Debug, Clone)]
pub struct StationsArgs {
    /// Only list stations whose name contains this text.
    #[arg(long)]
    pub name: Option<String>,
}
