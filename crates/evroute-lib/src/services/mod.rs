//! Clients for the external collaborators used during trip planning.
//!
//! The core only depends on the [`RoadRouter`] and [`Geocoder`] traits. The
//! HTTP clients are optional and never retried inside the library.

mod geocode;
mod road;

use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::{Error, Result};

pub use geocode::{parse_nominatim_response, GeocodeCandidate, Geocoder, NominatimClient};
pub use road::{decode_polyline, parse_osrm_response, OsrmClient, RoadRoute, RoadRouter};

/// Public OSRM demo server.
pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";

/// Public Nominatim instance.
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent())
        .build()
        .map_err(Error::Http)
}

fn user_agent() -> String {
    format!("evroute-lib/{version}", version = env!("CARGO_PKG_VERSION"))
}
