use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::geo::{polyline_length_km, Coordinate};

use super::build_client;

/// One road route returned by a [`RoadRouter`].
#[derive(Debug, Clone, PartialEq)]
pub struct RoadRoute {
    /// Ordered polyline from start to end.
    pub points: Vec<Coordinate>,
    /// Route length in km.
    pub distance_km: f64,
}

/// Road-routing collaborator: coordinates in, ordered polylines out.
pub trait RoadRouter {
    /// Fetch routes between two coordinates. With `alternatives` set the
    /// service may return more than one route; the first is the primary one.
    fn routes(&self, start: Coordinate, end: Coordinate, alternatives: bool)
        -> Result<Vec<RoadRoute>>;
}

/// Blocking client for the OSRM `route` service.
#[derive(Debug, Clone)]
pub struct OsrmClient {
    base_url: String,
    client: Client,
}

impl OsrmClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: build_client(Duration::from_secs(15))?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn route_url(&self, start: Coordinate, end: Coordinate) -> String {
        // OSRM expects lon,lat order.
        format!(
            "{}/route/v1/driving/{},{};{},{}",
            self.base_url, start.lon, start.lat, end.lon, end.lat
        )
    }
}

impl RoadRouter for OsrmClient {
    fn routes(
        &self,
        start: Coordinate,
        end: Coordinate,
        alternatives: bool,
    ) -> Result<Vec<RoadRoute>> {
        let url = self.route_url(start, end);
        debug!(%url, alternatives, "requesting OSRM routes");
        let body = self
            .client
            .get(&url)
            .query(&[
                ("alternatives", if alternatives { "true" } else { "false" }),
                ("overview", "full"),
                ("geometries", "polyline"),
            ])
            .send()?
            .error_for_status()?
            .text()?;
        parse_osrm_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    #[serde(default)]
    geometry: Option<String>,
    /// Metres.
    #[serde(default)]
    distance: Option<f64>,
}

/// Parse an OSRM `route` JSON body into road routes.
///
/// Routes without geometry are skipped. Route length comes from the response
/// when present, otherwise from the summed haversine length of the polyline.
pub fn parse_osrm_response(body: &str) -> Result<Vec<RoadRoute>> {
    let response: OsrmResponse = serde_json::from_str(body)?;
    if response.code != "Ok" {
        return Err(Error::RoadRouter {
            message: response
                .message
                .unwrap_or_else(|| format!("service returned code {}", response.code)),
        });
    }

    let mut routes = Vec::with_capacity(response.routes.len());
    for route in response.routes {
        let Some(geometry) = route.geometry.filter(|g| !g.is_empty()) else {
            warn!("skipping OSRM route without geometry");
            continue;
        };
        let points = decode_polyline(&geometry)?;
        if points.len() < 2 {
            warn!("skipping OSRM route with fewer than two points");
            continue;
        }
        let distance_km = route
            .distance
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|metres| metres / 1000.0)
            .unwrap_or_else(|| polyline_length_km(&points));
        routes.push(RoadRoute {
            points,
            distance_km,
        });
    }
    Ok(routes)
}

/// Decode an encoded polyline with precision 1e5.
pub fn decode_polyline(encoded: &str) -> Result<Vec<Coordinate>> {
    let bytes = encoded.as_bytes();
    let mut index = 0usize;
    let mut lat = 0i64;
    let mut lon = 0i64;
    let mut points = Vec::new();

    while index < bytes.len() {
        lat += decode_value(bytes, &mut index)?;
        lon += decode_value(bytes, &mut index)?;
        points.push(Coordinate::new(lat as f64 / 1e5, lon as f64 / 1e5));
    }
    Ok(points)
}

fn decode_value(bytes: &[u8], index: &mut usize) -> Result<i64> {
    let mut result = 0i64;
    let mut shift = 0u32;
    loop {
        let Some(&byte) = bytes.get(*index) else {
            return Err(Error::RoadRouter {
                message: "truncated polyline".to_string(),
            });
        };
        *index += 1;
        let chunk = i64::from(byte) - 63;
        if !(0..64).contains(&chunk) || shift > 60 {
            return Err(Error::RoadRouter {
                message: format!("invalid polyline character '{}'", byte as char),
            });
        }
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }
    Ok(if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    })
}
