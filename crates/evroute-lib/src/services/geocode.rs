use std::collections::HashSet;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::geo::Coordinate;

use super::build_client;

/// Candidate location for a free-text query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeCandidate {
    pub coordinate: Coordinate,
    pub label: String,
}

/// Geocoding collaborator: free text in, zero or more candidates out.
pub trait Geocoder {
    fn geocode(&self, query: &str, limit: usize) -> Result<Vec<GeocodeCandidate>>;
}

/// Blocking client for the Nominatim `search` endpoint.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    base_url: String,
    client: Client,
}

impl NominatimClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: build_client(Duration::from_secs(5))?,
        })
    }
}

impl Geocoder for NominatimClient {
    fn geocode(&self, query: &str, limit: usize) -> Result<Vec<GeocodeCandidate>> {
        let url = format!("{}/search", self.base_url);
        debug!(%url, query, "geocoding");
        let limit = limit.to_string();
        let body = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json"), ("limit", limit.as_str())])
            .send()?
            .error_for_status()?
            .text()?;
        parse_nominatim_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

/// Parse a Nominatim JSON array. Entries with unparsable coordinates are
/// skipped, and candidates sharing a coordinate (to six decimals) are
/// collapsed onto the first one.
pub fn parse_nominatim_response(body: &str) -> Result<Vec<GeocodeCandidate>> {
    let places: Vec<NominatimPlace> = serde_json::from_str(body).map_err(|e| Error::Geocoder {
        message: format!("unexpected response: {e}"),
    })?;

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for place in places {
        let (Ok(lat), Ok(lon)) = (place.lat.parse::<f64>(), place.lon.parse::<f64>()) else {
            warn!(
                lat = %place.lat,
                lon = %place.lon,
                "skipping geocode result with bad coordinates"
            );
            continue;
        };
        let coordinate = Coordinate::new(lat, lon);
        if !coordinate.is_valid() || !seen.insert(coordinate.dedup_key()) {
            continue;
        }
        candidates.push(GeocodeCandidate {
            coordinate,
            label: place.display_name,
        });
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_dedupes_candidates() {
        let body = r#"[
            {"lat": "10.7769", "lon": "106.7009", "display_name": "Ho Chi Minh City"},
            {"lat": "10.7769000", "lon": "106.7009000", "display_name": "Duplicate"},
            {"lat": "oops", "lon": "106.0", "display_name": "Broken"},
            {"lat": "21.0285", "lon": "105.8542", "display_name": "Ha Noi"}
        ]"#;
        let candidates = parse_nominatim_response(body).expect("parsed");
        let labels: Vec<_> = candidates.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Ho Chi Minh City", "Ha Noi"]);
    }

    #[test]
    fn rejects_non_array_body() {
        assert!(matches!(
            parse_nominatim_response(r#"{"error": "bad"}"#),
            Err(Error::Geocoder { .. })
        ));
    }
}
