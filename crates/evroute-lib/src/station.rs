//! Charging station records and catalog loading.
//!
//! Stations are loaded from CSV or JSON files into a [`StationCatalog`]. The
//! catalog is immutable once built; user-picked start/end points never enter
//! it and live as virtual nodes in the routing graph instead.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::geo::Coordinate;

/// Minimum Jaro-Winkler similarity for a name to be offered as a suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A curated charging station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub coordinate: Coordinate,
    /// Charging power rating in kW, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_kw: Option<f64>,
}

impl Station {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        lat: f64,
        lon: f64,
        power_kw: Option<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            coordinate: Coordinate::new(lat, lon),
            power_kw,
        }
    }
}

/// Raw JSON row; `id` and `power_kw` are optional on input.
#[derive(Debug, Deserialize)]
struct StationRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "lng", alias = "longitude")]
    lon: f64,
    #[serde(default, alias = "power")]
    power_kw: Option<f64>,
}

/// Result of resolving free-form user input against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// A known station identifier.
    Station(String),
    /// An arbitrary coordinate that needs a virtual node.
    Coordinate(Coordinate),
}

/// Collection of stations keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    stations: Vec<Station>,
    index: HashMap<String, usize>,
    source: Option<PathBuf>,
}

impl StationCatalog {
    /// Build a catalog from already-constructed stations.
    pub fn from_stations(stations: Vec<Station>) -> Result<Self> {
        let mut index = HashMap::with_capacity(stations.len());
        for (position, station) in stations.iter().enumerate() {
            if !station.coordinate.is_valid() {
                return Err(Error::StationData {
                    message: format!(
                        "station '{}' has invalid coordinate {},{}",
                        station.id, station.coordinate.lat, station.coordinate.lon
                    ),
                });
            }
            if index.insert(station.id.clone(), position).is_some() {
                return Err(Error::DuplicateStation {
                    id: station.id.clone(),
                });
            }
        }
        Ok(Self {
            stations,
            index,
            source: None,
        })
    }

    /// Load a catalog from a file path. `.json` files are parsed as a JSON
    /// array; everything else is treated as CSV.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let mut catalog = if is_json {
            Self::from_json_reader(file)?
        } else {
            Self::from_csv_reader(file)?
        };
        info!(
            path = %path.display(),
            stations = catalog.len(),
            "loaded station catalog"
        );
        catalog.source = Some(path.to_path_buf());
        Ok(catalog)
    }

    /// Load and merge several station files, dropping rows whose coordinates
    /// duplicate an earlier row.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self> {
        let catalogs = paths
            .iter()
            .map(|p| Self::from_path(p))
            .collect::<Result<Vec<_>>>()?;
        Self::merge(catalogs)
    }

    /// Load a catalog from CSV data.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = ReaderBuilder::new().trim(Trim::Fields).from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|err| Error::StationData {
                message: format!("failed to read station headers: {err}"),
            })?
            .clone();

        let normalize = |s: &str| {
            s.to_ascii_lowercase()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect::<String>()
        };
        let normalized_headers: Vec<String> = headers.iter().map(normalize).collect();

        let synonyms: &[(&str, &[&str])] = &[
            ("id", &["id", "station_id", "stationid"]),
            ("name", &["name", "station_name", "stationname", "title"]),
            ("lat", &["lat", "latitude"]),
            ("lon", &["lon", "lng", "long", "longitude"]),
            ("power_kw", &["power_kw", "powerkw", "power", "kw"]),
        ];

        let mut index_map: BTreeMap<&str, usize> = BTreeMap::new();
        for (canon, alts) in synonyms {
            if let Some(i) = alts
                .iter()
                .find_map(|alt| normalized_headers.iter().position(|h| h == alt))
            {
                index_map.insert(*canon, i);
            }
        }

        let missing: Vec<&str> = ["lat", "lon"]
            .into_iter()
            .filter(|c| !index_map.contains_key(c))
            .collect();
        if !missing.is_empty() {
            return Err(Error::StationData {
                message: format!(
                    "station file missing required columns: {}. Available: {}",
                    missing.join(", "),
                    headers.iter().collect::<Vec<_>>().join(", ")
                ),
            });
        }

        let mut records = Vec::new();
        for (offset, result) in csv_reader.records().enumerate() {
            // Header occupies line 1.
            let row = offset + 2;
            let record = result.map_err(|e| Error::StationData {
                message: e.to_string(),
            })?;
            let get = |field: &str| -> Option<String> {
                index_map
                    .get(field)
                    .and_then(|&i| record.get(i))
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };

            let parse = |field: &str| -> Result<f64> {
                get(field)
                    .ok_or_else(|| Error::StationData {
                        message: format!("missing {field} at row {row}"),
                    })?
                    .parse::<f64>()
                    .map_err(|e| Error::StationData {
                        message: format!("invalid {field} at row {row}: {e}"),
                    })
            };

            let power_kw = match get("power_kw") {
                Some(raw) => Some(raw.parse::<f64>().map_err(|e| Error::StationData {
                    message: format!("invalid power_kw at row {row}: {e}"),
                })?),
                None => None,
            };

            records.push(StationRecord {
                id: get("id"),
                name: get("name"),
                lat: parse("lat")?,
                lon: parse("lon")?,
                power_kw,
            });
        }

        Self::from_records(records)
    }

    /// Load a catalog from a JSON array of station objects.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let records: Vec<StationRecord> = serde_json::from_reader(reader)?;
        Self::from_records(records)
    }

    fn from_records(records: Vec<StationRecord>) -> Result<Self> {
        let width = if records.len() < 100 { 2 } else { 5 };
        let stations = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| {
                let id = record
                    .id
                    .unwrap_or_else(|| format!("ST{:0width$}", i + 1, width = width));
                let name = record.name.unwrap_or_else(|| id.clone());
                Station::new(id, name, record.lat, record.lon, record.power_kw)
            })
            .collect();
        Self::from_stations(stations)
    }

    /// Merge catalogs in order, dropping stations whose coordinates duplicate
    /// an earlier one. When identifiers collide across sources every station
    /// is renumbered as `ST00001`, `ST00002`, ...
    pub fn merge(catalogs: Vec<StationCatalog>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut merged: Vec<Station> = Vec::new();
        for catalog in catalogs {
            for station in catalog.stations {
                if seen.insert(station.coordinate.dedup_key()) {
                    merged.push(station);
                } else {
                    debug!(id = %station.id, "dropping station with duplicate coordinates");
                }
            }
        }

        let mut ids = HashSet::new();
        if !merged.iter().all(|s| ids.insert(s.id.clone())) {
            for (i, station) in merged.iter_mut().enumerate() {
                station.id = format!("ST{:05}", i + 1);
            }
        }
        Self::from_stations(merged)
    }

    /// Lookup a station by identifier.
    pub fn get(&self, id: &str) -> Option<&Station> {
        self.index.get(id).map(|&i| &self.stations[i])
    }

    /// All stations in load order.
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Get the source path if the catalog was loaded from a single file.
    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Stations whose name contains `query` (case-insensitive).
    pub fn find_by_name(&self, query: &str) -> Vec<&Station> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.stations
            .iter()
            .filter(|s| s.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Station names most similar to `name`, best first.
    pub fn fuzzy_matches(&self, name: &str, limit: usize) -> Vec<String> {
        let needle = name.trim().to_lowercase();
        let mut scored: Vec<(f64, &str)> = self
            .stations
            .iter()
            .map(|s| (strsim::jaro_winkler(&needle, &s.name.to_lowercase()), s.name.as_str()))
            .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.dedup_by(|a, b| a.1 == b.1);
        scored
            .into_iter()
            .take(limit)
            .map(|(_, name)| name.to_string())
            .collect()
    }

    /// Resolve user input as a station id, a unique partial name, or a
    /// `"lat,lon"` literal.
    pub fn resolve(&self, input: &str) -> Result<Endpoint> {
        let trimmed = input.trim();
        if let Some(station) = self.get(trimmed) {
            return Ok(Endpoint::Station(station.id.clone()));
        }

        let matches = self.find_by_name(trimmed);
        match matches.as_slice() {
            [only] => return Ok(Endpoint::Station(only.id.clone())),
            [] => {}
            many => {
                return Err(Error::UnknownStation {
                    name: trimmed.to_string(),
                    suggestions: many.iter().take(5).map(|s| s.name.clone()).collect(),
                })
            }
        }

        if let Ok(coordinate) = trimmed.parse::<Coordinate>() {
            return Ok(Endpoint::Coordinate(coordinate));
        }

        Err(Error::UnknownStation {
            name: trimmed.to_string(),
            suggestions: self.fuzzy_matches(trimmed, 3),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CSV: &str = "\
id,name,latitude,longitude,power_kw
ST01,Ben Thanh,10.7725,106.6980,60
ST02,Thu Duc,10.8500,106.7720,
ST03,Bien Hoa,10.9447,106.8243,150
";

    #[test]
    fn parses_csv_with_header_synonyms_and_optional_power() {
        let catalog = StationCatalog::from_csv_reader(Cursor::new(CSV)).expect("parses");
        assert_eq!(catalog.len(), 3);
        let st = catalog.get("ST02").expect("present");
        assert_eq!(st.name, "Thu Duc");
        assert_eq!(st.power_kw, None);
        assert_eq!(catalog.get("ST03").and_then(|s| s.power_kw), Some(150.0));
    }

    #[test]
    fn assigns_ids_when_missing() {
        let csv = "name,lat,lon\nA,10.0,106.0\nB,10.1,106.1\n";
        let catalog = StationCatalog::from_csv_reader(Cursor::new(csv)).expect("parses");
        let ids: Vec<_> = catalog.stations().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["ST01", "ST02"]);
    }

    #[test]
    fn missing_coordinate_columns_are_reported() {
        let csv = "id,name\nST01,A\n";
        let err = StationCatalog::from_csv_reader(Cursor::new(csv)).unwrap_err();
        assert!(err.to_string().contains("lat, lon"), "{err}");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let csv = "id,lat,lon\nX,10,106\nX,11,106\n";
        let err = StationCatalog::from_csv_reader(Cursor::new(csv)).unwrap_err();
        assert!(matches!(err, Error::DuplicateStation { id } if id == "X"));
    }

    #[test]
    fn parses_json_array() {
        let json = r#"[{"id":"A","name":"Alpha","lat":10.0,"lon":106.0,"power_kw":50},
                       {"name":"Beta","latitude":10.5,"longitude":106.5}]"#;
        let catalog = StationCatalog::from_json_reader(Cursor::new(json)).expect("parses");
        assert_eq!(catalog.get("A").and_then(|s| s.power_kw), Some(50.0));
        assert_eq!(catalog.get("ST02").map(|s| s.name.as_str()), Some("Beta"));
    }

    #[test]
    fn merge_drops_duplicate_coordinates_and_renumbers_on_collision() {
        let a = StationCatalog::from_stations(vec![
            Station::new("ST01", "A", 10.0, 106.0, Some(50.0)),
            Station::new("ST02", "B", 10.5, 106.0, None),
        ])
        .expect("valid");
        let b = StationCatalog::from_stations(vec![
            Station::new("ST01", "A copy", 10.0, 106.0, None),
            Station::new("ST02", "C", 11.0, 106.0, None),
        ])
        .expect("valid");
        let merged = StationCatalog::merge(vec![a, b]).expect("merges");
        let names: Vec<_> = merged.stations().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(merged.stations()[2].id, "ST00003");
    }

    #[test]
    fn resolves_id_partial_name_and_coordinates() {
        let catalog = StationCatalog::from_csv_reader(Cursor::new(CSV)).expect("parses");
        assert_eq!(
            catalog.resolve("ST03").unwrap(),
            Endpoint::Station("ST03".to_string())
        );
        assert_eq!(
            catalog.resolve("bien").unwrap(),
            Endpoint::Station("ST03".to_string())
        );
        assert_eq!(
            catalog.resolve("10.9,106.9").unwrap(),
            Endpoint::Coordinate(Coordinate::new(10.9, 106.9))
        );
    }

    #[test]
    fn ambiguous_name_lists_candidates() {
        let catalog = StationCatalog::from_csv_reader(Cursor::new(CSV)).expect("parses");
        // "h" matches all three names.
        match catalog.resolve("h") {
            Err(Error::UnknownStation { suggestions, .. }) => assert_eq!(suggestions.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_name_offers_fuzzy_suggestions() {
        let catalog = StationCatalog::from_csv_reader(Cursor::new(CSV)).expect("parses");
        match catalog.resolve("Ben Tanh") {
            Err(Error::UnknownStation { suggestions, .. }) => {
                assert_eq!(suggestions.first().map(String::as_str), Some("Ben Thanh"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
