// Command handlers for the CLI subcommands.
//
// main.rs parses arguments, loads the station catalog and dispatches to
// these handlers.

pub mod nearest;
pub mod route;
pub mod simulate;
pub mod stations;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use evroute_lib::{build_graph, Graph, GraphBuildOptions, NeighborSelection, StationCatalog};

/// Load the station catalog.
///
/// Uses, in order:
/// 1. Files passed with `--stations` or listed in `EVROUTE_STATIONS`
/// 2. The checked-in fixture (only in debug builds)
pub fn load_catalog(paths: &[PathBuf]) -> Result<StationCatalog> {
    if !paths.is_empty() {
        return StationCatalog::from_paths(paths)
            .with_context(|| format!("failed to load stations from {}", display_paths(paths)));
    }

    let path = station_file_candidates()
        .into_iter()
        .find(|p| p.exists())
        .ok_or_else(|| {
            anyhow::anyhow!("no station file given; pass --stations or set EVROUTE_STATIONS")
        })?;
    StationCatalog::from_path(&path)
        .with_context(|| format!("failed to load stations from {}", path.display()))
}

fn station_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if cfg!(debug_assertions) {
        candidates.push(
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../docs/fixtures/stations.csv"),
        );
    }
    candidates
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the station graph connecting each station to its `k` nearest.
pub fn build_station_graph(catalog: &StationCatalog, k: usize) -> Result<Graph> {
    anyhow::ensure!(k > 0, "--neighbors must be at least 1");
    anyhow::ensure!(!catalog.is_empty(), "station catalog is empty");
    let options = GraphBuildOptions {
        neighbors: NeighborSelection::Nearest(k),
        ..GraphBuildOptions::default()
    };
    let graph = build_graph(catalog.stations(), &options);
    debug!(
        stations = catalog.len(),
        edges = graph.edge_count(),
        neighbors = k,
        "station graph ready"
    );
    Ok(graph)
}

/// Read a polyline file: a JSON array of `{"lat": .., "lon": ..}` objects.
pub fn read_polyline(path: &Path) -> Result<Vec<evroute_lib::Coordinate>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read polyline from {}", path.display()))?;
    serde_json::from_str(&body)
        .with_context(|| format!("failed to parse polyline from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn zero_neighbours_is_rejected() {
        let catalog = StationCatalog::default();
        let err = build_station_graph(&catalog, 0).unwrap_err();
        assert!(err.to_string().contains("--neighbors"));
    }

    #[test]
    fn polyline_file_is_parsed() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"[{{"lat": 10.0, "lon": 106.0}}, {{"lat": 10.5, "lon": 106.5}}]"#)
            .expect("write");
        let points = read_polyline(file.path()).expect("parsed");
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].lat, 10.5);
    }

    #[test]
    fn malformed_polyline_reports_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not json").expect("write");
        let err = read_polyline(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse polyline"));
    }
}
