use std::fs;
use std::path::PathBuf;

use evroute_lib::{Error, StationCatalog};
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write station file");
    path
}

#[test]
fn csv_file_loads_and_remembers_its_path() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_file(
        &dir,
        "stations.csv",
        "Station ID,Latitude,Longitude,Power\nC1,10.0,106.0,50\nC2,10.1,106.1,\n",
    );

    let catalog = StationCatalog::from_path(&path).expect("load csv");

    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.get("C1").and_then(|s| s.power_kw), Some(50.0));
    assert_eq!(catalog.get("C2").and_then(|s| s.power_kw), None);
    assert_eq!(catalog.source_path(), Some(path.as_path()));
}

#[test]
fn json_extension_selects_json_parser() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_file(
        &dir,
        "stations.JSON",
        r#"[{"id": "J1", "name": "Depot", "latitude": 11.0, "lng": 107.0, "power": 120}]"#,
    );

    let catalog = StationCatalog::from_path(&path).expect("load json");

    let station = catalog.get("J1").expect("J1 present");
    assert_eq!(station.name, "Depot");
    assert_eq!(station.power_kw, Some(120.0));
}

#[test]
fn multiple_files_merge_and_drop_duplicate_coordinates() {
    let dir = TempDir::new().expect("temp dir");
    let first = write_file(&dir, "a.csv", "id,lat,lon\nA1,10.0,106.0\nA2,10.2,106.2\n");
    let second = write_file(
        &dir,
        "b.json",
        r#"[{"id": "B1", "lat": 10.0, "lon": 106.0}, {"id": "B2", "lat": 10.4, "lon": 106.4}]"#,
    );

    let catalog = StationCatalog::from_paths(&[first, second]).expect("merge");

    let ids: Vec<&str> = catalog.stations().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["A1", "A2", "B2"]);
    assert!(catalog.source_path().is_none());
}

#[test]
fn malformed_files_are_rejected() {
    let dir = TempDir::new().expect("temp dir");
    let csv = write_file(&dir, "bad.csv", "id,lat,lon\nA1,north,106.0\n");
    let json = write_file(&dir, "bad.json", "{ not json");

    let err = StationCatalog::from_path(&csv).unwrap_err();
    assert!(matches!(err, Error::StationData { ref message } if message.contains("row 2")));
    assert!(StationCatalog::from_path(&json).is_err());
    assert!(StationCatalog::from_path(&dir.path().join("missing.csv")).is_err());
}
