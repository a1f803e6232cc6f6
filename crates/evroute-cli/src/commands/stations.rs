//! Stations command handler for listing the loaded catalog.

use anyhow::{Context, Result};

use evroute_lib::{Station, StationCatalog};

use crate::output::{format_station_table, render_json, OutputFormat};
use crate::terminal::ColorPalette;
use crate::StationsArgs;

/// Handle the stations subcommand.
pub fn handle_stations_command(
    catalog: &StationCatalog,
    format: OutputFormat,
    args: &StationsArgs,
) -> Result<()> {
    let stations: Vec<&Station> = match args.name.as_deref() {
        Some(name) => catalog.find_by_name(name),
        None => catalog.stations().iter().collect(),
    };

    match format {
        OutputFormat::Json => render_json(&stations).context("failed to write stations")?,
        OutputFormat::Text | OutputFormat::Rich => {
            print!("{}", format_station_table(&stations, &ColorPalette::detect()))
        }
    }
    Ok(())
}
