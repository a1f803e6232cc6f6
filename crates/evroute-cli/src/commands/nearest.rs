//! Nearest command handler.

use anyhow::{Context, Result};

use evroute_lib::Graph;

use crate::output::{format_nearest, render_json, NearestStation, OutputFormat};
use crate::terminal::ColorPalette;
use crate::NearestArgs;

/// Handle the nearest subcommand.
///
/// Reports the closest station to a coordinate, or fails when none lies
/// within the radius.
pub fn handle_nearest_command(
    graph: &Graph,
    format: OutputFormat,
    args: &NearestArgs,
) -> Result<()> {
    anyhow::ensure!(
        args.radius.is_finite() && args.radius > 0.0,
        "radius must be a positive number"
    );
    anyhow::ensure!(args.at.is_valid(), "coordinate {} is out of range", args.at);

    let (node, distance_km) = graph
        .nearest_station(args.at, args.radius)
        .ok_or_else(|| anyhow::anyhow!("No station within {} km of {}.", args.radius, args.at))?;
    let nearest = NearestStation {
        id: node.key.clone(),
        name: node.name.clone(),
        lat: node.coordinate.lat,
        lon: node.coordinate.lon,
        power_kw: node.power_kw,
        distance_km,
    };

    match format {
        OutputFormat::Json => render_json(&nearest).context("failed to write result")?,
        OutputFormat::Text | OutputFormat::Rich => {
            print!("{}", format_nearest(&nearest, &ColorPalette::detect()))
        }
    }
    Ok(())
}
