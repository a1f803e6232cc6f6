//! Output formatting for trip summaries, station lists and lookups.

use std::fmt::Write as _;
use std::io::{self, Write};

use clap::ValueEnum;
use serde::Serialize;

use evroute_lib::{RenderMode, Station, TripSummary};

use crate::terminal::ColorPalette;

/// Output format selected with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text.
    #[default]
    Text,
    /// Markdown-flavoured text.
    Rich,
    /// Pretty-printed JSON.
    Json,
}

/// Nearest-station lookup result.
#[derive(Debug, Clone, Serialize)]
pub struct NearestStation {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_kw: Option<f64>,
    pub distance_km: f64,
}

/// Print a trip summary in the requested format.
pub fn render_summary(summary: &TripSummary, format: OutputFormat) -> io::Result<()> {
    match format {
        OutputFormat::Text => print!("{}", summary.render(RenderMode::PlainText)),
        OutputFormat::Rich => print!("{}", summary.render(RenderMode::RichText)),
        OutputFormat::Json => render_json(summary)?,
    }
    Ok(())
}

/// Print any serialisable value as pretty JSON followed by a newline.
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer_pretty(&mut stdout, value).map_err(io::Error::other)?;
    stdout.write_all(b"\n")?;
    Ok(())
}

/// Format a station table.
pub fn format_station_table(stations: &[&Station], palette: &ColorPalette) -> String {
    let p = palette;
    let mut buffer = String::new();
    if stations.is_empty() {
        let _ = writeln!(buffer, "No stations match.");
        return buffer;
    }

    let _ = writeln!(buffer, "Stations ({}):", stations.len());
    let _ = writeln!(
        buffer,
        "{}{:<8} {:<28} {:>10} {:>11} {:>9}{}",
        p.gray, "Id", "Name", "Lat", "Lon", "Power", p.reset
    );
    for station in stations {
        let power = match station.power_kw {
            Some(kw) if kw > 0.0 => format!("{}{:>6.0} kW{}", p.green, kw, p.reset),
            _ => format!("{}{:>9}{}", p.yellow, "-", p.reset),
        };
        let _ = writeln!(
            buffer,
            "{:<8} {}{:<28}{} {:>10.4} {:>11.4} {}",
            station.id,
            p.white_bold,
            station.name,
            p.reset,
            station.coordinate.lat,
            station.coordinate.lon,
            power
        );
    }
    buffer
}

/// Format a nearest-station result.
pub fn format_nearest(nearest: &NearestStation, palette: &ColorPalette) -> String {
    let p = palette;
    let power = nearest
        .power_kw
        .filter(|kw| *kw > 0.0)
        .map(|kw| format!("{kw:.0} kW"))
        .unwrap_or_else(|| "no charger power".to_string());
    format!(
        "Nearest station: {}{}{} ({}) at {:.2} km, {}\n",
        p.white_bold, nearest.name, p.reset, nearest.id, nearest.distance_km, power
    )
}
