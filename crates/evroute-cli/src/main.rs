use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use evroute_cli::commands::nearest::handle_nearest_command;
use evroute_cli::commands::route::handle_route_command;
use evroute_cli::commands::simulate::handle_simulate_command;
use evroute_cli::commands::stations::handle_stations_command;
use evroute_cli::commands::{build_station_graph, load_catalog};
use evroute_cli::output::OutputFormat;
use evroute_cli::{NearestArgs, RouteArgs, SimulateArgs, StationsArgs};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Range-aware route planning for electric vehicles across charging stations"
)]
struct Cli {
    /// Station files (CSV or JSON); several files are merged.
    #[arg(
        long = "stations",
        env = "EVROUTE_STATIONS",
        value_delimiter = ',',
        global = true
    )]
    stations: Vec<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Neighbours linked to each station when building the graph.
    #[arg(long = "neighbors", default_value_t = 8, global = true)]
    neighbors: usize,

    /// Emit logs as JSON lines on stderr.
    #[arg(long = "log-json", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan a battery-feasible trip between two endpoints.
    Route(RouteArgs),
    /// Replay a station route or a polyline against the battery model.
    Simulate(SimulateArgs),
    /// Find the station closest to a coordinate.
    Nearest(NearestArgs),
    /// List the loaded stations.
    Stations(StationsArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let catalog = load_catalog(&cli.stations)?;
    if let Command::Stations(args) = &cli.command {
        return handle_stations_command(&catalog, cli.format, args);
    }

    let graph = build_station_graph(&catalog, cli.neighbors)?;
    match &cli.command {
        Command::Route(args) => handle_route_command(&catalog, &graph, cli.format, args),
        Command::Simulate(args) => handle_simulate_command(&graph, cli.format, args),
        Command::Nearest(args) => handle_nearest_command(&graph, cli.format, args),
        Command::Stations(args) => handle_stations_command(&catalog, cli.format, args),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output; logs go to stderr.
    let _ = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_level(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}
