//! Command-line interface for the OSM conflator.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod conflate;
mod error;
mod query;

pub use error::CliError;

use conflate::{ConflateArgs, run_conflate};
use query::{QueryArgs, run_query};

const ARG_OSM: &str = "osm";
const ARG_INCOMING: &str = "incoming";
const ENV_OSM: &str = "OSM_CONFLATOR_CMDS_CONFLATE_OSM";
const ENV_INCOMING: &str = "OSM_CONFLATOR_CMDS_CONFLATE_INCOMING";

/// Run the conflator CLI with the current process arguments and environment.
///
/// # Errors
///
/// Returns [`CliError`] when arguments, configuration, inputs or outputs are
/// invalid.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Conflate(args) => run_conflate(args),
        Command::Query(args) => run_query(&args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "osm-conflator",
    about = "Conflate incoming datasets with OpenStreetMap",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Match an incoming GeoJSON dataset against an OSM snapshot.
    Conflate(ConflateArgs),
    /// Print PostPass SQL for extracting an OSM snapshot.
    Query(QueryArgs),
}

#[cfg(test)]
mod tests;
