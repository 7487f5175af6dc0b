//! globetile CLI - drive the tiling and scheduling library from a terminal.
//!
//! Subcommands simulate a camera orbiting a globe, answer spatial index
//! queries and manage the configuration file.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "globetile", version, about = "Virtual globe tiling and tile scheduling")]
struct Cli {
    /// Configuration file (defaults to ~/.config/globetile/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. "debug" or "globetile=trace"
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run frames of an orbiting camera against a content provider
    Simulate(SimulateArgs),

    /// Print the level-zero tile containing a point
    Locate {
        /// Longitude in degrees
        #[arg(allow_hyphen_values = true)]
        lon: f64,

        /// Latitude in degrees
        #[arg(allow_hyphen_values = true)]
        lat: f64,

        /// Also print the nested pixel at this order
        #[arg(long)]
        order: Option<u32>,
    },

    /// Print the level-zero tiles a bounding box may overlap
    Query {
        #[arg(allow_hyphen_values = true)]
        west: f64,
        #[arg(allow_hyphen_values = true)]
        south: f64,
        #[arg(allow_hyphen_values = true)]
        east: f64,
        #[arg(allow_hyphen_values = true)]
        north: f64,
    },

    /// View or modify configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Config { command } => commands::config::run(command, config_path),
        command => {
            let mut config = commands::common::load_config(config_path)?;
            if let Some(filter) = cli.log {
                config.logging.filter = filter;
            }
            let _guard = globetile::logging::init_logging(&config.logging)?;

            match command {
                Commands::Simulate(args) => commands::simulate::run(config, args),
                Commands::Locate { lon, lat, order } => {
                    commands::index::run_locate(&config, lon, lat, order)
                }
                Commands::Query {
                    west,
                    south,
                    east,
                    north,
                } => commands::index::run_query(&config, west, south, east, north),
                Commands::Config { .. } => Ok(()),
            }
        }
    }
}
