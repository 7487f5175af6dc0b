//! Configuration management CLI commands.
//!
//! Provides `config get`, `config set`, `config list`, `config path`,
//! `config show` and `config init` for the INI configuration file.

use std::fs;
use std::path::Path;

use clap::Subcommand;
use globetile::config::{ConfigKey, GlobeConfig};

use super::common::{load_config, resolve_config_path};
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., scheduler.max_requests)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., scheduler.max_requests)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,

    /// Print the configuration file as stored on disk
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => run_get(&key, config_path),
        ConfigCommands::Set { key, value } => run_set(&key, &value, config_path),
        ConfigCommands::List => run_list(config_path),
        ConfigCommands::Path => run_path(config_path),
        ConfigCommands::Show => run_show(config_path),
        ConfigCommands::Init { force } => run_init(config_path, force),
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'globetile config list' to see available keys.",
            key
        ))
    })
}

/// Loads the file if present; a missing file means defaults.
fn load_or_default(config_path: Option<&Path>) -> Result<GlobeConfig, CliError> {
    let path = resolve_config_path(config_path)?;
    if path.exists() {
        load_config(Some(&path))
    } else {
        Ok(GlobeConfig::default())
    }
}

fn run_get(key: &str, config_path: Option<&Path>) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let config = load_or_default(config_path)?;
    let value = config_key.get(&config);

    if value.is_empty() {
        println!("(not set)");
    } else {
        println!("{}", value);
    }
    Ok(())
}

fn run_set(key: &str, value: &str, config_path: Option<&Path>) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let path = resolve_config_path(config_path)?;

    let mut config = load_or_default(Some(&path))?;
    config_key.set(&mut config, value)?;
    config.validate()?;
    config.save_to(&path)?;

    println!("Set {} = {}", config_key.name(), value);
    Ok(())
}

fn run_list(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_or_default(config_path)?;

    println!("Configuration Settings");
    println!("======================");
    println!();

    let mut current_section = "";
    for key in ConfigKey::all() {
        let section = key.section();
        if section != current_section {
            if !current_section.is_empty() {
                println!();
            }
            println!("[{}]", section);
            current_section = section;
        }

        let value = key.get(&config);
        if value.is_empty() {
            println!("  {} = (not set)", key.key_name());
        } else {
            println!("  {} = {}", key.key_name(), value);
        }
    }
    Ok(())
}

fn run_path(config_path: Option<&Path>) -> Result<(), CliError> {
    println!("{}", resolve_config_path(config_path)?.display());
    Ok(())
}

fn run_show(config_path: Option<&Path>) -> Result<(), CliError> {
    let path = resolve_config_path(config_path)?;
    if !path.exists() {
        println!("No configuration file at {}; defaults are in effect.", path.display());
        println!("Run 'globetile config init' to create one.");
        return Ok(());
    }
    print!("{}", fs::read_to_string(&path)?);
    Ok(())
}

fn run_init(config_path: Option<&Path>, force: bool) -> Result<(), CliError> {
    let path = resolve_config_path(config_path)?;
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "Configuration file '{}' already exists. Use --force to overwrite it.",
            path.display()
        )));
    }
    GlobeConfig::default().save_to(&path)?;

    println!("Configuration file: {}", path.display());
    println!();
    println!("Edit this file to customize globetile settings.");
    println!("CLI arguments override config file values when specified.");
    Ok(())
}
