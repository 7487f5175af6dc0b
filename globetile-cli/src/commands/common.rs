//! Common helpers shared across CLI commands.

use std::fs;
use std::path::{Path, PathBuf};

use globetile::config::{config_file_path, GlobeConfig};
use globetile::geo::Geometry;
use serde_json::Value;
use tracing::warn;

use crate::error::CliError;

/// Configuration file to use: `--config` when given, otherwise the default.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Result<PathBuf, CliError> {
    match cli_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(config_file_path()?),
    }
}

/// Loads the configuration, falling back to defaults when the file is absent.
pub fn load_config(cli_path: Option<&Path>) -> Result<GlobeConfig, CliError> {
    let path = resolve_config_path(cli_path)?;
    if !path.exists() {
        if cli_path.is_some() {
            return Err(CliError::Config(format!(
                "Configuration file '{}' does not exist",
                path.display()
            )));
        }
        return Ok(GlobeConfig::default());
    }
    Ok(GlobeConfig::load_from(&path)?)
}

/// Reads the geometries of a GeoJSON file.
///
/// Accepts a FeatureCollection, a single Feature or a bare geometry object.
/// Features without a usable geometry are skipped with a warning.
pub fn load_geometries(path: &Path) -> Result<Vec<Geometry>, CliError> {
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text)?;
    parse_geometries(value)
}

fn parse_geometries(value: Value) -> Result<Vec<Geometry>, CliError> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CliError::GeoJson("object has no \"type\"".to_string()))?
        .to_string();

    match kind.as_str() {
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| CliError::GeoJson("FeatureCollection without features".to_string()))?;
            Ok(features
                .iter()
                .enumerate()
                .filter_map(|(index, feature)| feature_geometry(index, feature))
                .collect())
        }
        "Feature" => Ok(feature_geometry(0, &value).into_iter().collect()),
        _ => Ok(vec![serde_json::from_value(value)?]),
    }
}

fn feature_geometry(index: usize, feature: &Value) -> Option<Geometry> {
    let geometry = feature.get("geometry").filter(|g| !g.is_null())?;
    match serde_json::from_value(geometry.clone()) {
        Ok(geometry) => Some(geometry),
        Err(e) => {
            warn!(feature = index, error = %e, "Skipping feature with unsupported geometry");
            None
        }
    }
}
