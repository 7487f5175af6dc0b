//! CLI error type.

use thiserror::Error;

use globetile::config::ConfigError;
use globetile::provider::FetchError;
use globetile::GlobeError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    Globe(#[from] GlobeError),

    #[error("provider error: {0}")]
    Provider(#[from] FetchError),

    #[error("failed to read GeoJSON: {0}")]
    GeoJson(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_is_transparent() {
        let err: CliError = ConfigError::UnknownKey("tile.nope".into()).into();
        assert_eq!(err.to_string(), "unknown configuration key 'tile.nope'");
    }

    #[test]
    fn test_globe_error_message() {
        let err: CliError = GlobeError::Destroyed.into();
        assert_eq!(err.to_string(), "globe has been destroyed");
    }
}
