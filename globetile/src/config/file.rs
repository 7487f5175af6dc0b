//! INI persistence for [`GlobeConfig`].
//!
//! The file lives at `~/.config/globetile/config.ini`:
//!
//! ```ini
//! [tiling]
//! crs = wgs84
//! scheme = geo
//! nx = 4
//! ny = 2
//!
//! [scheduler]
//! max_requests = 4
//! retry_policy = fixed
//! ```
//!
//! Missing keys keep their defaults. Unknown keys are logged and skipped so
//! that older binaries can read newer files.

use std::path::{Path, PathBuf};

use ini::Ini;
use tracing::{debug, warn};

use super::{ConfigError, ConfigKey, GlobeConfig};

/// File name inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// `~/.config/globetile` (or the platform equivalent).
pub fn config_directory() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("globetile"))
        .ok_or(ConfigError::NoConfigDirectory)
}

/// Full path of the default configuration file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_directory()?.join(CONFIG_FILE_NAME))
}

impl GlobeConfig {
    /// Loads the default configuration file, falling back to defaults when
    /// it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path()?;
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Loads and validates a configuration file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path)?;
        let mut config = Self::default();

        // The scheme decides which tiling keys apply, so it goes first.
        if let Some(scheme) = ini
            .section(Some(ConfigKey::TilingKind.section()))
            .and_then(|s| s.get(ConfigKey::TilingKind.key_name()))
        {
            ConfigKey::TilingKind.set(&mut config, scheme)?;
        }

        for (section, properties) in ini.iter() {
            let Some(section) = section else {
                continue;
            };
            for (key, value) in properties.iter() {
                let name = format!("{}.{}", section, key);
                match name.parse::<ConfigKey>() {
                    Ok(ConfigKey::TilingKind) => {}
                    Ok(config_key) => {
                        if !value.trim().is_empty() || config_key == ConfigKey::LoggingFile {
                            config_key.set(&mut config, value)?;
                        }
                    }
                    Err(_) => warn!(key = %name, path = %path.display(), "Ignoring unknown config key"),
                }
            }
        }

        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Saves to the default configuration file, creating its directory.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Writes every applicable key to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if value.is_empty() {
                continue;
            }
            ini.with_section(Some(key.section()))
                .set(key.key_name(), value);
        }
        ini.write_to_file(path)?;
        debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}
