//! Addressable configuration keys (`section.key`).
//!
//! Used both by the INI file reader/writer and by the CLI `config get/set`
//! commands, so every persisted setting is reachable in exactly one place.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::crs::CrsKind;
use crate::geo::GeoBound;
use crate::scheduler::RetryPolicy;
use crate::tiling::{TilingScheme, DEFAULT_GEO_NX, DEFAULT_GEO_NY, DEFAULT_HEALPIX_ORDER};

use super::{ConfigError, GlobeConfig};

/// A single persisted setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    TilingCrs,
    TilingKind,
    TilingNx,
    TilingNy,
    TilingWest,
    TilingSouth,
    TilingEast,
    TilingNorth,
    TilingOrder,
    TileTesselation,
    TileImageSize,
    SchedulerMaxRequests,
    SchedulerMaxLevel,
    SchedulerRetryPolicy,
    SchedulerRetryAttempts,
    SchedulerRetryDelayFrames,
    SchedulerRenderWithoutContent,
    VectorMaxTilePerGeometry,
    LoggingFilter,
    LoggingFile,
    LoggingAnsi,
}

impl ConfigKey {
    /// Every key, in file order.
    pub fn all() -> &'static [ConfigKey] {
        use ConfigKey::*;
        &[
            TilingCrs,
            TilingKind,
            TilingNx,
            TilingNy,
            TilingWest,
            TilingSouth,
            TilingEast,
            TilingNorth,
            TilingOrder,
            TileTesselation,
            TileImageSize,
            SchedulerMaxRequests,
            SchedulerMaxLevel,
            SchedulerRetryPolicy,
            SchedulerRetryAttempts,
            SchedulerRetryDelayFrames,
            SchedulerRenderWithoutContent,
            VectorMaxTilePerGeometry,
            LoggingFilter,
            LoggingFile,
            LoggingAnsi,
        ]
    }

    /// INI section name.
    pub fn section(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            TilingCrs | TilingKind | TilingNx | TilingNy | TilingWest | TilingSouth
            | TilingEast | TilingNorth | TilingOrder => "tiling",
            TileTesselation | TileImageSize => "tile",
            SchedulerMaxRequests
            | SchedulerMaxLevel
            | SchedulerRetryPolicy
            | SchedulerRetryAttempts
            | SchedulerRetryDelayFrames
            | SchedulerRenderWithoutContent => "scheduler",
            VectorMaxTilePerGeometry => "vector",
            LoggingFilter | LoggingFile | LoggingAnsi => "logging",
        }
    }

    /// Key name inside its section.
    pub fn key_name(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            TilingCrs => "crs",
            TilingKind => "scheme",
            TilingNx => "nx",
            TilingNy => "ny",
            TilingWest => "west",
            TilingSouth => "south",
            TilingEast => "east",
            TilingNorth => "north",
            TilingOrder => "order",
            TileTesselation => "tesselation",
            TileImageSize => "image_size",
            SchedulerMaxRequests => "max_requests",
            SchedulerMaxLevel => "max_level",
            SchedulerRetryPolicy => "retry_policy",
            SchedulerRetryAttempts => "retry_attempts",
            SchedulerRetryDelayFrames => "retry_delay_frames",
            SchedulerRenderWithoutContent => "render_without_content",
            VectorMaxTilePerGeometry => "max_tile_per_geometry",
            LoggingFilter => "filter",
            LoggingFile => "file",
            LoggingAnsi => "ansi",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as a string; empty when the key does not apply.
    pub fn get(&self, config: &GlobeConfig) -> String {
        use ConfigKey::*;
        let geo = match &config.tiling {
            TilingScheme::Geo { nx, ny, bound } => Some((*nx, *ny, *bound)),
            TilingScheme::Healpix { .. } => None,
        };
        match self {
            TilingCrs => config.crs.to_string(),
            TilingKind => config.tiling.kind().to_string(),
            TilingNx => geo.map(|g| g.0.to_string()).unwrap_or_default(),
            TilingNy => geo.map(|g| g.1.to_string()).unwrap_or_default(),
            TilingWest => geo.map(|g| g.2.west.to_string()).unwrap_or_default(),
            TilingSouth => geo.map(|g| g.2.south.to_string()).unwrap_or_default(),
            TilingEast => geo.map(|g| g.2.east.to_string()).unwrap_or_default(),
            TilingNorth => geo.map(|g| g.2.north.to_string()).unwrap_or_default(),
            TilingOrder => match config.tiling {
                TilingScheme::Healpix { order } => order.to_string(),
                _ => String::new(),
            },
            TileTesselation => config.tile.tesselation.to_string(),
            TileImageSize => config.tile.image_size.to_string(),
            SchedulerMaxRequests => config.scheduler.max_requests.to_string(),
            SchedulerMaxLevel => config.scheduler.max_level.to_string(),
            SchedulerRetryPolicy => config.scheduler.retry.kind().to_string(),
            SchedulerRetryAttempts => config.scheduler.retry.max_attempts().to_string(),
            SchedulerRetryDelayFrames => config.scheduler.retry.base_delay_frames().to_string(),
            SchedulerRenderWithoutContent => config.scheduler.render_without_content.to_string(),
            VectorMaxTilePerGeometry => config.vector.max_tile_per_geometry.to_string(),
            LoggingFilter => config.logging.filter.clone(),
            LoggingFile => config
                .logging
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            LoggingAnsi => config.logging.ansi.to_string(),
        }
    }

    /// Parses and stores a value.
    pub fn set(&self, config: &mut GlobeConfig, value: &str) -> Result<(), ConfigError> {
        use ConfigKey::*;
        let value = value.trim();
        match self {
            TilingCrs => config.crs = value.parse::<CrsKind>().map_err(|r| self.invalid(value, r))?,
            TilingKind => {
                config.tiling = match value.to_lowercase().as_str() {
                    "geo" => match config.tiling {
                        TilingScheme::Geo { .. } => config.tiling.clone(),
                        _ => TilingScheme::Geo {
                            nx: DEFAULT_GEO_NX,
                            ny: DEFAULT_GEO_NY,
                            bound: GeoBound::WORLD,
                        },
                    },
                    "healpix" => match config.tiling {
                        TilingScheme::Healpix { .. } => config.tiling.clone(),
                        _ => TilingScheme::Healpix {
                            order: DEFAULT_HEALPIX_ORDER,
                        },
                    },
                    _ => return Err(self.invalid(value, "expected 'geo' or 'healpix'")),
                }
            }
            TilingNx | TilingNy | TilingWest | TilingSouth | TilingEast | TilingNorth => {
                let TilingScheme::Geo { nx, ny, bound } = &mut config.tiling else {
                    return Err(self.invalid(value, "only applies to the geo scheme"));
                };
                match self {
                    TilingNx => *nx = self.parse(value)?,
                    TilingNy => *ny = self.parse(value)?,
                    TilingWest => bound.west = self.parse(value)?,
                    TilingSouth => bound.south = self.parse(value)?,
                    TilingEast => bound.east = self.parse(value)?,
                    _ => bound.north = self.parse(value)?,
                }
            }
            TilingOrder => {
                let TilingScheme::Healpix { order } = &mut config.tiling else {
                    return Err(self.invalid(value, "only applies to the healpix scheme"));
                };
                *order = self.parse(value)?;
            }
            TileTesselation => config.tile.tesselation = self.parse(value)?,
            TileImageSize => config.tile.image_size = self.parse(value)?,
            SchedulerMaxRequests => config.scheduler.max_requests = self.parse(value)?,
            SchedulerMaxLevel => config.scheduler.max_level = self.parse(value)?,
            SchedulerRetryPolicy => {
                let parsed: RetryPolicy = value.parse().map_err(|r: String| self.invalid(value, r))?;
                config.scheduler.retry = match &config.scheduler.retry {
                    RetryPolicy::None => parsed,
                    old => parsed
                        .with_max_attempts(old.max_attempts())
                        .with_delay_frames(old.base_delay_frames()),
                };
            }
            SchedulerRetryAttempts => {
                let attempts: u32 = self.parse(value)?;
                config.scheduler.retry = config.scheduler.retry.clone().with_max_attempts(attempts);
            }
            SchedulerRetryDelayFrames => {
                let frames: u64 = self.parse(value)?;
                config.scheduler.retry = config.scheduler.retry.clone().with_delay_frames(frames);
            }
            SchedulerRenderWithoutContent => {
                config.scheduler.render_without_content = self.parse(value)?
            }
            VectorMaxTilePerGeometry => config.vector.max_tile_per_geometry = self.parse(value)?,
            LoggingFilter => config.logging.filter = value.to_string(),
            LoggingFile => {
                config.logging.file = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            LoggingAnsi => config.logging.ansi = self.parse(value)?,
        }
        Ok(())
    }

    fn parse<T>(&self, value: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        value
            .parse::<T>()
            .map_err(|e| self.invalid(value, e.to_string()))
    }

    fn invalid(&self, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_are_unique() {
        let mut names: Vec<String> = ConfigKey::all().iter().map(|k| k.name()).collect();
        let count = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), count);
    }

    #[test]
    fn test_parse_key() {
        assert_eq!("scheduler.max_requests".parse::<ConfigKey>().unwrap(), ConfigKey::SchedulerMaxRequests);
        assert!(matches!("nope.key".parse::<ConfigKey>(), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn test_get_set_roundtrip_for_every_key() {
        let config = GlobeConfig::default();
        let mut copy = GlobeConfig::default();
        for key in ConfigKey::all() {
            let value = key.get(&config);
            if !value.is_empty() {
                key.set(&mut copy, &value).unwrap();
            }
        }
        assert_eq!(copy, config);
    }

    #[test]
    fn test_set_scheme_switches_parameters() {
        let mut config = GlobeConfig::default();
        ConfigKey::TilingKind.set(&mut config, "healpix").unwrap();
        assert_eq!(config.tiling, TilingScheme::Healpix { order: DEFAULT_HEALPIX_ORDER });
        assert_eq!(ConfigKey::TilingNx.get(&config), "");
        ConfigKey::TilingOrder.set(&mut config, "5").unwrap();
        assert_eq!(ConfigKey::TilingOrder.get(&config), "5");
        assert!(ConfigKey::TilingNx.set(&mut config, "3").is_err());
    }

    #[test]
    fn test_set_invalid_number() {
        let mut config = GlobeConfig::default();
        let err = ConfigKey::SchedulerMaxRequests.set(&mut config, "many").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(err.to_string().contains("scheduler.max_requests"));
    }

    #[test]
    fn test_retry_keys() {
        let mut config = GlobeConfig::default();
        ConfigKey::SchedulerRetryPolicy.set(&mut config, "exponential").unwrap();
        ConfigKey::SchedulerRetryAttempts.set(&mut config, "6").unwrap();
        ConfigKey::SchedulerRetryDelayFrames.set(&mut config, "12").unwrap();
        assert_eq!(config.scheduler.retry.kind(), "exponential");
        assert_eq!(config.scheduler.retry.max_attempts(), 6);
        assert_eq!(config.scheduler.retry.base_delay_frames(), 12);
    }

    #[test]
    fn test_logging_file_can_be_cleared() {
        let mut config = GlobeConfig::default();
        ConfigKey::LoggingFile.set(&mut config, "/var/log/globe.log").unwrap();
        assert_eq!(ConfigKey::LoggingFile.get(&config), "/var/log/globe.log");
        ConfigKey::LoggingFile.set(&mut config, "").unwrap();
        assert_eq!(config.logging.file, None);
    }
}
