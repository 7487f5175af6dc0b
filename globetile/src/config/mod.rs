//! Configuration for the globe, its tiling, scheduler and vector layers.
//!
//! Every setting has a documented `DEFAULT_*` constant. [`GlobeConfig`]
//! bundles the per-component configs and can be persisted to an INI file
//! (see [`GlobeConfig::load`] and [`ConfigKey`]).
//!
//! # Example
//!
//! ```
//! use globetile::config::{GlobeConfig, SchedulerConfig};
//!
//! let config = GlobeConfig::default()
//!     .with_scheduler(SchedulerConfig::default().with_max_requests(8));
//! assert!(config.validate().is_ok());
//! ```

mod file;
mod keys;

use std::path::PathBuf;

use thiserror::Error;

use crate::crs::CrsKind;
use crate::scheduler::RetryPolicy;
use crate::tiling::{TilingError, TilingScheme};

pub use file::{config_directory, config_file_path, CONFIG_FILE_NAME};
pub use keys::ConfigKey;

// =============================================================================
// Defaults
// =============================================================================

/// Default number of vertices per tile side.
pub const DEFAULT_TESSELATION: usize = 9;

/// Default tile image size in pixels, used when no provider is set.
pub const DEFAULT_IMAGE_SIZE: u32 = 256;

/// Default number of concurrent tile requests.
pub const DEFAULT_MAX_REQUESTS: usize = 4;

/// Default refinement cap when no content provider limits the level count.
pub const DEFAULT_MAX_LEVEL: u32 = 18;

/// Default maximum number of level-zero tiles a geometry may be tiled into.
///
/// Larger geometries are drawn from one untiled renderable instead.
pub const DEFAULT_MAX_TILE_PER_GEOMETRY: usize = 100;

/// Default tracing filter.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Smallest usable tesselation (one quad per tile).
pub const MIN_TESSELATION: usize = 2;

// =============================================================================
// Errors
// =============================================================================

/// Configuration failures: reading, parsing or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(String),

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Tiling(#[from] TilingError),

    #[error("could not determine the user configuration directory")]
    NoConfigDirectory,
}

impl From<ini::Error> for ConfigError {
    fn from(err: ini::Error) -> Self {
        match err {
            ini::Error::Io(e) => ConfigError::Io(e),
            ini::Error::Parse(e) => ConfigError::Parse(e.to_string()),
        }
    }
}

// =============================================================================
// Component configs
// =============================================================================

/// Tile mesh generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TileConfig {
    /// Vertices per tile side.
    pub tesselation: usize,
    /// Whether meshes carry skirts to hide cracks between levels.
    pub skirt: bool,
    /// `1.0` when the surface is seen from outside, `-1.0` from inside.
    pub cull_sign: f64,
    /// Expected image size in pixels, drives refinement.
    pub image_size: u32,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            tesselation: DEFAULT_TESSELATION,
            skirt: true,
            cull_sign: 1.0,
            image_size: DEFAULT_IMAGE_SIZE,
        }
    }
}

impl TileConfig {
    pub fn with_tesselation(mut self, tesselation: usize) -> Self {
        self.tesselation = tesselation;
        self
    }

    pub fn with_image_size(mut self, size: u32) -> Self {
        self.image_size = size;
        self
    }
}

/// Request scheduling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Size of the request slot pool.
    pub max_requests: usize,
    /// Deepest level refined to when no provider caps it.
    pub max_level: u32,
    /// Retry behavior for failed tiles below level zero.
    pub retry: RetryPolicy,
    /// Whether tiles without content are still part of the render set.
    pub render_without_content: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            max_level: DEFAULT_MAX_LEVEL,
            retry: RetryPolicy::default(),
            render_without_content: true,
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_requests(mut self, max_requests: usize) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn with_max_level(mut self, max_level: u32) -> Self {
        self.max_level = max_level;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_render_without_content(mut self, render: bool) -> Self {
        self.render_without_content = render;
        self
    }
}

/// Vector layer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorConfig {
    /// Geometries overlapping more level-zero tiles than this are not tiled.
    /// `0` disables tiling entirely.
    pub max_tile_per_geometry: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            max_tile_per_geometry: DEFAULT_MAX_TILE_PER_GEOMETRY,
        }
    }
}

impl VectorConfig {
    pub fn with_max_tile_per_geometry(mut self, max: usize) -> Self {
        self.max_tile_per_geometry = max;
        self
    }
}

/// Logging settings consumed by [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// `tracing-subscriber` filter directive, e.g. `"info,globetile=debug"`.
    pub filter: String,
    /// Optional log file; logs go to stderr when unset.
    pub file: Option<PathBuf>,
    /// Colored output on stderr.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            file: None,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

// =============================================================================
// Globe config
// =============================================================================

/// Complete configuration of a globe.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GlobeConfig {
    pub crs: CrsKind,
    pub tiling: TilingScheme,
    pub tile: TileConfig,
    pub scheduler: SchedulerConfig,
    pub vector: VectorConfig,
    pub logging: LoggingConfig,
}

impl GlobeConfig {
    pub fn with_crs(mut self, crs: CrsKind) -> Self {
        self.crs = crs;
        self
    }

    pub fn with_tiling(mut self, tiling: TilingScheme) -> Self {
        self.tiling = tiling;
        self
    }

    pub fn with_tile(mut self, tile: TileConfig) -> Self {
        self.tile = tile;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_vector(mut self, vector: VectorConfig) -> Self {
        self.vector = vector;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Checks the preconditions a globe needs at construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tiling = self.tiling.build()?;
        if self.tile.tesselation < MIN_TESSELATION {
            return Err(ConfigError::Invalid(format!(
                "tesselation must be at least {}, got {}",
                MIN_TESSELATION, self.tile.tesselation
            )));
        }
        if self.tile.image_size == 0 {
            return Err(ConfigError::Invalid("image size must be positive".into()));
        }
        if self.scheduler.max_requests == 0 {
            return Err(ConfigError::Invalid(
                "at least one request slot is required".into(),
            ));
        }
        if self.scheduler.max_level > tiling.max_level() {
            return Err(ConfigError::Invalid(format!(
                "max level {} exceeds the deepest level {} of the {} tiling",
                self.scheduler.max_level,
                tiling.max_level(),
                self.tiling.kind()
            )));
        }
        if self.scheduler.retry.max_attempts() == 0 {
            return Err(ConfigError::Invalid(
                "retry policy must allow at least one attempt".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoBound;

    #[test]
    fn test_defaults() {
        let config = GlobeConfig::default();
        assert_eq!(config.crs, CrsKind::Wgs84);
        assert_eq!(config.tile.tesselation, DEFAULT_TESSELATION);
        assert_eq!(config.scheduler.max_requests, DEFAULT_MAX_REQUESTS);
        assert_eq!(config.vector.max_tile_per_geometry, DEFAULT_MAX_TILE_PER_GEOMETRY);
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = GlobeConfig::default()
            .with_crs(CrsKind::Equatorial)
            .with_tiling(TilingScheme::Healpix { order: 2 })
            .with_tile(TileConfig::default().with_tesselation(5).with_image_size(512))
            .with_scheduler(
                SchedulerConfig::default()
                    .with_max_requests(2)
                    .with_max_level(10)
                    .with_retry(RetryPolicy::None)
                    .with_render_without_content(false),
            )
            .with_vector(VectorConfig::default().with_max_tile_per_geometry(0))
            .with_logging(LoggingConfig::default().with_filter("debug").with_file("/tmp/g.log"));

        assert_eq!(config.tile.image_size, 512);
        assert_eq!(config.scheduler.max_level, 10);
        assert!(!config.scheduler.render_without_content);
        assert_eq!(config.vector.max_tile_per_geometry, 0);
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/g.log")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_requests() {
        let config = GlobeConfig::default()
            .with_scheduler(SchedulerConfig::default().with_max_requests(0));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_small_tesselation() {
        let config = GlobeConfig::default().with_tile(TileConfig::default().with_tesselation(1));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_bad_tiling() {
        let config = GlobeConfig::default().with_tiling(TilingScheme::Geo {
            nx: 4,
            ny: 2,
            bound: GeoBound::new(0.0, 0.0, 0.0, 10.0),
        });
        assert!(matches!(config.validate(), Err(ConfigError::Tiling(_))));
    }

    #[test]
    fn test_validate_bounds_max_level_by_tiling() {
        let at_cap = GlobeConfig::default()
            .with_scheduler(SchedulerConfig::default().with_max_level(crate::tiling::MAX_LEVEL));
        assert!(at_cap.validate().is_ok());

        let too_deep = GlobeConfig::default()
            .with_scheduler(SchedulerConfig::default().with_max_level(40));
        assert!(matches!(too_deep.validate(), Err(ConfigError::Invalid(_))));

        let wide = GlobeConfig::default()
            .with_tiling(TilingScheme::Geo {
                nx: 1024,
                ny: 1,
                bound: GeoBound::WORLD,
            })
            .with_scheduler(SchedulerConfig::default().with_max_level(23));
        assert!(matches!(wide.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_attempt_retry() {
        let config = GlobeConfig::default()
            .with_scheduler(SchedulerConfig::default().with_retry(RetryPolicy::fixed(0, 1)));
        assert!(config.validate().is_err());
    }
}
