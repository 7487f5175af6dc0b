//! Errors surfaced by [`crate::Globe`].

use thiserror::Error;

use crate::config::ConfigError;
use crate::tiling::TilingError;

/// Construction and precondition failures of a globe.
///
/// Per-tile fetch failures never show up here: they are absorbed by the
/// tile lifecycle and reported through [`crate::scheduler::TileEvent`].
#[derive(Debug, Error)]
pub enum GlobeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tiling(#[from] TilingError),

    #[error("tiling '{tiling}' needs a spherical coordinate system, got '{crs}'")]
    IncompatibleTiling { tiling: &'static str, crs: String },

    #[error("globe has been destroyed")]
    Destroyed,
}
