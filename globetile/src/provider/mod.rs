//! Tile content providers.
//!
//! A provider turns a [`TileAddress`] into [`TileContent`] asynchronously.
//! The scheduler only sees the [`ContentProvider`] trait; implementations
//! decide where content comes from.
//!
//! # Implementations
//!
//! - [`SimulatedProvider`]: in-process content with configurable latency and
//!   failures, for tests and the CLI
//! - [`HttpTileProvider`]: XYZ URL template over HTTP

mod http;
mod simulated;

use std::fmt;

use bytes::Bytes;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::tiling::{TileAddress, TilingScheme};

pub use http::{HttpTileProvider, DEFAULT_HTTP_TIMEOUT_SECS};
pub use simulated::SimulatedProvider;

/// Default tile image size in pixels.
pub const DEFAULT_TILE_PIXEL_SIZE: u32 = 256;

/// Content of one tile as delivered by a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileContent {
    /// Encoded image bytes; the scheduler does not decode them.
    pub image: Option<Bytes>,
    /// Heights in meters, `tesselation x tesselation`, row-major from the
    /// north-west corner.
    pub elevations: Option<Vec<f32>>,
}

impl TileContent {
    /// Content with no image and a flat surface.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_image(image: impl Into<Bytes>) -> Self {
        Self {
            image: Some(image.into()),
            elevations: None,
        }
    }

    pub fn with_elevations(mut self, elevations: Vec<f32>) -> Self {
        self.elevations = Some(elevations);
        self
    }
}

/// Opaque shader reference a provider may require for its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDescriptor {
    pub vertex: String,
    pub fragment: String,
}

/// Provider failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("provider cannot serve tile {0}")]
    Unsupported(TileAddress),

    #[error("tile {0} failed: {1}")]
    Failed(TileAddress, String),

    #[error("request cancelled")]
    Cancelled,

    #[error("no async runtime available to run the fetch")]
    NoRuntime,
}

/// Source of tile content.
pub trait ContentProvider: Send + Sync + fmt::Debug {
    /// Name used in logs and error events.
    fn name(&self) -> &str;

    /// Image size in pixels; drives the refinement threshold.
    fn tile_pixel_size(&self) -> u32 {
        DEFAULT_TILE_PIXEL_SIZE
    }

    /// Number of levels with content. Tiles at level `number_of_levels - 1`
    /// are never refined.
    fn number_of_levels(&self) -> u32;

    /// Tiling the content is cut in, when it differs from the globe default.
    fn tiling_scheme(&self) -> Option<TilingScheme> {
        None
    }

    fn custom_shader(&self) -> Option<ShaderDescriptor> {
        None
    }

    /// `false` while the provider is still initializing; the scheduler
    /// skips frames until it is ready.
    fn is_ready(&self) -> bool {
        true
    }

    /// Level-zero content produced in one go, in level-zero order.
    ///
    /// Providers that return `Some` never see fetches for level zero.
    fn level_zero_content(&self, _addresses: &[TileAddress]) -> Option<Vec<TileContent>> {
        None
    }

    /// Fetches the content of one tile.
    fn fetch(&self, address: TileAddress) -> BoxFuture<'static, Result<TileContent, FetchError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_content_builders() {
        let content = TileContent::with_image(vec![1u8, 2, 3]).with_elevations(vec![0.0; 4]);
        assert_eq!(content.image.as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(content.elevations.as_ref().map(Vec::len), Some(4));
        assert_eq!(TileContent::empty(), TileContent::default());
    }

    #[test]
    fn test_fetch_error_messages() {
        let address = TileAddress::Quad { level: 2, x: 1, y: 3 };
        assert_eq!(
            FetchError::Unsupported(address).to_string(),
            "provider cannot serve tile 2/1/3"
        );
        assert_eq!(
            FetchError::Status {
                status: 404,
                url: "http://t/2/1/3.png".into()
            }
            .to_string(),
            "HTTP 404 from http://t/2/1/3.png"
        );
    }
}
