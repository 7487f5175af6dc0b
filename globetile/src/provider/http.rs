//! XYZ tile server provider.
//!
//! URLs are built from a template with `{z}`, `{x}` and `{y}` placeholders,
//! e.g. `https://tiles.example.org/{z}/{x}/{y}.png`. Only quadtree tiles are
//! served; `{z}` is the quadtree level.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use crate::tiling::{TileAddress, TilingScheme};

use super::{ContentProvider, FetchError, TileContent, DEFAULT_TILE_PIXEL_SIZE};

/// Default request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Provider fetching images from an XYZ tile server.
#[derive(Debug, Clone)]
pub struct HttpTileProvider {
    name: String,
    template: String,
    number_of_levels: u32,
    tile_pixel_size: u32,
    tiling: Option<TilingScheme>,
    client: reqwest::Client,
}

impl HttpTileProvider {
    /// Creates a provider for a URL template.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the template lacks a placeholder or
    /// the HTTP client cannot be built.
    pub fn new(template: impl Into<String>, number_of_levels: u32) -> Result<Self, FetchError> {
        Self::with_timeout(template, number_of_levels, DEFAULT_HTTP_TIMEOUT_SECS)
    }

    /// Creates a provider with a custom request timeout.
    pub fn with_timeout(
        template: impl Into<String>,
        number_of_levels: u32,
        timeout_secs: u64,
    ) -> Result<Self, FetchError> {
        let template = template.into();
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !template.contains(placeholder) {
                return Err(FetchError::Http(format!(
                    "URL template '{}' is missing {}",
                    template, placeholder
                )));
            }
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: template.clone(),
            template,
            number_of_levels,
            tile_pixel_size: DEFAULT_TILE_PIXEL_SIZE,
            tiling: None,
            client,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tile_pixel_size(mut self, size: u32) -> Self {
        self.tile_pixel_size = size;
        self
    }

    /// Declares the level-zero layout of the server's tiles.
    pub fn with_tiling(mut self, tiling: TilingScheme) -> Self {
        self.tiling = Some(tiling);
        self
    }

    /// URL of a tile, `None` for tiles this provider cannot address.
    pub fn url(&self, address: &TileAddress) -> Option<String> {
        match *address {
            TileAddress::Quad { level, x, y } => Some(
                self.template
                    .replace("{z}", &level.to_string())
                    .replace("{x}", &x.to_string())
                    .replace("{y}", &y.to_string()),
            ),
            TileAddress::Nested { .. } => None,
        }
    }
}

impl ContentProvider for HttpTileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile_pixel_size(&self) -> u32 {
        self.tile_pixel_size
    }

    fn number_of_levels(&self) -> u32 {
        self.number_of_levels
    }

    fn tiling_scheme(&self) -> Option<TilingScheme> {
        self.tiling.clone()
    }

    fn fetch(&self, address: TileAddress) -> BoxFuture<'static, Result<TileContent, FetchError>> {
        let Some(url) = self.url(&address) else {
            return futures::future::ready(Err(FetchError::Unsupported(address))).boxed();
        };
        let client = self.client.clone();

        async move {
            debug!(tile = %address, url = %url, "Fetching tile");
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Http(format!("Request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(FetchError::Status {
                    status: response.status().as_u16(),
                    url,
                });
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| FetchError::Http(format!("Failed to read response: {}", e)))?;
            Ok(TileContent {
                image: Some(bytes),
                elevations: None,
            })
        }
        .boxed()
    }
}
