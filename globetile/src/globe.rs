//! A globe: tile manager, vector layers and their wiring.
//!
//! [`Globe`] is the entry point for embedding applications. It validates the
//! configuration, owns the [`TileManager`] and the [`VectorRenderer`], and
//! forwards newly generated tiles to the vector layer after every frame.
//!
//! # Example
//!
//! ```
//! use globetile::config::GlobeConfig;
//! use globetile::crs::EARTH_RADIUS_METERS;
//! use globetile::geo::Geometry;
//! use globetile::scheduler::OrbitView;
//! use globetile::vector::{Layer, Style};
//! use globetile::Globe;
//!
//! let mut globe = Globe::new(GlobeConfig::default()).unwrap();
//! let layer = globe.add_layer(Layer::new("cities"));
//! let paris = globe
//!     .add_geometry(layer, Geometry::Point(vec![2.35, 48.85]), Style::default())
//!     .unwrap();
//!
//! let view = OrbitView::globe(globe.crs().as_ref(), 2.35, 48.85, 2.0 * EARTH_RADIUS_METERS);
//! for _ in 0..10 {
//!     globe.frame(&view);
//! }
//! assert!(globe.tiles().is_base_ready());
//! assert!(globe.remove_geometry(paris));
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::GlobeConfig;
use crate::crs::CoordinateSystem;
use crate::error::GlobeError;
use crate::geo::{GeoBound, Geometry};
use crate::provider::ContentProvider;
use crate::scheduler::{FrameReport, RenderView, TileManager};
use crate::tile::TileId;
use crate::tiling::{SpatialIndex, TilingScheme};
use crate::vector::{GeometryId, Layer, LayerId, RenderItem, Style, VectorRenderer};

/// Tiles plus the vector layers attached to them.
#[derive(Debug)]
pub struct Globe {
    config: GlobeConfig,
    manager: TileManager,
    vector: VectorRenderer,
}

impl Globe {
    /// Builds a globe.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or a nested-pixel tiling over a flat
    /// coordinate system.
    pub fn new(config: GlobeConfig) -> Result<Self, GlobeError> {
        config.validate()?;
        let crs = config.crs.build();
        ensure_compatible(&config.tiling, crs.as_ref())?;
        let tiling = config.tiling.build()?;

        let manager = TileManager::new(
            crs,
            tiling,
            config.tile.clone(),
            config.scheduler.clone(),
        );
        let vector = VectorRenderer::new(config.vector.clone());
        info!(
            crs = %config.crs,
            tiling = config.tiling.kind(),
            level_zero = manager.level_zero().len(),
            max_requests = config.scheduler.max_requests,
            "Globe created"
        );

        Ok(Self {
            config,
            manager,
            vector,
        })
    }

    pub fn config(&self) -> &GlobeConfig {
        &self.config
    }

    pub fn crs(&self) -> &Arc<dyn CoordinateSystem> {
        self.manager.crs()
    }

    /// The tile manager, for queries and statistics.
    pub fn tiles(&self) -> &TileManager {
        &self.manager
    }

    pub fn vector(&self) -> &VectorRenderer {
        &self.vector
    }

    pub fn is_destroyed(&self) -> bool {
        self.manager.is_destroyed()
    }

    // -------------------------------------------------------------------------
    // Tiles
    // -------------------------------------------------------------------------

    /// Replaces the content provider.
    ///
    /// Geometries are re-routed when the provider brings its own tiling.
    ///
    /// # Returns
    ///
    /// `true` when the tiling changed.
    pub fn set_provider(
        &mut self,
        provider: Option<Arc<dyn ContentProvider>>,
    ) -> Result<bool, GlobeError> {
        if self.is_destroyed() {
            return Err(GlobeError::Destroyed);
        }
        if let Some(scheme) = provider.as_ref().and_then(|p| p.tiling_scheme()) {
            ensure_compatible(&scheme, self.manager.crs().as_ref())?;
        }
        let changed = self.manager.set_provider(provider)?;
        if changed {
            self.vector.reindex(&mut self.manager.attach_target());
        }
        Ok(changed)
    }

    /// Runs one frame and attaches geometries to the tiles it generated.
    pub fn frame(&mut self, view: &dyn RenderView) -> FrameReport {
        let report = self.manager.frame(view);
        if !report.generated.is_empty() {
            let mut target = self.manager.attach_target();
            for id in &report.generated {
                self.vector.on_tile_generated(&mut target, *id);
            }
        }
        report
    }

    /// Stops or resumes traversal.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.manager.set_frozen(frozen);
    }

    /// Drops every tile back to level zero in `NONE`.
    pub fn reset(&mut self) {
        self.manager.reset();
    }

    /// Releases all tiles, requests and geometries.
    pub fn destroy(&mut self) {
        self.manager.destroy();
        self.vector = VectorRenderer::new(self.config.vector.clone());
        info!("Globe destroyed");
    }

    /// Level-zero index of the tile containing a point.
    pub fn locate(&self, lon: f64, lat: f64) -> usize {
        self.manager.tiling().locate(lon, lat)
    }

    /// Level-zero indices a bounding box may overlap.
    pub fn overlapped(&self, bbox: &GeoBound) -> Vec<usize> {
        self.manager.tiling().overlapped(bbox)
    }

    pub fn visible_tile_at(&self, lon: f64, lat: f64) -> Option<TileId> {
        self.manager.visible_tile_at(lon, lat)
    }

    pub fn elevation_at(&self, lon: f64, lat: f64) -> Option<f64> {
        self.manager.elevation_at(lon, lat)
    }

    // -------------------------------------------------------------------------
    // Vector layers
    // -------------------------------------------------------------------------

    pub fn add_layer(&mut self, layer: Layer) -> LayerId {
        self.vector.add_layer(layer)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.vector.layer_mut(id)
    }

    /// Adds a geometry; `None` when it is malformed or the layer unknown.
    pub fn add_geometry(
        &mut self,
        layer: LayerId,
        geometry: Geometry,
        style: Style,
    ) -> Option<GeometryId> {
        self.vector
            .add_geometry(&mut self.manager.attach_target(), layer, geometry, style)
    }

    pub fn remove_geometry(&mut self, id: GeometryId) -> bool {
        self.vector
            .remove_geometry(&mut self.manager.attach_target(), id)
    }

    pub fn remove_layer(&mut self, layer: LayerId) -> usize {
        self.vector
            .remove_layer(&mut self.manager.attach_target(), layer)
    }

    /// Vector items to draw for the current render set.
    pub fn render_items(&self) -> Vec<RenderItem> {
        self.vector
            .render_items(self.manager.tree(), self.manager.render_set())
    }
}

fn ensure_compatible(scheme: &TilingScheme, crs: &dyn CoordinateSystem) -> Result<(), GlobeError> {
    if matches!(scheme, TilingScheme::Healpix { .. }) && crs.is_flat() {
        return Err(GlobeError::IncompatibleTiling {
            tiling: scheme.kind(),
            crs: crs.name().to_string(),
        });
    }
    Ok(())
}
