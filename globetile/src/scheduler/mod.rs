//! Per-frame tile scheduling.
//!
//! [`TileManager`] owns the tile tree of one globe. Each call to
//! [`TileManager::frame`]:
//!
//! 1. requests level-zero tiles until they are all loaded,
//! 2. traverses the tree from level zero, culling, refining and collecting
//!    the render set,
//! 3. generates content for fetches completed since the last frame,
//!    discarding those whose tile was not visited in this frame,
//! 4. hands new requests to the [`RequestPool`], closest first.
//!
//! All tree mutation happens inside `frame` (or the explicit reset and
//! provider calls); fetch tasks only ever talk to the pool's channel.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use globetile::config::{SchedulerConfig, TileConfig};
//! use globetile::crs::{CoordinateSystem, SphericalCrs, EARTH_RADIUS_METERS};
//! use globetile::scheduler::{OrbitView, TileManager};
//! use globetile::tiling::TilingScheme;
//!
//! let crs: Arc<dyn CoordinateSystem> = Arc::new(SphericalCrs::wgs84());
//! let tiling = TilingScheme::default().build().unwrap();
//! let mut manager = TileManager::new(
//!     crs.clone(),
//!     tiling,
//!     TileConfig::default(),
//!     SchedulerConfig::default(),
//! );
//!
//! let view = OrbitView::globe(crs.as_ref(), 0.0, 0.0, 3.0 * EARTH_RADIUS_METERS);
//! let first = manager.frame(&view);
//! assert_eq!(first.stats.requested, 8);
//!
//! // Without a provider, tiles complete with empty content; four slots
//! // load the eight level-zero tiles in two rounds.
//! for _ in 0..3 {
//!     manager.frame(&view);
//! }
//! assert!(manager.is_base_ready());
//! ```

mod events;
mod policy;
mod request;
mod view;

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::config::{SchedulerConfig, TileConfig};
use crate::crs::CoordinateSystem;
use crate::provider::{ContentProvider, FetchError, TileContent};
use crate::tile::{Tile, TileId, TileMesh, TileState, TileTree};
use crate::tiling::{SpatialIndex, TileAddress, Tiling, TilingError};
use crate::vector::AttachTarget;

pub use events::{FrameReport, FrameStats, RenderEntry, TileEvent};
pub use policy::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_MAX_DELAY_FRAMES, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_RETRY_DELAY_FRAMES,
};
pub use request::RequestPool;
pub use view::{OrbitView, RenderView, Surface, DEFAULT_FOV_DEGREES, DEFAULT_VIEWPORT};

#[cfg(test)]
pub(crate) use view::LevelView;

/// Tile tree plus the scheduling state driving it.
#[derive(Debug)]
pub struct TileManager {
    crs: Arc<dyn CoordinateSystem>,
    tiling: Tiling,
    base_tile_config: TileConfig,
    tile_config: TileConfig,
    config: SchedulerConfig,
    provider: Option<Arc<dyn ContentProvider>>,
    tree: TileTree,
    level_zero: Vec<TileId>,
    pool: RequestPool,
    frame_number: u64,
    frozen: bool,
    base_ready: bool,
    base_error_reported: bool,
    destroyed: bool,
    pending: Vec<TileId>,
    render_set: Vec<RenderEntry>,
    visible: Vec<TileId>,
    queued_events: Vec<TileEvent>,
}

impl TileManager {
    /// Creates a manager and its level-zero tiles, all in `NONE`.
    ///
    /// `tile_config` is adjusted by the tiling (skirts, winding,
    /// tesselation) before use.
    pub fn new(
        crs: Arc<dyn CoordinateSystem>,
        tiling: Tiling,
        tile_config: TileConfig,
        config: SchedulerConfig,
    ) -> Self {
        let pool = RequestPool::new(config.max_requests);
        let mut manager = Self {
            crs,
            tiling,
            tile_config: tile_config.clone(),
            base_tile_config: tile_config,
            config,
            provider: None,
            tree: TileTree::new(),
            level_zero: Vec::new(),
            pool,
            frame_number: 0,
            frozen: false,
            base_ready: false,
            base_error_reported: false,
            destroyed: false,
            pending: Vec::new(),
            render_set: Vec::new(),
            visible: Vec::new(),
            queued_events: Vec::new(),
        };
        manager.configure_tiles();
        manager.rebuild_level_zero();
        manager
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn tree(&self) -> &TileTree {
        &self.tree
    }

    /// Level-zero tile ids; the position is the spatial index's level-zero
    /// index.
    pub fn level_zero(&self) -> &[TileId] {
        &self.level_zero
    }

    pub fn tiling(&self) -> &Tiling {
        &self.tiling
    }

    pub fn crs(&self) -> &Arc<dyn CoordinateSystem> {
        &self.crs
    }

    /// Tile settings after the tiling's overrides.
    pub fn tile_config(&self) -> &TileConfig {
        &self.tile_config
    }

    pub fn scheduler_config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn provider(&self) -> Option<&Arc<dyn ContentProvider>> {
        self.provider.as_ref()
    }

    /// Number of the next frame.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Leaves to draw, from the last traversal.
    pub fn render_set(&self) -> &[RenderEntry] {
        &self.render_set
    }

    /// Leaves reached by the last traversal, loaded or not.
    pub fn visible_tiles(&self) -> &[TileId] {
        &self.visible
    }

    /// Busy request slots.
    pub fn in_flight(&self) -> usize {
        self.pool.busy()
    }

    pub fn request_capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn is_base_ready(&self) -> bool {
        self.base_ready
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Stops traversal; completions are still drained and pending requests
    /// still launched.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Tree, level zero and tiling borrowed together for geometry
    /// attachment.
    pub fn attach_target(&mut self) -> AttachTarget<'_> {
        AttachTarget {
            tree: &mut self.tree,
            level_zero: &self.level_zero,
            tiling: &self.tiling,
        }
    }

    // -------------------------------------------------------------------------
    // Frame
    // -------------------------------------------------------------------------

    /// Runs one frame against a view.
    pub fn frame(&mut self, view: &dyn RenderView) -> FrameReport {
        let mut report = FrameReport::new(self.frame_number);
        report.events.append(&mut self.queued_events);

        if self.destroyed {
            report.skipped = true;
            return report;
        }
        if let Some(provider) = &self.provider {
            if !provider.is_ready() {
                trace!(provider = provider.name(), "Provider not ready, skipping frame");
                report.skipped = true;
                return report;
            }
        }

        let was_busy = !self.pool.is_idle();

        if !self.base_ready {
            self.generate_level_zero_directly(&mut report);
        }
        if !self.frozen {
            self.traverse(view, &mut report);
        }
        self.generate_received_tiles(&mut report);
        self.launch_requests(view, &mut report);

        let busy = !self.pool.is_idle();
        if self.provider.is_some() {
            if !was_busy && busy {
                report.events.push(TileEvent::BackgroundLoadStart);
            } else if was_busy && !busy {
                report.events.push(TileEvent::BackgroundLoadEnd);
            }
        }

        report.stats.in_flight = self.pool.busy();
        report.stats.rendered = self.render_set.len();
        trace!(
            frame = self.frame_number,
            traversed = report.stats.traversed,
            requested = report.stats.requested,
            launched = report.stats.launched,
            generated = report.stats.generated,
            stale = report.stats.stale,
            in_flight = report.stats.in_flight,
            "Frame done"
        );

        self.frame_number += 1;
        report
    }

    fn generate_level_zero_directly(&mut self, report: &mut FrameReport) {
        let Some(provider) = self.provider.clone() else {
            return;
        };
        let addresses: Vec<TileAddress> = self
            .level_zero
            .iter()
            .filter_map(|id| self.tree.get(*id).map(Tile::address))
            .collect();
        let Some(contents) = provider.level_zero_content(&addresses) else {
            return;
        };
        if contents.len() != self.level_zero.len() {
            warn!(
                provider = provider.name(),
                expected = self.level_zero.len(),
                got = contents.len(),
                "Ignoring level-zero content of wrong length"
            );
            return;
        }

        for (id, content) in self.level_zero.clone().into_iter().zip(contents) {
            let Some(tile) = self.tree.get_mut(id) else {
                continue;
            };
            if tile.is_loaded() {
                continue;
            }
            if tile.state() == TileState::Requested {
                self.pool.abort_tile(id);
            } else {
                tile.request();
            }
            self.generate_tile(id, content, report);
        }

        self.base_ready = true;
        info!(provider = provider.name(), "Base layers ready");
        report.events.push(TileEvent::BaseLayersReady);
    }

    fn traverse(&mut self, view: &dyn RenderView, report: &mut FrameReport) {
        self.render_set.clear();
        self.visible.clear();

        if !self.base_ready && !self.traverse_level_zero(report) {
            return;
        }

        for id in self.level_zero.clone() {
            let culled = match self.tree.get(id) {
                Some(tile) => view.is_culled(tile),
                None => continue,
            };
            if culled {
                self.cull(id, report);
            } else {
                self.process_tile(id, view, report);
            }
        }
    }

    /// Requests missing level-zero tiles. Returns `true` once all are loaded.
    fn traverse_level_zero(&mut self, report: &mut FrameReport) -> bool {
        let frame = self.frame_number;
        let mut all_loaded = true;
        let mut failed = Vec::new();

        for &id in &self.level_zero {
            let Some(tile) = self.tree.get_mut(id) else {
                continue;
            };
            tile.frame_number = frame;
            report.stats.traversed += 1;
            match tile.state() {
                TileState::None => {
                    tile.request();
                    self.pending.push(id);
                    report.stats.requested += 1;
                    all_loaded = false;
                }
                TileState::Error => {
                    failed.push(tile.address());
                    all_loaded = false;
                }
                TileState::Requested => all_loaded = false,
                TileState::Loaded => {}
            }
        }

        if !failed.is_empty() && !self.base_error_reported {
            self.base_error_reported = true;
            if let Some(provider) = &self.provider {
                warn!(
                    provider = provider.name(),
                    failed = failed.len(),
                    "Base layers failed to load"
                );
                report.events.push(TileEvent::BaseLayersError {
                    provider: provider.name().to_string(),
                    failed,
                });
            }
        }

        if all_loaded {
            self.base_ready = true;
            info!(tiles = self.level_zero.len(), "Base layers ready");
            report.events.push(TileEvent::BaseLayersReady);
        }
        all_loaded
    }

    fn process_tile(&mut self, id: TileId, view: &dyn RenderView, report: &mut FrameReport) {
        let frame = self.frame_number;
        let Some(tile) = self.tree.get_mut(id) else {
            return;
        };
        tile.frame_number = frame;
        let state = tile.state();
        let level = tile.level();
        let retry_due = state == TileState::Error && tile.parent().is_some() && tile.retry_at <= frame;
        report.stats.traversed += 1;

        if state == TileState::None || retry_due {
            if let Some(tile) = self.tree.get_mut(id) {
                tile.request();
            }
            self.pending.push(id);
            report.stats.requested += 1;
        }

        let mut is_leaf = true;
        if state == TileState::Loaded {
            is_leaf = level >= self.deepest_level();
            if !is_leaf {
                is_leaf = self
                    .tree
                    .get(id)
                    .map_or(true, |tile| !view.needs_refinement(tile, self.tile_config.image_size));
            }
        }

        if is_leaf {
            self.add_to_render_set(id);
            self.visible.push(id);
            return;
        }

        for child in self.ensure_children(id) {
            let culled = self.tree.get(child).map_or(true, |tile| view.is_culled(tile));
            if culled {
                self.cull(child, report);
            } else {
                self.process_tile(child, view, report);
            }
        }
    }

    /// Deepest level that may be refined into, never past what the tiling
    /// can address.
    fn deepest_level(&self) -> u32 {
        self.provider
            .as_ref()
            .map_or(self.config.max_level, |p| p.number_of_levels().saturating_sub(1))
            .min(self.tiling.max_level())
    }

    fn add_to_render_set(&mut self, id: TileId) {
        let Some(tile) = self.tree.get(id) else {
            return;
        };
        if !tile.is_loaded() && !self.config.render_without_content {
            return;
        }
        if let Some(source) = self.tree.loaded_ancestor_or_self(id) {
            self.render_set.push(RenderEntry { tile: id, source });
        }
    }

    fn ensure_children(&mut self, id: TileId) -> [TileId; 4] {
        let Some(tile) = self.tree.get(id) else {
            return [id; 4];
        };
        if let Some(children) = tile.children() {
            return children;
        }
        let address = tile.address();

        let mut children = [id; 4];
        for (slot, child) in children.iter_mut().enumerate() {
            let child_address = address.child(slot);
            let footprint = self.tiling.footprint(&child_address, self.crs.as_ref());
            *child = self
                .tree
                .insert(Tile::new(child_address, footprint, Some((id, slot))));
        }
        if let Some(tile) = self.tree.get_mut(id) {
            tile.children = Some(children);
        }
        children
    }

    /// Drops a culled tile's descendants and its own pending request.
    fn cull(&mut self, id: TileId, report: &mut FrameReport) {
        report.stats.culled += 1;
        self.dispose_children(id, report);
        if let Some(tile) = self.tree.get_mut(id) {
            if tile.state() == TileState::Requested {
                if self.pool.abort_tile(id) {
                    report.stats.aborted += 1;
                } else {
                    self.pending.retain(|p| *p != id);
                }
                tile.cancel_request();
            }
        }
    }

    fn dispose_children(&mut self, id: TileId, report: &mut FrameReport) {
        let removed = self.tree.remove_children(id);
        if removed.is_empty() {
            return;
        }
        for (removed_id, tile) in &removed {
            if tile.state() == TileState::Requested && self.pool.abort_tile(*removed_id) {
                report.stats.aborted += 1;
            }
        }
        report.stats.disposed += removed.len();
        let tree = &self.tree;
        self.pending.retain(|p| tree.contains(*p));
    }

    fn generate_received_tiles(&mut self, report: &mut FrameReport) {
        let frame = self.frame_number;
        while let Some((id, result)) = self.pool.try_complete() {
            let Some(tile) = self.tree.get_mut(id) else {
                report.stats.stale += 1;
                continue;
            };
            if tile.state() != TileState::Requested {
                report.stats.stale += 1;
                continue;
            }
            if tile.frame_number != frame {
                debug!(tile = %tile.address(), "Discarding content of a tile no longer needed");
                tile.cancel_request();
                report.stats.stale += 1;
                continue;
            }
            match result {
                Ok(content) => self.generate_tile(id, content, report),
                Err(error) => self.fail_tile(id, error, report),
            }
        }
    }

    fn generate_tile(&mut self, id: TileId, content: TileContent, report: &mut FrameReport) {
        let Some(tile) = self.tree.get(id) else {
            return;
        };
        let mesh = TileMesh::build(
            &self.tiling,
            &tile.address(),
            self.crs.as_ref(),
            &self.tile_config,
            tile.footprint().center,
            tile.footprint().radius,
            content.elevations.as_deref(),
        );
        let Some(tile) = self.tree.get_mut(id) else {
            return;
        };
        if tile.generate(mesh, content.image) {
            debug!(tile = %tile.address(), "Generated tile");
            report.generated.push(id);
            report.stats.generated += 1;
        }
    }

    fn fail_tile(&mut self, id: TileId, error: FetchError, report: &mut FrameReport) {
        let frame = self.frame_number;
        let policy = &self.config.retry;
        let Some(tile) = self.tree.get_mut(id) else {
            return;
        };
        if !tile.fail() {
            return;
        }
        report.stats.failed += 1;
        if tile.parent().is_some() {
            tile.retry_at = policy
                .delay_for_attempt(tile.attempts())
                .map_or(u64::MAX, |delay| frame.saturating_add(delay));
        }
        debug!(
            tile = %tile.address(),
            attempts = tile.attempts(),
            error = %error,
            "Tile fetch failed"
        );
    }

    fn launch_requests(&mut self, view: &dyn RenderView, report: &mut FrameReport) {
        let pending = std::mem::take(&mut self.pending);
        let mut ordered: Vec<(f64, TileId)> = pending
            .into_iter()
            .filter_map(|id| self.tree.get(id).map(|tile| (view.distance(tile), id)))
            .collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

        for (_, id) in ordered {
            let Some(tile) = self.tree.get_mut(id) else {
                continue;
            };
            if tile.state() != TileState::Requested {
                continue;
            }
            if self
                .pool
                .launch(id, tile.address(), self.provider.as_ref())
                .is_some()
            {
                report.stats.launched += 1;
            } else {
                tile.cancel_request();
                report.stats.deferred += 1;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Aborts every request and disposes every tile; level-zero tiles are
    /// kept in `NONE`.
    pub fn reset(&mut self) {
        let was_busy = !self.pool.is_idle();
        let aborted = self.pool.abort_all();
        for id in self.level_zero.clone() {
            self.tree.remove_children(id);
            if let Some(tile) = self.tree.get_mut(id) {
                tile.dispose();
            }
        }
        self.pending.clear();
        self.render_set.clear();
        self.visible.clear();
        self.base_ready = false;
        self.base_error_reported = false;
        if was_busy && self.provider.is_some() {
            self.queued_events.push(TileEvent::BackgroundLoadEnd);
        }
        info!(aborted, "Tile manager reset");
    }

    /// Replaces the content provider.
    ///
    /// Resets the tree, switches to the provider's tiling when it declares a
    /// different one, and regenerates level zero.
    ///
    /// # Returns
    ///
    /// `true` when the tiling changed.
    ///
    /// # Errors
    ///
    /// Returns the tiling error, leaving the manager untouched, when the
    /// provider declares an invalid tiling.
    pub fn set_provider(
        &mut self,
        provider: Option<Arc<dyn ContentProvider>>,
    ) -> Result<bool, TilingError> {
        let new_tiling = match provider.as_ref().and_then(|p| p.tiling_scheme()) {
            Some(scheme) if scheme != self.tiling.scheme() => Some(scheme.build()?),
            _ => None,
        };

        self.reset();
        self.provider = provider;
        let changed = new_tiling.is_some();
        if let Some(tiling) = new_tiling {
            self.tiling = tiling;
        }
        self.configure_tiles();
        self.rebuild_level_zero();

        info!(
            provider = self.provider.as_ref().map_or("none", |p| p.name()),
            tiling = self.tiling.scheme().kind(),
            level_zero = self.level_zero.len(),
            "Content provider changed"
        );
        Ok(changed)
    }

    /// Replaces the tiling and regenerates level zero.
    pub fn set_tiling(&mut self, tiling: Tiling) {
        self.reset();
        self.tiling = tiling;
        self.configure_tiles();
        self.rebuild_level_zero();
        info!(tiling = self.tiling.scheme().kind(), "Tiling changed");
    }

    /// Disposes everything. The manager does nothing afterwards.
    pub fn destroy(&mut self) {
        self.pool.close();
        self.tree.clear();
        self.level_zero.clear();
        self.pending.clear();
        self.render_set.clear();
        self.visible.clear();
        self.queued_events.clear();
        self.destroyed = true;
        info!("Tile manager destroyed");
    }

    fn configure_tiles(&mut self) {
        let mut config = self.base_tile_config.clone();
        if let Some(provider) = &self.provider {
            config.image_size = provider.tile_pixel_size();
        }
        self.tiling.configure(&mut config, self.crs.as_ref());
        self.tile_config = config;
    }

    fn rebuild_level_zero(&mut self) {
        self.tree.clear();
        let mut level_zero = Vec::new();
        for address in self.tiling.level_zero() {
            let footprint = self.tiling.footprint(&address, self.crs.as_ref());
            level_zero.push(self.tree.insert(Tile::new(address, footprint, None)));
        }
        self.level_zero = level_zero;
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Breadth-first visit of every tile from level zero down.
    pub fn visit_tiles<F>(&self, visitor: F)
    where
        F: FnMut(TileId, &Tile),
    {
        self.tree.visit(&self.level_zero, visitor);
    }

    /// Visible leaf containing a point.
    pub fn visible_tile_at(&self, lon: f64, lat: f64) -> Option<TileId> {
        self.visible.iter().copied().find(|id| {
            self.tree
                .get(*id)
                .is_some_and(|tile| self.tiling.contains(&tile.address(), lon, lat))
        })
    }

    /// Height in meters from the deepest loaded tile containing a point.
    ///
    /// `None` when the level-zero tile under the point is not loaded.
    pub fn elevation_at(&self, lon: f64, lat: f64) -> Option<f64> {
        let mut id = *self.level_zero.get(self.tiling.locate(lon, lat))?;
        if !self.tree.get(id)?.is_loaded() {
            return None;
        }
        loop {
            let tile = self.tree.get(id)?;
            let Some(children) = tile.children() else {
                break;
            };
            let child = children[self.tiling.child_slot(&tile.address(), lon, lat)];
            match self.tree.get(child) {
                Some(c) if c.is_loaded() => id = child,
                _ => break,
            }
        }

        let tile = self.tree.get(id)?;
        let mesh = tile.mesh()?;
        let height = match tile.address() {
            TileAddress::Quad { .. } => {
                let bound = tile.bound();
                mesh.height_at_uv(
                    (lon - bound.west) / bound.width(),
                    (bound.north - lat) / bound.height(),
                )
            }
            TileAddress::Nested { .. } => mesh.nearest_height(lon, lat),
        };
        Some(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::SphericalCrs;
    use crate::provider::SimulatedProvider;
    use crate::tiling::TilingScheme;

    fn manager(max_requests: usize) -> TileManager {
        TileManager::new(
            Arc::new(SphericalCrs::wgs84()),
            TilingScheme::default().build().unwrap(),
            TileConfig::default().with_tesselation(3),
            SchedulerConfig::default().with_max_requests(max_requests),
        )
    }

    fn run_until_base_ready(manager: &mut TileManager, view: &dyn RenderView) {
        for _ in 0..10 {
            manager.frame(view);
            if manager.is_base_ready() {
                return;
            }
        }
        panic!("base layers never became ready");
    }

    #[test]
    fn test_new_manager_has_level_zero() {
        let manager = manager(4);
        assert_eq!(manager.level_zero().len(), 8);
        assert_eq!(manager.tree().len(), 8);
        assert!(manager
            .level_zero()
            .iter()
            .all(|id| manager.tree().get(*id).unwrap().state() == TileState::None));
        assert!(manager.tile_config().skirt);
    }

    #[test]
    fn test_first_frame_requests_level_zero_within_capacity() {
        let mut manager = manager(4);
        let report = manager.frame(&LevelView::new(0));
        assert_eq!(report.stats.requested, 8);
        assert_eq!(report.stats.launched, 4);
        assert_eq!(report.stats.deferred, 4);
        assert_eq!(manager.in_flight(), 4);

        let states: Vec<TileState> = manager
            .level_zero()
            .iter()
            .map(|id| manager.tree().get(*id).unwrap().state())
            .collect();
        assert_eq!(states.iter().filter(|s| **s == TileState::Requested).count(), 4);
        assert_eq!(states.iter().filter(|s| **s == TileState::None).count(), 4);
    }

    #[test]
    fn test_closest_tiles_launch_first() {
        let mut manager = manager(2);
        manager.frame(&LevelView::new(0));
        let in_flight: Vec<TileAddress> = manager
            .level_zero()
            .iter()
            .filter(|id| manager.tree().get(**id).unwrap().state() == TileState::Requested)
            .map(|id| manager.tree().get(*id).unwrap().address())
            .collect();
        // Centers at (+-45, +-45) are the closest to the origin.
        for address in in_flight {
            let TileAddress::Quad { x, .. } = address else {
                panic!("quad expected");
            };
            assert!(x == 1 || x == 2);
        }
    }

    #[test]
    fn test_base_layers_ready_once_without_provider() {
        let mut manager = manager(8);
        let view = LevelView::new(0);
        let mut ready_events = 0;
        for _ in 0..5 {
            let report = manager.frame(&view);
            ready_events += report
                .events
                .iter()
                .filter(|e| **e == TileEvent::BaseLayersReady)
                .count();
        }
        assert!(manager.is_base_ready());
        assert_eq!(ready_events, 1);
        assert_eq!(manager.render_set().len(), 8);
    }

    #[test]
    fn test_refinement_creates_children_and_renders_from_parent() {
        let mut manager = manager(8);
        let view = LevelView::new(1);
        // The frame that completes level zero already refines it.
        run_until_base_ready(&mut manager, &view);
        assert_eq!(manager.tree().len(), 8 + 32);

        // Children are not loaded yet: each renders from its parent.
        assert_eq!(manager.render_set().len(), 32);
        assert!(manager.render_set().iter().all(RenderEntry::is_borrowed));

        // Eight slots load the 32 children in four rounds.
        for _ in 0..5 {
            let report = manager.frame(&view);
            assert!(report.stats.launched <= 8);
        }
        assert_eq!(manager.render_set().len(), 32);
        assert!(manager.render_set().iter().all(|e| !e.is_borrowed()));
    }

    #[test]
    fn test_max_level_caps_refinement_without_provider() {
        let mut manager = TileManager::new(
            Arc::new(SphericalCrs::wgs84()),
            TilingScheme::default().build().unwrap(),
            TileConfig::default().with_tesselation(3),
            SchedulerConfig::default().with_max_requests(64).with_max_level(1),
        );
        let view = LevelView::new(10);
        for _ in 0..10 {
            manager.frame(&view);
        }
        let mut deepest = 0;
        manager.visit_tiles(|_, tile| deepest = deepest.max(tile.level()));
        assert_eq!(deepest, 1);
    }

    /// Keeps only the tiles containing a point and always asks for more detail.
    struct ZoomView {
        lon: f64,
        lat: f64,
    }

    impl RenderView for ZoomView {
        fn is_culled(&self, tile: &Tile) -> bool {
            !tile.bound().contains(self.lon, self.lat)
        }

        fn needs_refinement(&self, _tile: &Tile, _tile_pixel_size: u32) -> bool {
            true
        }

        fn distance(&self, tile: &Tile) -> f64 {
            let (lon, lat) = tile.bound().center();
            (lon - self.lon).abs() + (lat - self.lat).abs()
        }
    }

    #[test]
    fn test_refinement_stops_at_addressable_depth() {
        let mut manager = TileManager::new(
            Arc::new(SphericalCrs::wgs84()),
            TilingScheme::default().build().unwrap(),
            TileConfig::default().with_tesselation(3),
            SchedulerConfig::default().with_max_requests(8).with_max_level(40),
        );
        let view = ZoomView { lon: 10.3, lat: 10.7 };
        for _ in 0..120 {
            manager.frame(&view);
        }
        let mut deepest = 0;
        manager.visit_tiles(|_, tile| deepest = deepest.max(tile.level()));
        assert_eq!(deepest, crate::tiling::MAX_LEVEL);
    }

    #[test]
    fn test_provider_levels_are_capped_by_tiling() {
        let mut manager = manager(8);
        manager
            .set_provider(Some(Arc::new(SimulatedProvider::new(64))))
            .unwrap();
        assert_eq!(manager.deepest_level(), crate::tiling::MAX_LEVEL);
    }

    #[test]
    fn test_culled_tile_children_are_disposed() {
        let mut manager = manager(64);
        let mut view = LevelView::new(1);
        run_until_base_ready(&mut manager, &view);
        manager.frame(&view);
        assert_eq!(manager.tree().len(), 40);

        let first = manager.tree().get(manager.level_zero()[0]).unwrap().address();
        view.culled.push(first);
        let report = manager.frame(&view);
        assert_eq!(report.stats.disposed, 4);
        assert_eq!(manager.tree().len(), 36);
        assert!(manager.tree().get(manager.level_zero()[0]).unwrap().children().is_none());
    }

    #[test]
    fn test_stale_completion_resets_tile() {
        let mut manager = manager(8);
        let view = LevelView::new(0);
        // Frame 0 requests and launches every level-zero tile; the empty
        // content is already waiting in the channel.
        manager.frame(&view);
        let first = manager.level_zero()[0];

        // Frame 1 does not visit anything: all completions are stale.
        manager.set_frozen(true);
        let report = manager.frame(&view);
        assert_eq!(report.stats.stale, 8);
        assert_eq!(report.stats.generated, 0);
        assert_eq!(manager.tree().get(first).unwrap().state(), TileState::None);

        manager.set_frozen(false);
        manager.frame(&view);
        manager.frame(&view);
        assert_eq!(manager.tree().get(first).unwrap().state(), TileState::Loaded);
    }

    #[test]
    fn test_visible_tile_at_and_elevation() {
        let mut manager = manager(8);
        let view = LevelView::new(0);
        run_until_base_ready(&mut manager, &view);
        manager.frame(&view);

        let id = manager.visible_tile_at(10.0, 10.0).unwrap();
        let tile = manager.tree().get(id).unwrap();
        assert!(tile.bound().contains(10.0, 10.0));
        assert_eq!(manager.elevation_at(10.0, 10.0), Some(0.0));
    }

    #[test]
    fn test_reset_disposes_everything_but_level_zero() {
        let mut manager = manager(64);
        let view = LevelView::new(1);
        run_until_base_ready(&mut manager, &view);
        manager.frame(&view);
        manager.reset();
        assert_eq!(manager.tree().len(), 8);
        assert!(!manager.is_base_ready());
        assert_eq!(manager.in_flight(), 0);
        assert!(manager.render_set().is_empty());
    }

    #[test]
    fn test_set_provider_switches_tiling() {
        let mut manager = manager(4);
        let provider = SimulatedProvider::new(5).with_tiling(TilingScheme::Healpix { order: 0 });
        let changed = manager.set_provider(Some(Arc::new(provider))).unwrap();
        assert!(changed);
        assert!(manager.tiling().is_healpix());
        assert_eq!(manager.level_zero().len(), 12);
        assert!(!manager.tile_config().skirt);
        assert_eq!(manager.tile_config().tesselation, crate::tiling::healpix::HEALPIX_TESSELATION);
    }

    #[test]
    fn test_set_provider_rejects_invalid_tiling() {
        let mut manager = manager(4);
        let provider = SimulatedProvider::new(5).with_tiling(TilingScheme::Healpix { order: 40 });
        assert!(manager.set_provider(Some(Arc::new(provider))).is_err());
        assert!(!manager.tiling().is_healpix());
        assert!(manager.provider().is_none());
    }

    #[test]
    fn test_provider_not_ready_skips_frame() {
        let mut manager = manager(4);
        let provider = SimulatedProvider::new(5);
        provider.set_ready(false);
        manager.set_provider(Some(Arc::new(provider.clone()))).unwrap();
        let report = manager.frame(&LevelView::new(0));
        assert!(report.skipped);
        assert_eq!(manager.frame_number(), 0);
        provider.set_ready(true);
        assert!(!manager.frame(&LevelView::new(0)).skipped);
    }

    #[test]
    fn test_level_zero_shortcut() {
        let mut manager = manager(4);
        let provider = SimulatedProvider::new(5).with_level_zero_shortcut();
        manager.set_provider(Some(Arc::new(provider.clone()))).unwrap();
        let report = manager.frame(&LevelView::new(0));
        assert!(report.has_event(&TileEvent::BaseLayersReady));
        assert_eq!(report.generated.len(), 8);
        assert_eq!(provider.fetch_count(), 0);
    }

    #[test]
    fn test_destroy() {
        let mut manager = manager(4);
        manager.frame(&LevelView::new(0));
        manager.destroy();
        assert!(manager.is_destroyed());
        assert!(manager.tree().is_empty());
        assert!(manager.frame(&LevelView::new(0)).skipped);
    }
}
