//! Attachment of vector geometries to tiles.
//!
//! Each geometry added to a layer is routed one of two ways:
//!
//! - **tiled**: the spatial index gives the level-zero tiles its bounding box
//!   overlaps. The geometry is attached to every loaded tile it intersects,
//!   from those level-zero tiles down through loaded children, and is picked
//!   up by tiles generated later.
//! - **main**: when tiling is disabled or the geometry overlaps more than
//!   `max_tile_per_geometry` level-zero tiles, it goes to its bucket's single
//!   untiled renderable.
//!
//! Removal walks the same tiles, pruned by the geometry's bounding box, and is
//! the exact inverse of addition: empty renderables and empty buckets are
//! dropped.

mod bucket;
mod layer;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::{debug, info, warn};

use crate::config::VectorConfig;
use crate::geo::{GeoBound, Geometry};
use crate::scheduler::RenderEntry;
use crate::tile::{TileId, TileTree};
use crate::tiling::{SpatialIndex, Tiling};

pub use bucket::{Bucket, BucketId, MainRenderable, TileRenderables, TiledRenderable};
pub use layer::{Layer, LayerId, Style, DEFAULT_OPACITY};

/// Identifier of a geometry added to a [`VectorRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub(crate) u64);

impl fmt::Display for GeometryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "geometry#{}", self.0)
    }
}

/// Tiles geometries attach to, borrowed from a
/// [`crate::scheduler::TileManager`].
#[derive(Debug)]
pub struct AttachTarget<'a> {
    pub tree: &'a mut TileTree,
    /// Level-zero tiles in spatial-index order.
    pub level_zero: &'a [TileId],
    pub tiling: &'a Tiling,
}

/// Something to draw this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderItem {
    /// A bucket's renderable on `source`, drawn over the region of `tile`.
    Tiled {
        tile: TileId,
        source: TileId,
        bucket: BucketId,
        geometries: usize,
    },
    /// A bucket's untiled renderable.
    Main { bucket: BucketId, geometries: usize },
}

#[derive(Debug, Clone)]
struct GeometryEntry {
    geometry: Geometry,
    bbox: GeoBound,
    layer: LayerId,
    bucket: BucketId,
    /// Overlapped level-zero indices, `None` when in the main renderable.
    tile_indices: Option<Vec<usize>>,
}

/// Layers, buckets and the routing of their geometries.
#[derive(Debug, Default)]
pub struct VectorRenderer {
    config: VectorConfig,
    layers: BTreeMap<LayerId, Layer>,
    buckets: Vec<Bucket>,
    geometries: BTreeMap<GeometryId, GeometryEntry>,
    tile_index: HashMap<usize, Vec<GeometryId>>,
    next_layer: u32,
    next_bucket: u32,
    next_geometry: u64,
}

impl VectorRenderer {
    pub fn new(config: VectorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &VectorConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Layers
    // -------------------------------------------------------------------------

    pub fn add_layer(&mut self, layer: Layer) -> LayerId {
        let id = LayerId(self.next_layer);
        self.next_layer += 1;
        debug!(layer = %id, name = layer.name(), "Added layer");
        self.layers.insert(id, layer);
        id
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    /// Mutable access for visibility and opacity changes.
    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.get_mut(&id)
    }

    pub fn layers(&self) -> impl Iterator<Item = (LayerId, &Layer)> {
        self.layers.iter().map(|(id, layer)| (*id, layer))
    }

    /// Removes every geometry of a layer, then the layer.
    ///
    /// Returns the number of geometries removed.
    pub fn remove_layer(&mut self, target: &mut AttachTarget<'_>, layer: LayerId) -> usize {
        let ids: Vec<GeometryId> = self
            .geometries
            .iter()
            .filter(|(_, entry)| entry.layer == layer)
            .map(|(id, _)| *id)
            .collect();
        let removed = ids
            .into_iter()
            .filter(|id| self.remove_geometry(target, *id))
            .count();
        if self.layers.remove(&layer).is_some() {
            info!(layer = %layer, geometries = removed, "Removed layer");
        }
        removed
    }

    // -------------------------------------------------------------------------
    // Buckets and geometries
    // -------------------------------------------------------------------------

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket(&self, id: BucketId) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.id() == id)
    }

    fn bucket_mut(&mut self, id: BucketId) -> Option<&mut Bucket> {
        self.buckets.iter_mut().find(|b| b.id() == id)
    }

    fn find_or_create_bucket(&mut self, layer: LayerId, style: Style) -> BucketId {
        if let Some(bucket) = self.buckets.iter().find(|b| b.is_compatible(layer, &style)) {
            return bucket.id();
        }
        let id = BucketId(self.next_bucket);
        self.next_bucket += 1;
        self.buckets.push(Bucket::new(id, layer, style));
        id
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(&id).map(|e| &e.geometry)
    }

    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    pub fn bucket_of(&self, id: GeometryId) -> Option<BucketId> {
        self.geometries.get(&id).map(|e| e.bucket)
    }

    /// Level-zero indices a tiled geometry is bound to; `None` for unknown
    /// geometries and those in a main renderable.
    pub fn tile_indices(&self, id: GeometryId) -> Option<&[usize]> {
        self.geometries.get(&id)?.tile_indices.as_deref()
    }

    /// Tiled geometries bound to a level-zero index.
    pub fn geometries_at(&self, level_zero_index: usize) -> &[GeometryId] {
        self.tile_index
            .get(&level_zero_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Adds a geometry to a layer with a style.
    ///
    /// Malformed geometries and unknown layers are rejected with a warning
    /// before any tile is touched.
    pub fn add_geometry(
        &mut self,
        target: &mut AttachTarget<'_>,
        layer: LayerId,
        geometry: Geometry,
        style: Style,
    ) -> Option<GeometryId> {
        if !self.layers.contains_key(&layer) {
            warn!(layer = %layer, "Ignoring geometry for an unknown layer");
            return None;
        }
        let bbox = match geometry.bbox() {
            Ok(bbox) => bbox,
            Err(error) => {
                warn!(
                    layer = %layer,
                    kind = geometry.type_name(),
                    error = %error,
                    "Ignoring malformed geometry"
                );
                return None;
            }
        };

        let bucket = self.find_or_create_bucket(layer, style);
        if let Some(b) = self.bucket_mut(bucket) {
            b.register();
        }
        let id = GeometryId(self.next_geometry);
        self.next_geometry += 1;
        self.geometries.insert(
            id,
            GeometryEntry {
                geometry,
                bbox,
                layer,
                bucket,
                tile_indices: None,
            },
        );

        let route = self.route(target.tiling, &bbox);
        let tiles = route.as_ref().map(Vec::len);
        self.place(target, id, route);
        debug!(geometry = %id, layer = %layer, tiles = ?tiles, "Added geometry");
        Some(id)
    }

    /// Removes a geometry from every tile and renderable holding it.
    pub fn remove_geometry(&mut self, target: &mut AttachTarget<'_>, id: GeometryId) -> bool {
        let Some(entry) = self.geometries.remove(&id) else {
            return false;
        };

        match &entry.tile_indices {
            Some(indices) => {
                for &index in indices {
                    self.unindex(index, id);
                    if let Some(&root) = target.level_zero.get(index) {
                        detach_recursive(target.tree, root, entry.bucket, id, &entry.bbox);
                    }
                }
            }
            None => {
                if let Some(bucket) = self.bucket_mut(entry.bucket) {
                    bucket.remove_from_main(id);
                }
            }
        }

        if let Some(bucket) = self.bucket_mut(entry.bucket) {
            bucket.unregister();
        }
        self.buckets.retain(|b| b.geometry_count() > 0);
        debug!(geometry = %id, layer = %entry.layer, "Removed geometry");
        true
    }

    /// Attaches pending geometries to a freshly generated tile.
    ///
    /// Level-zero tiles take the geometries indexed at their position; deeper
    /// tiles take those of their parent. Returns how many were attached.
    pub fn on_tile_generated(&self, target: &mut AttachTarget<'_>, tile_id: TileId) -> usize {
        let Some(tile) = target.tree.get(tile_id) else {
            return 0;
        };
        if !tile.is_loaded() {
            return 0;
        }
        let level = tile.level();
        let bound = *tile.bound();

        let candidates: Vec<GeometryId> = match tile.parent() {
            None => match target.level_zero.iter().position(|id| *id == tile_id) {
                Some(index) => self.geometries_at(index).to_vec(),
                None => return 0,
            },
            Some(parent) => target
                .tree
                .get(parent)
                .map(|p| p.extension().geometries().map(|(_, g)| g).collect())
                .unwrap_or_default(),
        };

        let Some(tile) = target.tree.get_mut(tile_id) else {
            return 0;
        };
        let mut attached = 0;
        for id in candidates {
            let Some(entry) = self.geometries.get(&id) else {
                continue;
            };
            if !entry.geometry.intersects_bound(&bound) {
                continue;
            }
            let builds = self.layers.get(&entry.layer).is_some_and(|l| l.builds_at(level));
            if tile.extension.attach(entry.bucket, id, builds) {
                attached += 1;
            }
        }
        attached
    }

    /// Re-routes every geometry after the tiling changed.
    pub fn reindex(&mut self, target: &mut AttachTarget<'_>) {
        for (_, tile) in target.tree.iter_mut() {
            tile.extension.clear();
        }
        self.tile_index.clear();
        for bucket in &mut self.buckets {
            bucket.clear_main();
        }

        let ids: Vec<GeometryId> = self.geometries.keys().copied().collect();
        for id in &ids {
            let Some(bbox) = self.geometries.get(id).map(|e| e.bbox) else {
                continue;
            };
            let route = self.route(target.tiling, &bbox);
            self.place(target, *id, route);
        }
        info!(geometries = ids.len(), "Re-indexed geometries");
    }

    /// Items to draw for a render set.
    ///
    /// Per-tile renderables come from each entry's source tile; hidden or
    /// fully transparent layers are skipped.
    pub fn render_items(&self, tree: &TileTree, render_set: &[RenderEntry]) -> Vec<RenderItem> {
        let mut items = Vec::new();
        for entry in render_set {
            let Some(source) = tree.get(entry.source) else {
                continue;
            };
            for renderable in source.extension().iter() {
                if !renderable.builds_primitives() || !self.is_bucket_drawn(renderable.bucket()) {
                    continue;
                }
                items.push(RenderItem::Tiled {
                    tile: entry.tile,
                    source: entry.source,
                    bucket: renderable.bucket(),
                    geometries: renderable.geometries().len(),
                });
            }
        }
        for bucket in &self.buckets {
            if let Some(main) = bucket.main() {
                if self.is_layer_drawn(bucket.layer()) {
                    items.push(RenderItem::Main {
                        bucket: bucket.id(),
                        geometries: main.geometries().len(),
                    });
                }
            }
        }
        items
    }

    fn is_layer_drawn(&self, layer: LayerId) -> bool {
        self.layers.get(&layer).is_some_and(Layer::is_drawn)
    }

    fn is_bucket_drawn(&self, bucket: BucketId) -> bool {
        self.bucket(bucket).is_some_and(|b| self.is_layer_drawn(b.layer()))
    }

    /// Level-zero indices for a bounding box, `None` for the main renderable.
    fn route(&self, tiling: &Tiling, bbox: &GeoBound) -> Option<Vec<usize>> {
        let max = self.config.max_tile_per_geometry;
        if max == 0 {
            return None;
        }
        let indices = tiling.overlapped(bbox);
        (indices.len() <= max).then_some(indices)
    }

    fn place(&mut self, target: &mut AttachTarget<'_>, id: GeometryId, route: Option<Vec<usize>>) {
        let Some(entry) = self.geometries.get_mut(&id) else {
            return;
        };
        let bucket = entry.bucket;
        entry.tile_indices = route.clone();

        match route {
            Some(indices) => {
                for &index in &indices {
                    self.tile_index.entry(index).or_default().push(id);
                }
                for &index in &indices {
                    if let Some(&root) = target.level_zero.get(index) {
                        self.attach_recursive(target.tree, root, id);
                    }
                }
            }
            None => {
                if let Some(b) = self.bucket_mut(bucket) {
                    b.add_to_main(id);
                }
            }
        }
    }

    fn unindex(&mut self, index: usize, id: GeometryId) {
        if let Some(list) = self.tile_index.get_mut(&index) {
            list.retain(|g| *g != id);
            if list.is_empty() {
                self.tile_index.remove(&index);
            }
        }
    }

    /// Attaches a geometry to `root` and its loaded descendants it
    /// intersects.
    fn attach_recursive(&self, tree: &mut TileTree, root: TileId, id: GeometryId) {
        let Some(entry) = self.geometries.get(&id) else {
            return;
        };
        let layer = self.layers.get(&entry.layer);
        let mut stack = vec![root];
        while let Some(tile_id) = stack.pop() {
            let Some(tile) = tree.get_mut(tile_id) else {
                continue;
            };
            if !tile.is_loaded() || !entry.geometry.intersects_bound(tile.bound()) {
                continue;
            }
            let builds = layer.is_some_and(|l| l.builds_at(tile.level()));
            tile.extension.attach(entry.bucket, id, builds);
            if let Some(children) = tile.children() {
                stack.extend(children);
            }
        }
    }
}

/// Detaches a geometry from `root` and every descendant whose bound meets
/// the geometry's bounding box.
fn detach_recursive(
    tree: &mut TileTree,
    root: TileId,
    bucket: BucketId,
    id: GeometryId,
    bbox: &GeoBound,
) {
    let mut stack = vec![root];
    while let Some(tile_id) = stack.pop() {
        let Some(tile) = tree.get_mut(tile_id) else {
            continue;
        };
        if !tile.bound().intersects_inclusive(bbox) {
            continue;
        }
        tile.extension.detach(bucket, id);
        if let Some(children) = tile.children() {
            stack.extend(children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::{SchedulerConfig, TileConfig};
    use crate::crs::SphericalCrs;
    use crate::scheduler::{LevelView, TileManager};
    use crate::tiling::TilingScheme;

    fn manager() -> TileManager {
        TileManager::new(
            Arc::new(SphericalCrs::wgs84()),
            TilingScheme::default().build().unwrap(),
            TileConfig::default().with_tesselation(3),
            SchedulerConfig::default().with_max_requests(64),
        )
    }

    /// Runs frames until level zero and its children are loaded, attaching
    /// geometries to every generated tile.
    fn load(manager: &mut TileManager, renderer: &VectorRenderer, refine_to: u32) {
        let view = LevelView::new(refine_to);
        for _ in 0..8 {
            let report = manager.frame(&view);
            for id in report.generated {
                renderer.on_tile_generated(&mut manager.attach_target(), id);
            }
        }
    }

    fn square(west: f64, south: f64, east: f64, north: f64) -> Geometry {
        Geometry::Polygon(vec![vec![
            vec![west, south],
            vec![east, south],
            vec![east, north],
            vec![west, north],
            vec![west, south],
        ]])
    }

    fn holders(manager: &TileManager, id: GeometryId) -> usize {
        let mut count = 0;
        manager.visit_tiles(|_, tile| {
            if tile.extension().contains(id) {
                count += 1;
            }
        });
        count
    }

    fn snapshot(manager: &TileManager) -> Vec<(TileId, TileRenderables)> {
        manager
            .tree()
            .iter()
            .map(|(id, tile)| (id, tile.extension().clone()))
            .collect()
    }

    #[test]
    fn test_geometry_attaches_to_loaded_tiles() {
        let mut manager = manager();
        let mut renderer = VectorRenderer::new(VectorConfig::default());
        load(&mut manager, &renderer, 1);
        let layer = renderer.add_layer(Layer::new("areas"));

        let id = renderer
            .add_geometry(&mut manager.attach_target(), layer, square(10.0, 10.0, 20.0, 20.0), Style::default())
            .unwrap();

        assert_eq!(renderer.tile_indices(id), Some(&[2][..]));
        assert_eq!(renderer.geometries_at(2), &[id]);
        // Level-zero tile 0..90 x 0..90 and its south-west child.
        assert_eq!(holders(&manager, id), 2);
    }

    #[test]
    fn test_tiles_generated_later_pick_geometries_up() {
        let mut manager = manager();
        let mut renderer = VectorRenderer::new(VectorConfig::default());
        let layer = renderer.add_layer(Layer::new("areas"));
        let id = renderer
            .add_geometry(&mut manager.attach_target(), layer, square(10.0, 10.0, 20.0, 20.0), Style::default())
            .unwrap();
        assert_eq!(holders(&manager, id), 0);

        load(&mut manager, &renderer, 1);
        assert_eq!(holders(&manager, id), 2);
    }

    #[test]
    fn test_add_then_remove_restores_tiles_and_buckets() {
        let mut manager = manager();
        let mut renderer = VectorRenderer::new(VectorConfig::default());
        load(&mut manager, &renderer, 1);
        let layer = renderer.add_layer(Layer::new("mixed"));
        let kept = renderer
            .add_geometry(&mut manager.attach_target(), layer, square(-100.0, 10.0, -95.0, 15.0), Style::default())
            .unwrap();
        let before = snapshot(&manager);
        let buckets_before = renderer.buckets().to_vec();

        let red = Style::default().with_stroke([1.0, 0.0, 0.0, 1.0], 2.0);
        let ids: Vec<GeometryId> = [
            square(-10.0, -10.0, 10.0, 10.0),
            Geometry::LineString(vec![vec![170.0, 5.0], vec![-170.0, 6.0]]),
            Geometry::Point(vec![0.0, 0.0]),
            square(-100.0, 10.0, -95.0, 15.0),
        ]
        .into_iter()
        .map(|g| {
            renderer
                .add_geometry(&mut manager.attach_target(), layer, g, red.clone())
                .unwrap()
        })
        .collect();
        assert_ne!(snapshot(&manager), before);

        for id in ids.iter().rev() {
            assert!(renderer.remove_geometry(&mut manager.attach_target(), *id));
        }
        assert_eq!(snapshot(&manager), before);
        assert_eq!(renderer.buckets(), &buckets_before[..]);
        assert!(renderer.geometry(kept).is_some());
        assert!(!renderer.remove_geometry(&mut manager.attach_target(), ids[0]));
    }

    #[test]
    fn test_large_geometry_goes_to_main_renderable() {
        let mut manager = manager();
        let mut renderer =
            VectorRenderer::new(VectorConfig::default().with_max_tile_per_geometry(2));
        load(&mut manager, &renderer, 1);
        let layer = renderer.add_layer(Layer::new("world"));

        let id = renderer
            .add_geometry(&mut manager.attach_target(), layer, square(-170.0, -80.0, 170.0, 80.0), Style::default())
            .unwrap();
        assert_eq!(renderer.tile_indices(id), None);
        assert_eq!(holders(&manager, id), 0);
        let bucket = renderer.bucket(renderer.bucket_of(id).unwrap()).unwrap();
        assert_eq!(bucket.main().unwrap().geometries(), &[id]);

        renderer.remove_geometry(&mut manager.attach_target(), id);
        assert!(renderer.buckets().is_empty());
    }

    #[test]
    fn test_zero_max_disables_tiling() {
        let mut manager = manager();
        let mut renderer =
            VectorRenderer::new(VectorConfig::default().with_max_tile_per_geometry(0));
        let layer = renderer.add_layer(Layer::new("points"));
        let id = renderer
            .add_geometry(&mut manager.attach_target(), layer, Geometry::Point(vec![1.0, 1.0]), Style::default())
            .unwrap();
        assert_eq!(renderer.tile_indices(id), None);
    }

    #[test]
    fn test_malformed_geometry_is_a_noop() {
        let mut manager = manager();
        let mut renderer = VectorRenderer::new(VectorConfig::default());
        let layer = renderer.add_layer(Layer::new("bad"));
        let result = renderer.add_geometry(
            &mut manager.attach_target(),
            layer,
            Geometry::LineString(vec![]),
            Style::default(),
        );
        assert!(result.is_none());
        assert!(renderer.buckets().is_empty());
        assert_eq!(renderer.geometry_count(), 0);
    }

    #[test]
    fn test_unknown_layer_is_rejected() {
        let mut manager = manager();
        let mut renderer = VectorRenderer::new(VectorConfig::default());
        let result = renderer.add_geometry(
            &mut manager.attach_target(),
            LayerId(9),
            Geometry::Point(vec![1.0, 1.0]),
            Style::default(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_same_style_shares_bucket() {
        let mut manager = manager();
        let mut renderer = VectorRenderer::new(VectorConfig::default());
        let layer = renderer.add_layer(Layer::new("a"));
        let other = renderer.add_layer(Layer::new("b"));
        let mut target = manager.attach_target();
        let a = renderer.add_geometry(&mut target, layer, Geometry::Point(vec![1.0, 1.0]), Style::default());
        let b = renderer.add_geometry(&mut target, layer, Geometry::Point(vec![2.0, 1.0]), Style::default());
        let c = renderer.add_geometry(&mut target, other, Geometry::Point(vec![2.0, 1.0]), Style::default());
        assert_eq!(renderer.bucket_of(a.unwrap()), renderer.bucket_of(b.unwrap()));
        assert_ne!(renderer.bucket_of(a.unwrap()), renderer.bucket_of(c.unwrap()));
        assert_eq!(renderer.buckets().len(), 2);
    }

    #[test]
    fn test_level_range_limits_primitives() {
        let mut manager = manager();
        let mut renderer = VectorRenderer::new(VectorConfig::default());
        load(&mut manager, &renderer, 1);
        let layer = renderer.add_layer(Layer::new("detail").with_level_range(1, None));
        let id = renderer
            .add_geometry(&mut manager.attach_target(), layer, square(10.0, 10.0, 20.0, 20.0), Style::default())
            .unwrap();
        let bucket = renderer.bucket_of(id).unwrap();

        // Still attached at level zero so children inherit it.
        assert_eq!(holders(&manager, id), 2);
        manager.frame(&LevelView::new(1));
        let items = renderer.render_items(manager.tree(), manager.render_set());
        assert_eq!(items.len(), 1);
        let RenderItem::Tiled { source, .. } = items[0] else {
            panic!("tiled item expected");
        };
        assert_eq!(manager.tree().get(source).unwrap().level(), 1);
        assert!(manager
            .tree()
            .get(source)
            .unwrap()
            .extension()
            .get(bucket)
            .unwrap()
            .builds_primitives());
    }

    #[test]
    fn test_render_items_skip_hidden_layers() {
        let mut manager = manager();
        let mut renderer =
            VectorRenderer::new(VectorConfig::default().with_max_tile_per_geometry(1));
        load(&mut manager, &renderer, 0);
        let tiled = renderer.add_layer(Layer::new("tiled"));
        let world = renderer.add_layer(Layer::new("world"));
        let mut target = manager.attach_target();
        renderer.add_geometry(&mut target, tiled, square(10.0, 10.0, 20.0, 20.0), Style::default());
        renderer.add_geometry(&mut target, world, square(-170.0, -80.0, 170.0, 80.0), Style::default());

        manager.frame(&LevelView::new(0));
        let items = renderer.render_items(manager.tree(), manager.render_set());
        assert_eq!(items.len(), 2);
        assert!(items.iter().any(|i| matches!(i, RenderItem::Main { geometries: 1, .. })));

        renderer.layer_mut(world).unwrap().set_opacity(0.0);
        renderer.layer_mut(tiled).unwrap().set_visible(false);
        assert!(renderer.render_items(manager.tree(), manager.render_set()).is_empty());
    }

    #[test]
    fn test_remove_layer() {
        let mut manager = manager();
        let mut renderer = VectorRenderer::new(VectorConfig::default());
        load(&mut manager, &renderer, 0);
        let layer = renderer.add_layer(Layer::new("gone"));
        let mut target = manager.attach_target();
        for lon in [-120.0, -30.0, 60.0] {
            renderer.add_geometry(&mut target, layer, Geometry::Point(vec![lon, 30.0]), Style::default());
        }
        assert_eq!(renderer.remove_layer(&mut target, layer), 3);
        assert!(renderer.layer(layer).is_none());
        assert!(renderer.buckets().is_empty());
        let mut attached = 0;
        manager.visit_tiles(|_, tile| attached += tile.extension().len());
        assert_eq!(attached, 0);
    }

    #[test]
    fn test_reindex_after_tiling_change() {
        let mut manager = manager();
        let mut renderer = VectorRenderer::new(VectorConfig::default());
        let layer = renderer.add_layer(Layer::new("areas"));
        let id = renderer
            .add_geometry(&mut manager.attach_target(), layer, square(10.0, 10.0, 20.0, 20.0), Style::default())
            .unwrap();
        assert_eq!(renderer.tile_indices(id), Some(&[2][..]));

        manager.set_tiling(TilingScheme::Healpix { order: 0 }.build().unwrap());
        renderer.reindex(&mut manager.attach_target());
        let indices = renderer.tile_indices(id).unwrap();
        assert!(!indices.is_empty());
        assert!(indices.iter().all(|i| *i < 12));
        let located = manager.tiling().locate(15.0, 15.0);
        assert!(indices.contains(&located));
    }
}
