//! Buckets and the renderables they own.
//!
//! A bucket groups the geometries of one `(layer, style)` pair. Its
//! geometries are drawn either from per-tile renderables, stored in each
//! tile's [`TileRenderables`], or from the bucket's single main renderable
//! when a geometry is too large to tile.

use super::{GeometryId, LayerId, Style};

/// Identifier of a bucket within a [`super::VectorRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketId(pub(crate) u32);

/// Geometries of one layer sharing one style.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    id: BucketId,
    layer: LayerId,
    style: Style,
    main: Option<MainRenderable>,
    geometry_count: usize,
}

impl Bucket {
    pub(crate) fn new(id: BucketId, layer: LayerId, style: Style) -> Self {
        Self {
            id,
            layer,
            style,
            main: None,
            geometry_count: 0,
        }
    }

    pub fn id(&self) -> BucketId {
        self.id
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    /// Untiled renderable, present while it holds geometries.
    pub fn main(&self) -> Option<&MainRenderable> {
        self.main.as_ref()
    }

    /// Geometries currently routed to this bucket, tiled or not.
    pub fn geometry_count(&self) -> usize {
        self.geometry_count
    }

    pub(crate) fn is_compatible(&self, layer: LayerId, style: &Style) -> bool {
        self.layer == layer && self.style == *style
    }

    pub(crate) fn register(&mut self) {
        self.geometry_count += 1;
    }

    pub(crate) fn unregister(&mut self) {
        self.geometry_count = self.geometry_count.saturating_sub(1);
    }

    pub(crate) fn add_to_main(&mut self, geometry: GeometryId) {
        self.main.get_or_insert_with(MainRenderable::default).geometries.push(geometry);
    }

    /// Removes a geometry from the main renderable, dropping it when empty.
    pub(crate) fn remove_from_main(&mut self, geometry: GeometryId) -> bool {
        let Some(main) = self.main.as_mut() else {
            return false;
        };
        let removed = main.remove(geometry);
        if main.geometries.is_empty() {
            self.main = None;
        }
        removed
    }

    pub(crate) fn clear_main(&mut self) {
        self.main = None;
    }
}

/// Renderable drawn regardless of the tiles on screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MainRenderable {
    geometries: Vec<GeometryId>,
}

impl MainRenderable {
    pub fn geometries(&self) -> &[GeometryId] {
        &self.geometries
    }

    fn remove(&mut self, geometry: GeometryId) -> bool {
        let before = self.geometries.len();
        self.geometries.retain(|g| *g != geometry);
        self.geometries.len() != before
    }
}

/// Part of a bucket clipped to one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TiledRenderable {
    bucket: BucketId,
    geometries: Vec<GeometryId>,
    builds_primitives: bool,
}

impl TiledRenderable {
    pub fn bucket(&self) -> BucketId {
        self.bucket
    }

    pub fn geometries(&self) -> &[GeometryId] {
        &self.geometries
    }

    /// `false` when the tile lies outside the layer's level range: the
    /// renderable then only carries geometries down to the children.
    pub fn builds_primitives(&self) -> bool {
        self.builds_primitives
    }
}

/// Renderables attached to one tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileRenderables {
    renderables: Vec<TiledRenderable>,
}

impl TileRenderables {
    pub fn is_empty(&self) -> bool {
        self.renderables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.renderables.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TiledRenderable> {
        self.renderables.iter()
    }

    pub fn get(&self, bucket: BucketId) -> Option<&TiledRenderable> {
        self.renderables.iter().find(|r| r.bucket == bucket)
    }

    /// Every `(bucket, geometry)` pair held by this tile.
    pub fn geometries(&self) -> impl Iterator<Item = (BucketId, GeometryId)> + '_ {
        self.renderables
            .iter()
            .flat_map(|r| r.geometries.iter().map(move |g| (r.bucket, *g)))
    }

    pub fn contains(&self, geometry: GeometryId) -> bool {
        self.renderables.iter().any(|r| r.geometries.contains(&geometry))
    }

    /// Adds a geometry to the bucket's renderable, creating it if needed.
    ///
    /// Returns `false` when the geometry was already attached.
    pub(crate) fn attach(&mut self, bucket: BucketId, geometry: GeometryId, builds: bool) -> bool {
        let index = match self.renderables.iter().position(|r| r.bucket == bucket) {
            Some(index) => index,
            None => {
                self.renderables.push(TiledRenderable {
                    bucket,
                    geometries: Vec::new(),
                    builds_primitives: builds,
                });
                self.renderables.len() - 1
            }
        };
        let renderable = &mut self.renderables[index];
        if renderable.geometries.contains(&geometry) {
            return false;
        }
        renderable.geometries.push(geometry);
        true
    }

    /// Removes a geometry, dropping the renderable when it becomes empty.
    pub(crate) fn detach(&mut self, bucket: BucketId, geometry: GeometryId) -> bool {
        let Some(index) = self.renderables.iter().position(|r| r.bucket == bucket) else {
            return false;
        };
        let renderable = &mut self.renderables[index];
        let before = renderable.geometries.len();
        renderable.geometries.retain(|g| *g != geometry);
        let removed = renderable.geometries.len() != before;
        if renderable.geometries.is_empty() {
            self.renderables.remove(index);
        }
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.renderables.clear();
    }
}
