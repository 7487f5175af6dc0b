//! Tile nodes, their lifecycle and the arena holding them.
//!
//! # Lifecycle
//!
//! ```text
//! NONE ──request──▶ REQUESTED ──generate──▶ LOADED
//!   ▲                  │  │
//!   └──abort/stale─────┘  └──fail──▶ ERROR ──retry──▶ REQUESTED
//! ```
//!
//! Any state returns to `NONE` through [`Tile::dispose`]; a tile's children
//! must be removed from the tree before it is disposed.

mod mesh;
mod tree;

use std::fmt;

use bytes::Bytes;

use crate::geo::GeoBound;
use crate::tiling::{TileAddress, TileFootprint};
use crate::vector::TileRenderables;

pub use mesh::TileMesh;
pub use tree::{TileId, TileTree};

/// Lifecycle state of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileState {
    /// No content and no request.
    #[default]
    None,
    /// Waiting for a request slot or a fetch in flight.
    Requested,
    /// Content generated.
    Loaded,
    /// Fetch failed.
    Error,
}

impl TileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileState::None => "none",
            TileState::Requested => "requested",
            TileState::Loaded => "loaded",
            TileState::Error => "error",
        }
    }

    /// Whether a transition is part of the lifecycle (disposal excluded).
    pub fn can_transition(self, to: TileState) -> bool {
        matches!(
            (self, to),
            (TileState::None, TileState::Requested)
                | (TileState::Requested, TileState::Loaded)
                | (TileState::Requested, TileState::Error)
                | (TileState::Requested, TileState::None)
                | (TileState::Error, TileState::Requested)
        )
    }
}

impl fmt::Display for TileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the tile quadtree.
#[derive(Debug)]
pub struct Tile {
    pub(crate) address: TileAddress,
    pub(crate) footprint: TileFootprint,
    pub(crate) state: TileState,
    pub(crate) frame_number: u64,
    pub(crate) parent: Option<TileId>,
    pub(crate) parent_slot: Option<usize>,
    pub(crate) children: Option<[TileId; 4]>,
    pub(crate) mesh: Option<TileMesh>,
    pub(crate) image: Option<Bytes>,
    pub(crate) extension: TileRenderables,
    pub(crate) attempts: u32,
    pub(crate) retry_at: u64,
}

impl Tile {
    /// Creates a tile in `NONE`.
    ///
    /// `parent` is the parent id and the child slot this tile occupies.
    pub fn new(
        address: TileAddress,
        footprint: TileFootprint,
        parent: Option<(TileId, usize)>,
    ) -> Self {
        Self {
            address,
            footprint,
            state: TileState::None,
            frame_number: 0,
            parent: parent.map(|(id, _)| id),
            parent_slot: parent.map(|(_, slot)| slot),
            children: None,
            mesh: None,
            image: None,
            extension: TileRenderables::default(),
            attempts: 0,
            retry_at: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(address: TileAddress) -> Self {
        Self::new(
            address,
            TileFootprint {
                bound: GeoBound::WORLD,
                center: nalgebra::Vector3::zeros(),
                radius: 1.0,
            },
            None,
        )
    }

    pub fn address(&self) -> TileAddress {
        self.address
    }

    pub fn level(&self) -> u32 {
        self.address.level()
    }

    pub fn footprint(&self) -> &TileFootprint {
        &self.footprint
    }

    pub fn bound(&self) -> &GeoBound {
        &self.footprint.bound
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == TileState::Loaded
    }

    /// Last frame in which the scheduler visited this tile.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn parent(&self) -> Option<TileId> {
        self.parent
    }

    /// Slot in the parent's child list, `None` for level zero.
    pub fn parent_slot(&self) -> Option<usize> {
        self.parent_slot
    }

    pub fn children(&self) -> Option<[TileId; 4]> {
        self.children
    }

    pub fn mesh(&self) -> Option<&TileMesh> {
        self.mesh.as_ref()
    }

    pub fn image(&self) -> Option<&Bytes> {
        self.image.as_ref()
    }

    /// Renderables attached by the vector layer.
    pub fn extension(&self) -> &TileRenderables {
        &self.extension
    }

    /// Failed attempts since the tile was last loaded or disposed.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// `NONE`/`ERROR` to `REQUESTED`.
    pub(crate) fn request(&mut self) -> bool {
        self.transition(TileState::Requested)
    }

    /// `REQUESTED` back to `NONE` when the request is dropped.
    pub(crate) fn cancel_request(&mut self) -> bool {
        self.transition(TileState::None)
    }

    pub(crate) fn generate(&mut self, mesh: TileMesh, image: Option<Bytes>) -> bool {
        if !self.transition(TileState::Loaded) {
            return false;
        }
        self.mesh = Some(mesh);
        self.image = image;
        self.attempts = 0;
        true
    }

    pub(crate) fn fail(&mut self) -> bool {
        if !self.transition(TileState::Error) {
            return false;
        }
        self.attempts += 1;
        true
    }

    /// Drops generated content and attached renderables.
    pub(crate) fn dispose(&mut self) {
        debug_assert!(self.children.is_none(), "children must be removed first");
        self.state = TileState::None;
        self.mesh = None;
        self.image = None;
        self.extension = TileRenderables::default();
        self.attempts = 0;
        self.retry_at = 0;
    }

    fn transition(&mut self, to: TileState) -> bool {
        if self.state.can_transition(to) {
            self.state = to;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile() -> Tile {
        Tile::detached(TileAddress::Quad { level: 1, x: 0, y: 1 })
    }

    fn mesh() -> TileMesh {
        use crate::config::TileConfig;
        use crate::crs::SphericalCrs;
        use crate::tiling::TilingScheme;

        let tiling = TilingScheme::default().build().unwrap();
        TileMesh::build(
            &tiling,
            &TileAddress::Quad { level: 1, x: 0, y: 1 },
            &SphericalCrs::wgs84(),
            &TileConfig::default().with_tesselation(2),
            nalgebra::Vector3::zeros(),
            1.0,
            None,
        )
    }

    #[test]
    fn test_new_tile_is_none() {
        let tile = tile();
        assert_eq!(tile.state(), TileState::None);
        assert_eq!(tile.level(), 1);
        assert!(tile.children().is_none());
        assert!(tile.parent_slot().is_none());
    }

    #[test]
    fn test_load_path() {
        let mut tile = tile();
        assert!(tile.request());
        assert!(!tile.request());
        assert!(tile.generate(mesh(), Some(Bytes::from_static(b"img"))));
        assert!(tile.is_loaded());
        assert!(tile.mesh().is_some());
    }

    #[test]
    fn test_cannot_generate_without_request() {
        let mut tile = tile();
        assert!(!tile.generate(mesh(), None));
        assert_eq!(tile.state(), TileState::None);
    }

    #[test]
    fn test_error_counts_attempts_and_allows_retry() {
        let mut tile = tile();
        tile.request();
        assert!(tile.fail());
        assert_eq!(tile.attempts(), 1);
        assert!(tile.request());
        assert!(tile.fail());
        assert_eq!(tile.attempts(), 2);
    }

    #[test]
    fn test_cancel_only_from_requested() {
        let mut tile = tile();
        assert!(!tile.cancel_request());
        tile.request();
        assert!(tile.cancel_request());
        assert_eq!(tile.state(), TileState::None);
    }

    #[test]
    fn test_dispose_resets_everything() {
        let mut tile = tile();
        tile.request();
        tile.generate(mesh(), None);
        tile.dispose();
        assert_eq!(tile.state(), TileState::None);
        assert!(tile.mesh().is_none());
        assert!(tile.extension().is_empty());
    }

    #[test]
    fn test_transition_table() {
        use TileState::*;
        assert!(None.can_transition(Requested));
        assert!(!None.can_transition(Loaded));
        assert!(!Loaded.can_transition(Requested));
        assert!(!Loaded.can_transition(Error));
        assert!(Error.can_transition(Requested));
        assert_eq!(Requested.to_string(), "requested");
    }
}
