//! Per-frame output of the scheduler.

use std::fmt;

use crate::tile::TileId;
use crate::tiling::TileAddress;

/// Signals surfaced to the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum TileEvent {
    /// Every level-zero tile is loaded. Emitted once per provider.
    BaseLayersReady,
    /// At least one level-zero tile failed. Emitted once until reset.
    BaseLayersError {
        provider: String,
        failed: Vec<TileAddress>,
    },
    /// The request pool went from idle to busy.
    BackgroundLoadStart,
    /// The request pool went from busy to idle.
    BackgroundLoadEnd,
}

impl fmt::Display for TileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileEvent::BaseLayersReady => write!(f, "base layers ready"),
            TileEvent::BaseLayersError { provider, failed } => {
                write!(f, "base layers error ({}: {} tiles)", provider, failed.len())
            }
            TileEvent::BackgroundLoadStart => write!(f, "background load start"),
            TileEvent::BackgroundLoadEnd => write!(f, "background load end"),
        }
    }
}

/// A tile to draw this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderEntry {
    /// Leaf tile whose region is drawn.
    pub tile: TileId,
    /// Tile whose generated content covers that region: the tile itself
    /// once loaded, otherwise its nearest loaded ancestor.
    pub source: TileId,
}

impl RenderEntry {
    /// Whether the region is drawn from an ancestor's content.
    pub fn is_borrowed(&self) -> bool {
        self.tile != self.source
    }
}

/// Counters collected during one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Tiles visited by the traversal.
    pub traversed: usize,
    /// Tiles rejected by the view.
    pub culled: usize,
    /// Tiles that entered `REQUESTED` this frame.
    pub requested: usize,
    /// Requests bound to a slot.
    pub launched: usize,
    /// Requests dropped for lack of a free slot.
    pub deferred: usize,
    /// Tiles whose content was generated.
    pub generated: usize,
    /// Completions discarded because their tile was no longer wanted.
    pub stale: usize,
    /// Completions that failed.
    pub failed: usize,
    /// In-flight requests cancelled by culling or disposal.
    pub aborted: usize,
    /// Tiles removed from the tree.
    pub disposed: usize,
    /// Slots busy at the end of the frame.
    pub in_flight: usize,
    /// Entries in the render set.
    pub rendered: usize,
}

impl FrameStats {
    /// Sums counters over frames; `in_flight` keeps the latest value.
    pub fn accumulate(&mut self, other: &FrameStats) {
        self.traversed += other.traversed;
        self.culled += other.culled;
        self.requested += other.requested;
        self.launched += other.launched;
        self.deferred += other.deferred;
        self.generated += other.generated;
        self.stale += other.stale;
        self.failed += other.failed;
        self.aborted += other.aborted;
        self.disposed += other.disposed;
        self.in_flight = other.in_flight;
        self.rendered += other.rendered;
    }
}

/// Result of [`super::TileManager::frame`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Frame number the report belongs to.
    pub frame: u64,
    /// `true` when the provider was not ready and nothing ran.
    pub skipped: bool,
    pub events: Vec<TileEvent>,
    pub stats: FrameStats,
    /// Tiles that became `LOADED` this frame, in generation order.
    pub generated: Vec<TileId>,
}

impl FrameReport {
    pub(crate) fn new(frame: u64) -> Self {
        Self {
            frame,
            ..Self::default()
        }
    }

    pub fn has_event(&self, event: &TileEvent) -> bool {
        self.events.contains(event)
    }
}
