//! Generational arena holding every tile of a globe.
//!
//! Tiles refer to their parent and children by [`TileId`]. Removing a tile
//! bumps its slot generation, so ids held elsewhere (request slots, render
//! sets) become dangling-safe: lookups with an old id return `None`.

use std::collections::VecDeque;

use super::Tile;

/// Stable handle to a tile in a [`TileTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    index: u32,
    generation: u32,
}

impl TileId {
    /// Slot index, only meaningful together with the generation.
    pub fn index(&self) -> u32 {
        self.index
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    tile: Option<Tile>,
}

/// Arena of tiles.
#[derive(Debug, Default)]
pub struct TileTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl TileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live tiles.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores a tile and returns its id.
    pub fn insert(&mut self, tile: Tile) -> TileId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.tile = Some(tile);
            return TileId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            tile: Some(tile),
        });
        TileId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: TileId) -> Option<&Tile> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.tile.as_ref())
    }

    pub fn get_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.tile.as_mut())
    }

    pub fn contains(&self, id: TileId) -> bool {
        self.get(id).is_some()
    }

    /// Removes a single tile without touching its children.
    ///
    /// The caller is responsible for the parent's child list.
    pub fn remove(&mut self, id: TileId) -> Option<Tile> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let tile = slot.tile.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(tile)
    }

    /// Removes every descendant of `id`, children before parents, and clears
    /// its child list. The tile itself stays.
    ///
    /// Returns the removed tiles so the caller can release their resources.
    pub fn remove_children(&mut self, id: TileId) -> Vec<(TileId, Tile)> {
        let Some(children) = self.get_mut(id).and_then(|tile| tile.children.take()) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        for child in children {
            self.remove_subtree_into(child, &mut removed);
        }
        removed
    }

    fn remove_subtree_into(&mut self, id: TileId, removed: &mut Vec<(TileId, Tile)>) {
        let children = self.get_mut(id).and_then(|tile| tile.children.take());
        if let Some(children) = children {
            for child in children {
                self.remove_subtree_into(child, removed);
            }
        }
        if let Some(tile) = self.remove(id) {
            removed.push((id, tile));
        }
    }

    /// Removes everything.
    pub fn clear(&mut self) -> Vec<(TileId, Tile)> {
        let mut removed = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(tile) = slot.tile.take() {
                removed.push((
                    TileId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    tile,
                ));
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.len = 0;
        removed
    }

    /// Live tiles in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (TileId, &Tile)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.tile.as_ref().map(|tile| {
                (
                    TileId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    tile,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (TileId, &mut Tile)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.tile.as_mut().map(|tile| {
                (
                    TileId {
                        index: index as u32,
                        generation,
                    },
                    tile,
                )
            })
        })
    }

    /// Breadth-first walk below (and including) `roots`.
    pub fn visit<F>(&self, roots: &[TileId], mut visitor: F)
    where
        F: FnMut(TileId, &Tile),
    {
        let mut queue: VecDeque<TileId> = roots.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            let Some(tile) = self.get(id) else {
                continue;
            };
            visitor(id, tile);
            if let Some(children) = tile.children {
                queue.extend(children);
            }
        }
    }

    /// Nearest loaded tile among `id` and its ancestors.
    pub fn loaded_ancestor_or_self(&self, id: TileId) -> Option<TileId> {
        let mut current = Some(id);
        while let Some(cid) = current {
            let tile = self.get(cid)?;
            if tile.is_loaded() {
                return Some(cid);
            }
            current = tile.parent;
        }
        None
    }
}
