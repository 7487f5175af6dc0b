//! Bounded pool of request slots.
//!
//! Each slot runs at most one fetch. Fetches are spawned on the current
//! tokio runtime and report back over an unbounded channel; the scheduler
//! drains the channel once per frame from its own thread, so tiles are never
//! touched from a fetch task.
//!
//! Every launch gets a fresh ticket. A completion is accepted only while its
//! slot still holds the same ticket, which turns completions of aborted or
//! superseded requests into no-ops.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::provider::{ContentProvider, FetchError, TileContent};
use crate::tile::TileId;
use crate::tiling::TileAddress;

/// Message sent by a fetch task when it finishes.
#[derive(Debug)]
struct Completion {
    slot: usize,
    ticket: u64,
    result: Result<TileContent, FetchError>,
}

/// Request bound to a slot.
#[derive(Debug)]
struct ActiveRequest {
    tile: TileId,
    address: TileAddress,
    ticket: u64,
    cancel: CancellationToken,
    task: Option<AbortHandle>,
}

impl ActiveRequest {
    fn abort(self) {
        self.cancel.cancel();
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

/// Fixed-capacity set of request slots.
#[derive(Debug)]
pub struct RequestPool {
    slots: Vec<Option<ActiveRequest>>,
    next_ticket: u64,
    sender: mpsc::UnboundedSender<Completion>,
    receiver: mpsc::UnboundedReceiver<Completion>,
}

impl RequestPool {
    /// Creates a pool with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            slots: (0..capacity.max(1)).map(|_| None).collect(),
            next_ticket: 0,
            sender,
            receiver,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots bound to a request whose completion has not been drained.
    pub fn busy(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_idle(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn has_free_slot(&self) -> bool {
        self.slots.iter().any(Option::is_none)
    }

    /// Tiles with a request in a slot.
    pub fn in_flight(&self) -> impl Iterator<Item = TileId> + '_ {
        self.slots.iter().flatten().map(|r| r.tile)
    }

    pub fn is_in_flight(&self, tile: TileId) -> bool {
        self.in_flight().any(|t| t == tile)
    }

    /// Binds a tile to a free slot and starts its fetch.
    ///
    /// Without a provider the tile completes immediately with empty content.
    /// Without a tokio runtime the fetch completes with
    /// [`FetchError::NoRuntime`].
    ///
    /// # Returns
    ///
    /// The slot index, or `None` when every slot is busy.
    pub fn launch(
        &mut self,
        tile: TileId,
        address: TileAddress,
        provider: Option<&Arc<dyn ContentProvider>>,
    ) -> Option<usize> {
        let slot = self.slots.iter().position(Option::is_none)?;
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let cancel = CancellationToken::new();

        let task = match (provider, Handle::try_current()) {
            (None, _) => {
                let _ = self.sender.send(Completion {
                    slot,
                    ticket,
                    result: Ok(TileContent::empty()),
                });
                None
            }
            (Some(_), Err(_)) => {
                let _ = self.sender.send(Completion {
                    slot,
                    ticket,
                    result: Err(FetchError::NoRuntime),
                });
                None
            }
            (Some(provider), Ok(handle)) => {
                let fetch = provider.fetch(address);
                let token = cancel.clone();
                let sender = self.sender.clone();
                let join = handle.spawn(async move {
                    let result = tokio::select! {
                        biased;
                        _ = token.cancelled() => Err(FetchError::Cancelled),
                        result = fetch => result,
                    };
                    let _ = sender.send(Completion {
                        slot,
                        ticket,
                        result,
                    });
                });
                Some(join.abort_handle())
            }
        };

        debug!(tile = %address, slot, ticket, "Launched tile request");
        self.slots[slot] = Some(ActiveRequest {
            tile,
            address,
            ticket,
            cancel,
            task,
        });
        Some(slot)
    }

    /// Cancels the request in `slot` and frees it. Idle slots are left as is.
    pub fn abort_slot(&mut self, slot: usize) -> bool {
        match self.slots.get_mut(slot).and_then(Option::take) {
            Some(request) => {
                debug!(tile = %request.address, slot, "Aborted tile request");
                request.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels the request bound to `tile`, if any.
    pub fn abort_tile(&mut self, tile: TileId) -> bool {
        match self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|r| r.tile == tile))
        {
            Some(slot) => self.abort_slot(slot),
            None => false,
        }
    }

    /// Cancels every request. Returns how many were in flight.
    pub fn abort_all(&mut self) -> usize {
        (0..self.slots.len())
            .filter(|&slot| self.abort_slot(slot))
            .count()
    }

    /// Next completion of a live request, freeing its slot.
    ///
    /// Completions of aborted requests are skipped.
    pub fn try_complete(&mut self) -> Option<(TileId, Result<TileContent, FetchError>)> {
        while let Ok(completion) = self.receiver.try_recv() {
            let current = self
                .slots
                .get(completion.slot)
                .and_then(Option::as_ref)
                .is_some_and(|r| r.ticket == completion.ticket);
            if !current {
                trace!(slot = completion.slot, ticket = completion.ticket, "Dropped orphan completion");
                continue;
            }
            if let Some(request) = self.slots[completion.slot].take() {
                return Some((request.tile, completion.result));
            }
        }
        None
    }

    /// Aborts everything and stops accepting completions.
    pub fn close(&mut self) {
        self.abort_all();
        self.receiver.close();
    }
}

impl Drop for RequestPool {
    fn drop(&mut self) {
        self.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SimulatedProvider;
    use crate::tile::{Tile, TileTree};
    use std::time::Duration;

    fn tiles(n: u32) -> Vec<TileId> {
        let mut tree = TileTree::new();
        (0..n)
            .map(|x| tree.insert(Tile::detached(TileAddress::Quad { level: 0, x, y: 0 })))
            .collect()
    }

    fn address(x: u32) -> TileAddress {
        TileAddress::Quad { level: 0, x, y: 0 }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[test]
    fn test_capacity_is_at_least_one() {
        assert_eq!(RequestPool::new(0).capacity(), 1);
        assert_eq!(RequestPool::new(4).capacity(), 4);
    }

    #[test]
    fn test_no_provider_completes_immediately() {
        let ids = tiles(1);
        let mut pool = RequestPool::new(2);
        assert_eq!(pool.launch(ids[0], address(0), None), Some(0));
        assert_eq!(pool.busy(), 1);
        let (tile, result) = pool.try_complete().unwrap();
        assert_eq!(tile, ids[0]);
        assert_eq!(result, Ok(TileContent::empty()));
        assert!(pool.is_idle());
    }

    #[test]
    fn test_no_runtime_reports_error() {
        let ids = tiles(1);
        let provider: Arc<dyn ContentProvider> = Arc::new(SimulatedProvider::new(3));
        let mut pool = RequestPool::new(1);
        pool.launch(ids[0], address(0), Some(&provider));
        let (_, result) = pool.try_complete().unwrap();
        assert_eq!(result, Err(FetchError::NoRuntime));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_never_exceeds_capacity() {
        let ids = tiles(6);
        let provider: Arc<dyn ContentProvider> =
            Arc::new(SimulatedProvider::new(3).with_latency(Duration::from_millis(10)));
        let mut pool = RequestPool::new(4);
        let launched: Vec<_> = ids
            .iter()
            .enumerate()
            .filter_map(|(x, id)| pool.launch(*id, address(x as u32), Some(&provider)))
            .collect();
        assert_eq!(launched, vec![0, 1, 2, 3]);
        assert_eq!(pool.busy(), 4);
        assert!(!pool.has_free_slot());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_frees_slot() {
        let ids = tiles(1);
        let provider: Arc<dyn ContentProvider> = Arc::new(SimulatedProvider::new(3));
        let mut pool = RequestPool::new(1);
        pool.launch(ids[0], address(0), Some(&provider));
        assert_eq!(pool.busy(), 1);

        settle().await;
        let (tile, result) = pool.try_complete().unwrap();
        assert_eq!(tile, ids[0]);
        assert!(result.is_ok());
        assert!(pool.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_completion_is_dropped() {
        let ids = tiles(2);
        let simulated = SimulatedProvider::new(3);
        simulated.hold();
        let provider: Arc<dyn ContentProvider> = Arc::new(simulated.clone());
        let mut pool = RequestPool::new(1);

        pool.launch(ids[0], address(0), Some(&provider));
        assert!(pool.abort_tile(ids[0]));
        assert!(pool.is_idle());
        assert!(!pool.abort_slot(0));

        pool.launch(ids[1], address(1), Some(&provider));
        simulated.release();
        settle().await;

        let (tile, result) = pool.try_complete().unwrap();
        assert_eq!(tile, ids[1]);
        assert!(result.is_ok());
        assert!(pool.try_complete().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_all() {
        let ids = tiles(3);
        let simulated = SimulatedProvider::new(3);
        simulated.hold();
        let provider: Arc<dyn ContentProvider> = Arc::new(simulated);
        let mut pool = RequestPool::new(4);
        for (x, id) in ids.iter().enumerate() {
            pool.launch(*id, address(x as u32), Some(&provider));
        }
        assert!(pool.is_in_flight(ids[2]));
        assert_eq!(pool.abort_all(), 3);
        assert_eq!(pool.abort_all(), 0);
        settle().await;
        assert!(pool.try_complete().is_none());
    }
}
