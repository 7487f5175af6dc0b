//! In-process content provider.
//!
//! Produces small deterministic payloads after a configurable delay. Tiles
//! can be made to fail individually or by rate, fetches can be held until
//! released, and every fetch is logged, which makes the provider suitable
//! for driving the scheduler in tests and simulations.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::tiling::{TileAddress, TilingScheme};

use super::{ContentProvider, FetchError, TileContent, DEFAULT_TILE_PIXEL_SIZE};

/// Deterministic content source.
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    name: String,
    number_of_levels: u32,
    tile_pixel_size: u32,
    latency: Duration,
    failure_rate: f64,
    failing: Arc<Mutex<HashSet<TileAddress>>>,
    elevation_grid: Option<usize>,
    tiling: Option<TilingScheme>,
    level_zero_shortcut: bool,
    ready: Arc<AtomicBool>,
    fetch_log: Arc<Mutex<Vec<TileAddress>>>,
    hold: Arc<watch::Sender<bool>>,
}

impl SimulatedProvider {
    /// Creates a provider serving `number_of_levels` levels without delay.
    pub fn new(number_of_levels: u32) -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            name: "simulated".to_string(),
            number_of_levels,
            tile_pixel_size: DEFAULT_TILE_PIXEL_SIZE,
            latency: Duration::ZERO,
            failure_rate: 0.0,
            failing: Arc::new(Mutex::new(HashSet::new())),
            elevation_grid: None,
            tiling: None,
            level_zero_shortcut: false,
            ready: Arc::new(AtomicBool::new(true)),
            fetch_log: Arc::new(Mutex::new(Vec::new())),
            hold: Arc::new(hold),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_tile_pixel_size(mut self, size: u32) -> Self {
        self.tile_pixel_size = size;
        self
    }

    /// Fraction of tiles in `[0, 1]` that fail; the choice is a fixed hash of
    /// the address so repeated runs fail the same tiles.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Attaches a synthetic height grid of `size x size` samples.
    pub fn with_elevations(mut self, size: usize) -> Self {
        self.elevation_grid = Some(size);
        self
    }

    pub fn with_tiling(mut self, tiling: TilingScheme) -> Self {
        self.tiling = Some(tiling);
        self
    }

    /// Serves level zero through [`ContentProvider::level_zero_content`].
    pub fn with_level_zero_shortcut(mut self) -> Self {
        self.level_zero_shortcut = true;
        self
    }

    /// Makes one tile fail until [`SimulatedProvider::heal`] is called.
    pub fn fail_tile(&self, address: TileAddress) {
        self.failing.lock().insert(address);
    }

    pub fn heal(&self, address: &TileAddress) {
        self.failing.lock().remove(address);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Holds every fetch (including those already started) until
    /// [`SimulatedProvider::release`].
    pub fn hold(&self) {
        self.hold.send_replace(true);
    }

    pub fn release(&self) {
        self.hold.send_replace(false);
    }

    /// Addresses fetched so far, in start order.
    pub fn fetch_log(&self) -> Vec<TileAddress> {
        self.fetch_log.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_log.lock().len()
    }

    fn should_fail(&self, address: &TileAddress) -> bool {
        if self.failing.lock().contains(address) {
            return true;
        }
        self.failure_rate > 0.0 && (address_hash(address) % 1000) < (self.failure_rate * 1000.0) as u64
    }

    fn content(&self, address: &TileAddress) -> TileContent {
        let image = Bytes::from(format!("{}:{}", self.name, address));
        let elevations = self.elevation_grid.map(|size| synthetic_heights(address, size));
        TileContent {
            image: Some(image),
            elevations,
        }
    }
}

impl ContentProvider for SimulatedProvider {
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

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn level_zero_content(&self, addresses: &[TileAddress]) -> Option<Vec<TileContent>> {
        self.level_zero_shortcut
            .then(|| addresses.iter().map(|a| self.content(a)).collect())
    }

    fn fetch(&self, address: TileAddress) -> BoxFuture<'static, Result<TileContent, FetchError>> {
        self.fetch_log.lock().push(address);
        let latency = self.latency;
        let mut hold = self.hold.subscribe();
        let result = if self.should_fail(&address) {
            Err(FetchError::Failed(address, "simulated failure".to_string()))
        } else {
            Ok(self.content(&address))
        };

        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            // A closed channel means the provider is gone; finish anyway.
            let _ = hold.wait_for(|held| !*held).await;
            result
        }
        .boxed()
    }
}

fn address_hash(address: &TileAddress) -> u64 {
    let (a, b, c) = match *address {
        TileAddress::Quad { level, x, y } => (level as u64, x as u64, y as u64),
        TileAddress::Nested { order, pixel } => (order as u64 + 64, pixel, pixel >> 32),
    };
    let mut h = a.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    h ^= b.wrapping_add(0x632B_E59B_D9B4_E019).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h ^= c.wrapping_add(0x1F12_3BB5_159A_55E5).wrapping_mul(0x94D0_49BB_1331_11EB);
    h ^ (h >> 31)
}

/// Gentle hills whose amplitude shrinks with depth.
fn synthetic_heights(address: &TileAddress, size: usize) -> Vec<f32> {
    let seed = (address_hash(address) % 1000) as f32 / 1000.0;
    let amplitude = 1000.0 / (1 + address.level()) as f32;
    (0..size * size)
        .map(|k| {
            let (i, j) = ((k % size) as f32, (k / size) as f32);
            amplitude * ((i * 0.7 + seed * 6.0).sin() * (j * 0.5).cos())
        })
        .collect()
}
