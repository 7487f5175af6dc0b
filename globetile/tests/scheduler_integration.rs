//! Integration tests for tile scheduling against an asynchronous provider.
//!
//! These tests drive a [`Globe`] frame by frame on a paused tokio clock and
//! verify:
//! - the request pool never exceeds its capacity
//! - stale completions never load a tile
//! - culling a tile aborts the requests of its subtree
//! - background-load and base-layer events
//! - retries of failed tiles below level zero
//!
//! Run with: `cargo test --test scheduler_integration`

use std::sync::Arc;
use std::time::Duration;

use globetile::config::{GlobeConfig, SchedulerConfig, TileConfig};
use globetile::provider::{ContentProvider, SimulatedProvider};
use globetile::scheduler::{FrameReport, RenderView, RetryPolicy, TileEvent};
use globetile::tile::{Tile, TileState};
use globetile::tiling::TileAddress;
use globetile::Globe;

// ============================================================================
// Helper Functions
// ============================================================================

/// View that sees everything except an explicit list of tiles and refines
/// down to a fixed level.
struct TestView {
    refine_to: u32,
    culled: Vec<TileAddress>,
}

impl TestView {
    fn new(refine_to: u32) -> Self {
        Self {
            refine_to,
            culled: Vec::new(),
        }
    }

    fn culling(mut self, address: TileAddress) -> Self {
        self.culled.push(address);
        self
    }
}

impl RenderView for TestView {
    fn is_culled(&self, tile: &Tile) -> bool {
        self.culled.contains(&tile.address())
    }

    fn needs_refinement(&self, tile: &Tile, _tile_pixel_size: u32) -> bool {
        tile.level() < self.refine_to
    }

    fn distance(&self, tile: &Tile) -> f64 {
        let (lon, lat) = tile.bound().center();
        lon.abs() + lat.abs()
    }
}

fn globe(max_requests: usize, retry: RetryPolicy) -> Globe {
    let config = GlobeConfig::default()
        .with_tile(TileConfig::default().with_tesselation(3))
        .with_scheduler(
            SchedulerConfig::default()
                .with_max_requests(max_requests)
                .with_retry(retry),
        );
    Globe::new(config).unwrap()
}

fn with_provider(globe: &mut Globe, provider: &SimulatedProvider) {
    let provider: Arc<dyn ContentProvider> = Arc::new(provider.clone());
    globe.set_provider(Some(provider)).unwrap();
}

/// Runs one frame, then lets fetch tasks progress for `step`.
async fn step(globe: &mut Globe, view: &TestView, step: Duration) -> FrameReport {
    let report = globe.frame(view);
    tokio::time::sleep(step).await;
    report
}

fn state_of(globe: &Globe, address: TileAddress) -> Option<TileState> {
    let mut state = None;
    globe.tiles().visit_tiles(|_, tile| {
        if tile.address() == address {
            state = Some(tile.state());
        }
    });
    state
}

fn count_events(reports: &[FrameReport], event: &TileEvent) -> usize {
    reports
        .iter()
        .flat_map(|r| r.events.iter())
        .filter(|e| *e == event)
        .count()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// The number of busy slots never exceeds the configured pool size while
/// a whole tree loads.
#[tokio::test(start_paused = true)]
async fn test_pool_never_exceeds_capacity() {
    let provider = SimulatedProvider::new(4).with_latency(Duration::from_millis(5));
    let mut globe = globe(4, RetryPolicy::None);
    with_provider(&mut globe, &provider);

    let view = TestView::new(3);
    let mut loaded_deep = false;
    for _ in 0..400 {
        let report = step(&mut globe, &view, Duration::from_millis(10)).await;
        assert!(report.stats.in_flight <= 4);
        assert!(report.stats.launched <= 4);
        assert!(globe.tiles().in_flight() <= 4);
        if globe.tiles().render_set().iter().all(|e| !e.is_borrowed())
            && globe.tiles().render_set().len() == 8 * 64
        {
            loaded_deep = true;
            break;
        }
    }
    assert!(loaded_deep, "tree never finished loading");
}

/// Content arriving for a tile that was not visited in the current frame is
/// discarded and the tile returns to `NONE`.
#[tokio::test(start_paused = true)]
async fn test_stale_completion_never_loads() {
    let provider = SimulatedProvider::new(4);
    provider.hold();
    let mut globe = globe(4, RetryPolicy::None);
    with_provider(&mut globe, &provider);

    let view = TestView::new(0);
    let first = step(&mut globe, &view, Duration::from_millis(1)).await;
    assert_eq!(first.stats.launched, 4);

    globe.set_frozen(true);
    provider.release();
    tokio::time::sleep(Duration::from_millis(1)).await;
    let stale = globe.frame(&view);
    assert_eq!(stale.stats.stale, 4);
    assert_eq!(stale.stats.generated, 0);
    assert!(globe
        .tiles()
        .level_zero()
        .iter()
        .all(|id| globe.tiles().tree().get(*id).unwrap().state() == TileState::None));
}

/// Culling a loaded tile removes its children and aborts their fetches; the
/// freed slots go to other candidates.
#[tokio::test(start_paused = true)]
async fn test_culling_aborts_in_flight_children() {
    let provider = SimulatedProvider::new(4);
    let mut globe = globe(4, RetryPolicy::None);
    with_provider(&mut globe, &provider);

    let view = TestView::new(1);
    let mut ready = false;
    for _ in 0..10 {
        let report = globe.frame(&view);
        if report.has_event(&TileEvent::BaseLayersReady) {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(ready);
    // Children were launched by the frame that completed level zero; keep
    // them in flight.
    provider.hold();
    assert_eq!(globe.tiles().in_flight(), 4);

    let parent = TileAddress::Quad { level: 0, x: 2, y: 0 };
    let in_flight_child = TileAddress::Quad { level: 1, x: 4, y: 1 };
    assert_eq!(state_of(&globe, in_flight_child), Some(TileState::Requested));

    let report = globe.frame(&TestView::new(1).culling(parent));
    assert_eq!(report.stats.aborted, 1);
    assert_eq!(report.stats.disposed, 4);
    assert_eq!(state_of(&globe, in_flight_child), None);
    assert_eq!(globe.tiles().in_flight(), 4);
    assert_eq!(report.stats.launched, 1);
}

/// Background-load start/end pair up and base layers are reported once.
#[tokio::test(start_paused = true)]
async fn test_background_and_base_layer_events() {
    let provider = SimulatedProvider::new(2).with_latency(Duration::from_millis(20));
    let mut globe = globe(4, RetryPolicy::None);
    with_provider(&mut globe, &provider);

    let view = TestView::new(5);
    let mut reports = Vec::new();
    for _ in 0..100 {
        reports.push(step(&mut globe, &view, Duration::from_millis(10)).await);
    }

    assert!(reports[0].has_event(&TileEvent::BackgroundLoadStart));
    assert_eq!(count_events(&reports, &TileEvent::BaseLayersReady), 1);
    let starts = count_events(&reports, &TileEvent::BackgroundLoadStart);
    let ends = count_events(&reports, &TileEvent::BackgroundLoadEnd);
    assert!(starts >= 1);
    assert_eq!(starts, ends);
    assert_eq!(globe.tiles().in_flight(), 0);
    // Two levels: level zero and its 32 children, nothing deeper.
    assert_eq!(provider.fetch_count(), 8 + 32);
}

/// A failing level-zero tile is reported once, and base layers never become
/// ready until the provider is replaced.
#[tokio::test(start_paused = true)]
async fn test_level_zero_failure_reported_once() {
    let broken = TileAddress::Quad { level: 0, x: 0, y: 0 };
    let provider = SimulatedProvider::new(3).with_name("broken");
    provider.fail_tile(broken);
    let mut globe = globe(8, RetryPolicy::None);
    with_provider(&mut globe, &provider);

    let view = TestView::new(0);
    let mut reports = Vec::new();
    for _ in 0..10 {
        reports.push(step(&mut globe, &view, Duration::from_millis(1)).await);
    }
    let errors: Vec<&TileEvent> = reports
        .iter()
        .flat_map(|r| r.events.iter())
        .filter(|e| matches!(e, TileEvent::BaseLayersError { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0],
        &TileEvent::BaseLayersError {
            provider: "broken".into(),
            failed: vec![broken],
        }
    );
    assert_eq!(count_events(&reports, &TileEvent::BaseLayersReady), 0);

    provider.heal(&broken);
    with_provider(&mut globe, &provider);
    for _ in 0..5 {
        step(&mut globe, &view, Duration::from_millis(1)).await;
    }
    assert!(globe.tiles().is_base_ready());
}

/// A tile below level zero is retried up to the policy's attempt count and
/// then stays in `ERROR`.
#[tokio::test(start_paused = true)]
async fn test_failed_child_is_retried_then_given_up() {
    let broken = TileAddress::Quad { level: 1, x: 4, y: 1 };
    let provider = SimulatedProvider::new(2);
    provider.fail_tile(broken);
    let mut globe = globe(64, RetryPolicy::fixed(2, 1));
    with_provider(&mut globe, &provider);

    let view = TestView::new(1);
    for _ in 0..20 {
        step(&mut globe, &view, Duration::from_millis(1)).await;
    }
    let attempts = provider.fetch_log().iter().filter(|a| **a == broken).count();
    assert_eq!(attempts, 2);
    assert_eq!(state_of(&globe, broken), Some(TileState::Error));

    // The failed tile still renders from its parent.
    let borrowed = globe
        .tiles()
        .render_set()
        .iter()
        .filter(|e| e.is_borrowed())
        .count();
    assert_eq!(borrowed, 1);

    provider.heal(&broken);
    globe.reset();
    for _ in 0..10 {
        step(&mut globe, &view, Duration::from_millis(1)).await;
    }
    assert_eq!(state_of(&globe, broken), Some(TileState::Loaded));
}
