//! Simulate command - run frames of an orbiting camera against a provider.
//!
//! The camera circles the globe along a parallel, one step per frame, while
//! the scheduler fetches tiles from the built-in simulated provider or an
//! XYZ HTTP server. Events are printed as they happen and the accumulated
//! frame statistics at the end.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use globetile::config::GlobeConfig;
use globetile::crs::CoordinateSystem;
use globetile::provider::{ContentProvider, HttpTileProvider, SimulatedProvider};
use globetile::scheduler::{FrameStats, OrbitView};
use globetile::tiling::MAX_LEVEL;
use globetile::vector::{Layer, Style};
use globetile::Globe;
use tracing::info;

use super::common::load_geometries;
use crate::error::CliError;

/// Arguments for the simulate command.
#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Number of frames to run
    #[arg(long, default_value_t = 300)]
    pub frames: u64,

    /// Wall-clock time between frames in milliseconds
    #[arg(long, default_value_t = 16)]
    pub frame_ms: u64,

    /// Simulated fetch latency in milliseconds
    #[arg(long, default_value_t = 30)]
    pub latency_ms: u64,

    /// Fraction of simulated tiles that fail, in [0, 1]
    #[arg(long, default_value_t = 0.0)]
    pub failure_rate: f64,

    /// Number of content levels served by the provider
    #[arg(long, default_value_t = 8)]
    pub levels: u32,

    /// XYZ URL template ({z}/{x}/{y}) to fetch from instead of simulating
    #[arg(long)]
    pub url: Option<String>,

    /// GeoJSON file whose geometries are attached to the tiles
    #[arg(long)]
    pub geojson: Option<PathBuf>,

    /// Starting camera longitude in degrees
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub lon: f64,

    /// Camera latitude in degrees
    #[arg(long, default_value_t = 30.0, allow_hyphen_values = true)]
    pub lat: f64,

    /// Camera altitude in kilometers
    #[arg(long, default_value_t = 8000.0)]
    pub altitude_km: f64,

    /// Longitude the camera advances per frame, in degrees
    #[arg(long, default_value_t = 0.5, allow_hyphen_values = true)]
    pub orbit_step: f64,

    /// Request slots (overrides scheduler.max_requests)
    #[arg(long)]
    pub max_requests: Option<usize>,

    /// Print a progress line every N frames (0 disables)
    #[arg(long, default_value_t = 50)]
    pub report_every: u64,
}

/// What a simulation run produced.
#[derive(Debug, Default)]
pub struct SimulationSummary {
    pub frames: u64,
    pub skipped: u64,
    pub stats: FrameStats,
    pub events: usize,
    pub geometries: usize,
    pub tiles: usize,
    pub rendered: usize,
    pub render_items: usize,
    pub base_ready: bool,
}

/// Run the simulate command.
pub fn run(mut config: GlobeConfig, args: SimulateArgs) -> Result<(), CliError> {
    if let Some(max_requests) = args.max_requests {
        config.scheduler.max_requests = max_requests;
    }
    if !(0.0..=1.0).contains(&args.failure_rate) {
        return Err(CliError::Config(format!(
            "failure rate {} is outside [0, 1]",
            args.failure_rate
        )));
    }
    if args.levels > MAX_LEVEL + 1 {
        return Err(CliError::Config(format!(
            "{} levels exceed the addressable maximum of {}",
            args.levels,
            MAX_LEVEL + 1
        )));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(simulate(config, &args))?;
    print_summary(&summary);
    Ok(())
}

/// Runs the frame loop and returns the accumulated results.
pub async fn simulate(config: GlobeConfig, args: &SimulateArgs) -> Result<SimulationSummary, CliError> {
    let mut globe = Globe::new(config)?;
    let mut summary = SimulationSummary::default();

    if let Some(path) = &args.geojson {
        let layer = globe.add_layer(Layer::new("geojson"));
        for geometry in load_geometries(path)? {
            if globe.add_geometry(layer, geometry, Style::default()).is_some() {
                summary.geometries += 1;
            }
        }
        println!("Loaded {} geometries from {}", summary.geometries, path.display());
    }

    let provider: Arc<dyn ContentProvider> = match &args.url {
        Some(template) => Arc::new(HttpTileProvider::new(template.clone(), args.levels)?),
        None => Arc::new(
            SimulatedProvider::new(args.levels)
                .with_latency(Duration::from_millis(args.latency_ms))
                .with_failure_rate(args.failure_rate),
        ),
    };
    info!(provider = provider.name(), levels = args.levels, "Starting simulation");
    globe.set_provider(Some(provider))?;

    let frame_interval = Duration::from_millis(args.frame_ms);
    let altitude = args.altitude_km * 1000.0;

    for i in 0..args.frames {
        let lon = wrap_longitude(args.lon + args.orbit_step * i as f64);
        let view = camera(globe.crs().as_ref(), lon, args.lat, altitude);
        let report = globe.frame(&view);

        summary.frames += 1;
        if report.skipped {
            summary.skipped += 1;
        }
        summary.stats.accumulate(&report.stats);
        for event in &report.events {
            summary.events += 1;
            println!("[frame {:>5}] {}", report.frame, event);
        }
        if args.report_every > 0 && (i + 1) % args.report_every == 0 {
            println!(
                "[frame {:>5}] lon {:>7.2}  rendered {:>4}  in flight {:>2}  generated {:>5}  failed {:>4}",
                report.frame,
                lon,
                report.stats.rendered,
                report.stats.in_flight,
                summary.stats.generated,
                summary.stats.failed
            );
        }

        if frame_interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(frame_interval).await;
        }
    }

    summary.tiles = globe.tiles().tree().len();
    summary.rendered = globe.tiles().render_set().len();
    summary.render_items = globe.render_items().len();
    summary.base_ready = globe.tiles().is_base_ready();
    globe.destroy();
    Ok(summary)
}

fn camera(crs: &dyn CoordinateSystem, lon: f64, lat: f64, altitude: f64) -> OrbitView {
    if crs.is_flat() {
        OrbitView::flat(crs, lon, lat, altitude)
    } else {
        OrbitView::globe(crs, lon, lat, altitude)
    }
}

/// Longitude folded into `[-180, 180)`.
fn wrap_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

fn print_summary(summary: &SimulationSummary) {
    let stats = &summary.stats;
    println!();
    println!("Simulation Summary");
    println!("==================");
    println!("  Frames:          {} ({} skipped)", summary.frames, summary.skipped);
    println!("  Base layers:     {}", if summary.base_ready { "ready" } else { "not ready" });
    println!("  Events:          {}", summary.events);
    println!();
    println!("  Requested:       {}", stats.requested);
    println!("  Launched:        {}", stats.launched);
    println!("  Deferred:        {}", stats.deferred);
    println!("  Generated:       {}", stats.generated);
    println!("  Failed:          {}", stats.failed);
    println!("  Stale:           {}", stats.stale);
    println!("  Aborted:         {}", stats.aborted);
    println!("  Culled:          {}", stats.culled);
    println!("  Disposed:        {}", stats.disposed);
    println!();
    println!("  Tiles in tree:   {}", summary.tiles);
    println!("  Render set:      {}", summary.rendered);
    println!("  Geometries:      {}", summary.geometries);
    println!("  Render items:    {}", summary.render_items);
}
