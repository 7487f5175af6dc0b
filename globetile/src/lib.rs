//! globetile - spatial tiling and tile-request scheduling for virtual globes.
//!
//! The crate decomposes a sphere (or a flat projection) into a hierarchy of
//! tiles, decides every frame which tiles the current view needs, fetches
//! their content asynchronously under bounded concurrency and attaches
//! vector geometries to the tiles they overlap.
//!
//! # Modules
//!
//! - [`tiling`]: lon/lat quadtree and nested equal-area pixel schemes
//! - [`tile`]: tile nodes, lifecycle and the tile arena
//! - [`scheduler`]: per-frame traversal, request pool and events
//! - [`provider`]: tile content sources
//! - [`vector`]: geometry to tile attachment
//! - [`globe`]: the object tying it all together
//!
//! Supporting modules: [`geo`], [`crs`], [`config`], [`logging`], [`error`].

pub mod config;
pub mod crs;
pub mod error;
pub mod geo;
pub mod globe;
pub mod logging;
pub mod provider;
pub mod scheduler;
pub mod tile;
pub mod tiling;
pub mod vector;

pub use error::GlobeError;
pub use globe::Globe;
