//! Geographic primitives: bounding rectangles and input geometries.
//!
//! All coordinates are `(longitude, latitude)` in degrees.

mod bound;
mod geometry;

pub use bound::GeoBound;
pub use geometry::{is_cross_dateline, Geometry, GeometryError, Position};
