//! Geographic bounding rectangles.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in longitude/latitude degrees.
///
/// `west <= east` and `south <= north` for every bound produced by this crate;
/// bounds are never wrapped across the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBound {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBound {
    /// The whole sphere, `[-180, -90, 180, 90]`.
    pub const WORLD: GeoBound = GeoBound {
        west: -180.0,
        south: -90.0,
        east: 180.0,
        north: 90.0,
    };

    /// Creates a bound from its four edges.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Creates a degenerate bound covering a single point.
    pub fn from_point(lon: f64, lat: f64) -> Self {
        Self::new(lon, lat, lon, lat)
    }

    /// Longitude extent in degrees.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Latitude extent in degrees.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Center of the rectangle as `(lon, lat)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.west + self.east) * 0.5,
            (self.south + self.north) * 0.5,
        )
    }

    /// True when the rectangle has no area.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Strict overlap test: rectangles that only share an edge do not intersect.
    pub fn intersects(&self, other: &GeoBound) -> bool {
        !(self.west >= other.east
            || self.east <= other.west
            || self.south >= other.north
            || self.north <= other.south)
    }

    /// Inclusive overlap test: shared edges and corners count as intersecting.
    pub fn intersects_inclusive(&self, other: &GeoBound) -> bool {
        !(self.west > other.east
            || self.east < other.west
            || self.south > other.north
            || self.north < other.south)
    }

    /// Inclusive point containment.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }

    /// Grows the rectangle to include a point.
    pub fn extend(&mut self, lon: f64, lat: f64) {
        self.west = self.west.min(lon);
        self.east = self.east.max(lon);
        self.south = self.south.min(lat);
        self.north = self.north.max(lat);
    }

    /// Smallest rectangle containing both bounds.
    pub fn union(&self, other: &GeoBound) -> GeoBound {
        GeoBound::new(
            self.west.min(other.west),
            self.south.min(other.south),
            self.east.max(other.east),
            self.north.max(other.north),
        )
    }
}

impl Default for GeoBound {
    fn default() -> Self {
        Self::WORLD
    }
}

impl std::fmt::Display for GeoBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}, {:.4}, {:.4}]",
            self.west, self.south, self.east, self.north
        )
    }
}
