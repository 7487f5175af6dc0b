//! Spatial indexes that decompose the sphere (or a plane) into tiles.
//!
//! Two interchangeable schemes implement [`SpatialIndex`]:
//!
//! - [`GeoTiling`]: an `nx x ny` lon/lat grid at level zero, each tile split
//!   into four equal lon/lat quadrants
//! - [`HealpixTiling`]: the nested equal-area pixelisation, level zero being
//!   every pixel of a base order and children the four sub-pixels
//!
//! [`Tiling`] wraps either scheme behind one value; [`TilingScheme`] is its
//! serializable description used by configuration.
//!
//! # Example
//!
//! ```
//! use globetile::geo::GeoBound;
//! use globetile::tiling::{SpatialIndex, TilingScheme};
//!
//! let tiling = TilingScheme::default().build().unwrap();
//! assert_eq!(tiling.level_zero().len(), 8);
//!
//! let index = tiling.locate(0.0, 0.0);
//! let bound = tiling.bound(&tiling.level_zero()[index]);
//! assert!(bound.contains(0.0, 0.0));
//! ```

mod geo;
pub mod healpix;

use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TileConfig;
use crate::crs::CoordinateSystem;
use crate::geo::GeoBound;

pub use geo::GeoTiling;
pub use healpix::HealpixTiling;

// =============================================================================
// Constants
// =============================================================================

/// Default level-zero columns of the lon/lat grid.
pub const DEFAULT_GEO_NX: u32 = 4;

/// Default level-zero rows of the lon/lat grid.
pub const DEFAULT_GEO_NY: u32 = 2;

/// Default base order of the nested-pixel scheme.
pub const DEFAULT_HEALPIX_ORDER: u32 = 3;

/// Largest base order accepted for level zero (`12 * 4^13` tiles is already
/// far more than any viewer holds).
pub const MAX_LEVEL_ZERO_ORDER: u32 = 13;

/// Deepest refinement level any scheme addresses. Nested pixels stop at the
/// largest order whose indices fit a `u64`.
pub const MAX_LEVEL: u32 = healpix::ORDER_MAX;

/// Samples per side used to derive a tile's bound and bounding sphere.
const FOOTPRINT_SAMPLES: usize = 9;

// =============================================================================
// Errors
// =============================================================================

/// Invalid tiling parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TilingError {
    #[error("level-zero grid must have at least one column and one row, got {nx}x{ny}")]
    EmptyGrid { nx: u32, ny: u32 },

    #[error("tiling bound {0} has no area")]
    EmptyBound(GeoBound),

    #[error("base order {0} exceeds the maximum of {MAX_LEVEL_ZERO_ORDER}")]
    OrderTooLarge(u32),
}

// =============================================================================
// Addresses
// =============================================================================

/// Identity of a tile within its scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TileAddress {
    /// Lon/lat quadtree cell; `x`/`y` count from the north-west corner at
    /// `level`.
    Quad { level: u32, x: u32, y: u32 },
    /// Nested pixel at `order`.
    Nested { order: u32, pixel: u64 },
}

impl TileAddress {
    /// Child address in slot `slot` (`0`: NW, `1`: NE, `2`: SW, `3`: SE).
    ///
    /// Nested pixels map the same slots to `4p`, `4p+2`, `4p+1`, `4p+3`.
    pub fn child(&self, slot: usize) -> TileAddress {
        let i = (slot & 1) as u32;
        let j = ((slot >> 1) & 1) as u32;
        match *self {
            TileAddress::Quad { level, x, y } => TileAddress::Quad {
                level: level + 1,
                x: 2 * x + i,
                y: 2 * y + j,
            },
            TileAddress::Nested { order, pixel } => TileAddress::Nested {
                order: order + 1,
                pixel: 4 * pixel + 2 * i as u64 + j as u64,
            },
        }
    }

    /// All four children in slot order.
    pub fn children(&self) -> [TileAddress; 4] {
        [self.child(0), self.child(1), self.child(2), self.child(3)]
    }

    /// Refinement depth: the quadtree level or the pixel order.
    pub fn level(&self) -> u32 {
        match *self {
            TileAddress::Quad { level, .. } => level,
            TileAddress::Nested { order, .. } => order,
        }
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileAddress::Quad { level, x, y } => write!(f, "{}/{}/{}", level, x, y),
            TileAddress::Nested { order, pixel } => write!(f, "N{}/{}", order, pixel),
        }
    }
}

/// Geometric summary of a tile used for culling and refinement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileFootprint {
    pub bound: GeoBound,
    /// Center of the tile's bounding sphere in scene coordinates.
    pub center: Vector3<f64>,
    /// Radius of the tile's bounding sphere.
    pub radius: f64,
}

// =============================================================================
// Capability trait
// =============================================================================

/// Operations shared by every tiling scheme.
pub trait SpatialIndex {
    /// Level-zero addresses; the position in the list is the level-zero index.
    fn level_zero(&self) -> Vec<TileAddress>;

    /// Level-zero index of the tile containing a point.
    fn locate(&self, lon: f64, lat: f64) -> usize;

    /// Level-zero indices of every tile a bounding box may overlap.
    ///
    /// The result is conservative: it always contains the true overlap and
    /// may contain extra tiles.
    fn overlapped(&self, bbox: &GeoBound) -> Vec<usize>;

    /// Geographic bound of a tile.
    fn bound(&self, address: &TileAddress) -> GeoBound;

    /// `size x size` grid of `(lon, lat)` positions spanning the tile,
    /// row-major from the north-west corner.
    fn grid(&self, address: &TileAddress, size: usize) -> Vec<(f64, f64)>;

    /// Whether a point lies in the tile.
    fn contains(&self, address: &TileAddress, lon: f64, lat: f64) -> bool;

    /// Child slot of a tile containing a point.
    fn child_slot(&self, address: &TileAddress, lon: f64, lat: f64) -> usize;

    /// Adjusts the tile generation settings for this scheme.
    fn configure(&self, config: &mut TileConfig, crs: &dyn CoordinateSystem);

    /// Bound plus bounding sphere of a tile in the given coordinate system.
    fn footprint(&self, address: &TileAddress, crs: &dyn CoordinateSystem) -> TileFootprint {
        let points: Vec<Vector3<f64>> = self
            .grid(address, FOOTPRINT_SAMPLES)
            .into_iter()
            .map(|(lon, lat)| crs.world_to_3d(lon, lat, 0.0))
            .collect();
        let (center, radius) = bounding_sphere(&points);
        TileFootprint {
            bound: self.bound(address),
            center,
            radius,
        }
    }
}

/// Axis-aligned box center and enclosing radius of a point set.
pub(crate) fn bounding_sphere(points: &[Vector3<f64>]) -> (Vector3<f64>, f64) {
    let Some(first) = points.first() else {
        return (Vector3::zeros(), 0.0);
    };
    let mut min = *first;
    let mut max = *first;
    for p in points {
        min = min.inf(p);
        max = max.sup(p);
    }
    let center = (min + max) * 0.5;
    let radius = points
        .iter()
        .map(|p| (p - center).norm())
        .fold(0.0, f64::max);
    (center, radius)
}

// =============================================================================
// Tagged variants
// =============================================================================

/// One of the supported tiling schemes.
#[derive(Debug, Clone, PartialEq)]
pub enum Tiling {
    Geo(GeoTiling),
    Healpix(HealpixTiling),
}

impl Tiling {
    /// Serializable description of this tiling.
    pub fn scheme(&self) -> TilingScheme {
        match self {
            Tiling::Geo(t) => TilingScheme::Geo {
                nx: t.nx(),
                ny: t.ny(),
                bound: t.geo_bound(),
            },
            Tiling::Healpix(t) => TilingScheme::Healpix { order: t.order() },
        }
    }

    pub fn is_healpix(&self) -> bool {
        matches!(self, Tiling::Healpix(_))
    }

    /// Deepest level whose addresses are representable.
    ///
    /// Quad columns and rows at level `L` stay below `max(nx, ny) * 2^L`,
    /// which must fit a `u32`.
    pub fn max_level(&self) -> u32 {
        match self {
            Tiling::Geo(t) => {
                let cells = t.nx().max(t.ny()).max(1);
                let bits = u32::BITS - (cells - 1).leading_zeros();
                (u32::BITS - bits).min(MAX_LEVEL)
            }
            Tiling::Healpix(_) => MAX_LEVEL,
        }
    }

    fn index(&self) -> &dyn SpatialIndex {
        match self {
            Tiling::Geo(t) => t,
            Tiling::Healpix(t) => t,
        }
    }
}

impl SpatialIndex for Tiling {
    fn level_zero(&self) -> Vec<TileAddress> {
        self.index().level_zero()
    }

    fn locate(&self, lon: f64, lat: f64) -> usize {
        self.index().locate(lon, lat)
    }

    fn overlapped(&self, bbox: &GeoBound) -> Vec<usize> {
        self.index().overlapped(bbox)
    }

    fn bound(&self, address: &TileAddress) -> GeoBound {
        self.index().bound(address)
    }

    fn grid(&self, address: &TileAddress, size: usize) -> Vec<(f64, f64)> {
        self.index().grid(address, size)
    }

    fn contains(&self, address: &TileAddress, lon: f64, lat: f64) -> bool {
        self.index().contains(address, lon, lat)
    }

    fn child_slot(&self, address: &TileAddress, lon: f64, lat: f64) -> usize {
        self.index().child_slot(address, lon, lat)
    }

    fn configure(&self, config: &mut TileConfig, crs: &dyn CoordinateSystem) {
        self.index().configure(config, crs)
    }
}

/// Serializable tiling description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TilingScheme {
    Geo { nx: u32, ny: u32, bound: GeoBound },
    Healpix { order: u32 },
}

impl Default for TilingScheme {
    fn default() -> Self {
        TilingScheme::Geo {
            nx: DEFAULT_GEO_NX,
            ny: DEFAULT_GEO_NY,
            bound: GeoBound::WORLD,
        }
    }
}

impl TilingScheme {
    /// Builds the tiling, validating its parameters.
    pub fn build(&self) -> Result<Tiling, TilingError> {
        match *self {
            TilingScheme::Geo { nx, ny, bound } => Ok(Tiling::Geo(GeoTiling::new(nx, ny, bound)?)),
            TilingScheme::Healpix { order } => Ok(Tiling::Healpix(HealpixTiling::new(order)?)),
        }
    }

    /// Short name used in configuration files.
    pub fn kind(&self) -> &'static str {
        match self {
            TilingScheme::Geo { .. } => "geo",
            TilingScheme::Healpix { .. } => "healpix",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_level_fits_addresses() {
        let default = TilingScheme::default().build().unwrap();
        assert_eq!(default.max_level(), MAX_LEVEL);

        let wide = TilingScheme::Geo {
            nx: 1024,
            ny: 1,
            bound: GeoBound::WORLD,
        }
        .build()
        .unwrap();
        assert_eq!(wide.max_level(), 22);
        // The last column at level 21 still has a representable child.
        let parent = TileAddress::Quad { level: 21, x: u32::MAX / 2, y: 0 };
        assert_eq!(
            parent.child(1),
            TileAddress::Quad { level: 22, x: u32::MAX, y: 0 }
        );

        let nested = TilingScheme::Healpix { order: 3 }.build().unwrap();
        assert_eq!(nested.max_level(), healpix::ORDER_MAX);
    }

    #[test]
    fn test_quad_children_slots() {
        let parent = TileAddress::Quad { level: 2, x: 3, y: 1 };
        assert_eq!(
            parent.children(),
            [
                TileAddress::Quad { level: 3, x: 6, y: 2 },
                TileAddress::Quad { level: 3, x: 7, y: 2 },
                TileAddress::Quad { level: 3, x: 6, y: 3 },
                TileAddress::Quad { level: 3, x: 7, y: 3 },
            ]
        );
    }

    #[test]
    fn test_nested_children_are_four_consecutive_pixels() {
        let parent = TileAddress::Nested { order: 3, pixel: 10 };
        let mut pixels: Vec<u64> = parent
            .children()
            .iter()
            .map(|c| match c {
                TileAddress::Nested { order, pixel } => {
                    assert_eq!(*order, 4);
                    *pixel
                }
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(pixels, vec![40, 42, 41, 43]);
        pixels.sort();
        assert_eq!(pixels, vec![40, 41, 42, 43]);
    }

    #[test]
    fn test_address_display() {
        assert_eq!(TileAddress::Quad { level: 1, x: 2, y: 3 }.to_string(), "1/2/3");
        assert_eq!(TileAddress::Nested { order: 3, pixel: 7 }.to_string(), "N3/7");
    }

    #[test]
    fn test_scheme_build_and_roundtrip() {
        let scheme = TilingScheme::Healpix { order: 2 };
        let tiling = scheme.build().unwrap();
        assert!(tiling.is_healpix());
        assert_eq!(tiling.scheme(), scheme);
        assert_eq!(tiling.level_zero().len(), 192);
    }

    #[test]
    fn test_scheme_rejects_bad_parameters() {
        let bad_grid = TilingScheme::Geo {
            nx: 0,
            ny: 2,
            bound: GeoBound::WORLD,
        };
        assert_eq!(bad_grid.build().unwrap_err(), TilingError::EmptyGrid { nx: 0, ny: 2 });

        let bad_order = TilingScheme::Healpix { order: 14 };
        assert_eq!(bad_order.build().unwrap_err(), TilingError::OrderTooLarge(14));
    }

    #[test]
    fn test_scheme_serde() {
        let json = serde_json::to_string(&TilingScheme::Healpix { order: 3 }).unwrap();
        assert_eq!(json, r#"{"kind":"healpix","order":3}"#);
        let back: TilingScheme = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TilingScheme::Healpix { order: 3 });
    }

    #[test]
    fn test_bounding_sphere_contains_points() {
        let points = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(0.0, 2.0, 0.0),
        ];
        let (center, radius) = bounding_sphere(&points);
        for p in &points {
            assert!((p - center).norm() <= radius + 1e-12);
        }
    }
}
