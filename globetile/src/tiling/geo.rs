//! Lon/lat quadtree tiling.
//!
//! Level zero is an `nx x ny` grid over the tiling bound, numbered row-major
//! from the north-west corner (`row * nx + col`). Every tile is split into
//! four equal lon/lat quadrants.
//!
//! Region lookups are deliberately simple: the corner cells of a bounding box
//! are located and the whole rectangle of cells between them is returned.
//! No wraparound is applied at the antimeridian, so a box widened to the full
//! longitude range by a dateline crossing selects every column.

use crate::config::TileConfig;
use crate::crs::CoordinateSystem;
use crate::geo::GeoBound;

use super::{SpatialIndex, TileAddress, TilingError};

/// Lon/lat grid quadtree.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTiling {
    nx: u32,
    ny: u32,
    bound: GeoBound,
}

impl GeoTiling {
    /// Creates a tiling of `nx x ny` level-zero tiles over `bound`.
    ///
    /// # Errors
    ///
    /// Returns [`TilingError`] for an empty grid or a bound without area.
    pub fn new(nx: u32, ny: u32, bound: GeoBound) -> Result<Self, TilingError> {
        if nx == 0 || ny == 0 {
            return Err(TilingError::EmptyGrid { nx, ny });
        }
        if bound.is_degenerate() {
            return Err(TilingError::EmptyBound(bound));
        }
        Ok(Self { nx, ny, bound })
    }

    pub fn nx(&self) -> u32 {
        self.nx
    }

    pub fn ny(&self) -> u32 {
        self.ny
    }

    /// Bound covered by level zero.
    pub fn geo_bound(&self) -> GeoBound {
        self.bound
    }

    /// Column of a longitude, clamped to the grid.
    pub fn lon_index(&self, lon: f64) -> u32 {
        let t = (lon - self.bound.west) * self.nx as f64 / self.bound.width();
        clamp_index(t, self.nx)
    }

    /// Row of a latitude (0 at the north edge), clamped to the grid.
    pub fn lat_index(&self, lat: f64) -> u32 {
        let t = (self.bound.north - lat) * self.ny as f64 / self.bound.height();
        clamp_index(t, self.ny)
    }

    fn cell_size(&self, level: u32) -> (f64, f64) {
        let scale = (1u64 << level) as f64;
        (
            self.bound.width() / self.nx as f64 / scale,
            self.bound.height() / self.ny as f64 / scale,
        )
    }
}

fn clamp_index(t: f64, n: u32) -> u32 {
    if t.is_nan() || t <= 0.0 {
        0
    } else {
        (t.floor() as u64).min(n as u64 - 1) as u32
    }
}

impl SpatialIndex for GeoTiling {
    fn level_zero(&self) -> Vec<TileAddress> {
        (0..self.ny)
            .flat_map(|y| (0..self.nx).map(move |x| TileAddress::Quad { level: 0, x, y }))
            .collect()
    }

    fn locate(&self, lon: f64, lat: f64) -> usize {
        (self.lat_index(lat) * self.nx + self.lon_index(lon)) as usize
    }

    fn overlapped(&self, bbox: &GeoBound) -> Vec<usize> {
        let (col0, col1) = (self.lon_index(bbox.west), self.lon_index(bbox.east));
        let (row0, row1) = (self.lat_index(bbox.north), self.lat_index(bbox.south));
        let nx = self.nx as usize;
        (row0..=row1)
            .flat_map(|row| (col0..=col1).map(move |col| row as usize * nx + col as usize))
            .collect()
    }

    fn bound(&self, address: &TileAddress) -> GeoBound {
        match *address {
            TileAddress::Quad { level, x, y } => {
                let (sx, sy) = self.cell_size(level);
                GeoBound::new(
                    self.bound.west + x as f64 * sx,
                    self.bound.north - (y + 1) as f64 * sy,
                    self.bound.west + (x + 1) as f64 * sx,
                    self.bound.north - y as f64 * sy,
                )
            }
            TileAddress::Nested { .. } => self.bound,
        }
    }

    fn grid(&self, address: &TileAddress, size: usize) -> Vec<(f64, f64)> {
        let bound = self.bound(address);
        let size = size.max(2);
        let step = 1.0 / (size - 1) as f64;
        let mut points = Vec::with_capacity(size * size);
        for j in 0..size {
            let lat = bound.north - j as f64 * step * bound.height();
            for i in 0..size {
                let lon = bound.west + i as f64 * step * bound.width();
                points.push((lon, lat));
            }
        }
        points
    }

    fn contains(&self, address: &TileAddress, lon: f64, lat: f64) -> bool {
        self.bound(address).contains(lon, lat)
    }

    fn child_slot(&self, address: &TileAddress, lon: f64, lat: f64) -> usize {
        let bound = self.bound(address);
        let u = ((lon - bound.west) / bound.width()).clamp(0.0, 1.0);
        let v = ((bound.north - lat) / bound.height()).clamp(0.0, 1.0);
        let i = if u >= 1.0 { 1 } else { (2.0 * u).floor() as usize };
        let j = if v >= 1.0 { 1 } else { (2.0 * v).floor() as usize };
        j * 2 + i
    }

    fn configure(&self, config: &mut TileConfig, crs: &dyn CoordinateSystem) {
        config.skirt = !crs.is_flat();
        config.cull_sign = 1.0;
    }
}
