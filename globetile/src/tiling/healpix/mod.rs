//! Nested equal-area pixel tiling of the whole sphere.
//!
//! Level zero holds every pixel of the base order (`12 * 4^order` tiles);
//! the children of pixel `p` are pixels `4p .. 4p+3` of the next order.
//!
//! Bounding-box lookups are answered with inclusive polygon queries: the box
//! is cut into slices no wider than [`MAX_SLICE_WIDTH`] degrees, each slice
//! turned into a convex spherical polygon whose great-circle edges are pushed
//! outwards far enough to contain the parallels they replace.

mod base;
mod circle;
mod query;

pub use base::{
    ang2pix, angle, children, compress_bits, fxyf, ilog2, lonlat2ang, lonlat2pix, max_pixrad,
    nest2xyf, npix, nside2order, order2nside, parent, pix2loc, pix2lonlat, pix2vec,
    pixel_resolution_arcsec, pixel_to_uniq, spread_bits, uniq_to_pixel, vec2lonlat, xyf2nest,
    Loc, Xyf, NUM_FACES, ORDER_MAX,
};
pub use circle::CircleFinder;
pub use query::{query_multi_disc, query_polygon, query_polygon_vec, QueryError};

use crate::config::TileConfig;
use crate::crs::CoordinateSystem;
use crate::geo::GeoBound;

use super::{SpatialIndex, TileAddress, TilingError, MAX_LEVEL_ZERO_ORDER};

/// Widest longitude span turned into a single query polygon.
pub const MAX_SLICE_WIDTH: f64 = 30.0;

/// Oversampling factor of the inclusive bounding-box queries.
pub const DEFAULT_OVERSAMPLING: u32 = 4;

/// Tesselation used for nested-pixel tile meshes.
pub const HEALPIX_TESSELATION: usize = 5;

/// Smallest extent given to a degenerate box before querying.
const MIN_EXTENT: f64 = 1e-6;

/// Latitude beyond which a sample is treated as the pole.
const POLE_LATITUDE: f64 = 90.0 - 1e-9;

/// Margin added around sampled pixel bounds so exact vertices stay inside.
const BOUND_PADDING: f64 = 1e-9;

/// Nested-pixel tiling with level zero at a base order.
#[derive(Debug, Clone, PartialEq)]
pub struct HealpixTiling {
    order: u32,
}

impl HealpixTiling {
    /// # Errors
    ///
    /// Returns [`TilingError::OrderTooLarge`] above [`MAX_LEVEL_ZERO_ORDER`].
    pub fn new(order: u32) -> Result<Self, TilingError> {
        if order > MAX_LEVEL_ZERO_ORDER {
            return Err(TilingError::OrderTooLarge(order));
        }
        Ok(Self { order })
    }

    /// Base order of level zero.
    pub fn order(&self) -> u32 {
        self.order
    }

    fn slice_polygons(&self, bbox: &GeoBound) -> Vec<Vec<(f64, f64)>> {
        let mut west = bbox.west;
        let mut east = bbox.east;
        if east - west < MIN_EXTENT {
            west -= MIN_EXTENT;
            east += MIN_EXTENT;
        }
        let mut south = bbox.south.max(-90.0);
        let mut north = bbox.north.min(90.0);
        if north - south < MIN_EXTENT {
            south = (south - MIN_EXTENT).max(-90.0);
            north = (north + MIN_EXTENT).min(90.0);
        }

        let slices = ((east - west) / MAX_SLICE_WIDTH).ceil().max(1.0) as usize;
        let width = (east - west) / slices as f64;

        let mut polygons = Vec::new();
        for k in 0..slices {
            let w = west + k as f64 * width;
            let e = if k + 1 == slices { east } else { w + width };
            let half = ((e - w) * 0.5).to_radians();
            let s = pad_parallel(south, half, false);
            let n = pad_parallel(north, half, true);

            if n >= POLE_LATITUDE && s <= -POLE_LATITUDE {
                polygons.push(vec![(w, 0.0), (e, 0.0), (0.0, 90.0)]);
                polygons.push(vec![(e, 0.0), (w, 0.0), (0.0, -90.0)]);
            } else if n >= POLE_LATITUDE {
                polygons.push(vec![(w, s), (e, s), (0.0, 90.0)]);
            } else if s <= -POLE_LATITUDE {
                polygons.push(vec![(e, n), (w, n), (0.0, -90.0)]);
            } else {
                polygons.push(vec![(w, s), (e, s), (e, n), (w, n)]);
            }
        }
        polygons
    }
}

/// Moves a parallel so that the great circle through its two slice corners
/// still encloses the original parallel.
///
/// Great-circle arcs between two points of equal latitude bulge towards the
/// nearer pole, so only the edge facing the equator needs padding.
fn pad_parallel(lat: f64, half_width: f64, is_north_edge: bool) -> f64 {
    let phi = lat.abs().to_radians();
    let bulge = ((phi.tan() / half_width.cos()).atan() - phi).to_degrees();
    match (is_north_edge, lat < 0.0) {
        // North edge in the southern hemisphere bulges south
        (true, true) => (lat + bulge + MIN_EXTENT).min(90.0),
        // South edge in the northern hemisphere bulges north
        (false, false) if lat > 0.0 => (lat - bulge - MIN_EXTENT).max(-90.0),
        _ => lat,
    }
}

impl SpatialIndex for HealpixTiling {
    fn level_zero(&self) -> Vec<TileAddress> {
        let order = self.order;
        (0..npix(order))
            .map(|pixel| TileAddress::Nested { order, pixel })
            .collect()
    }

    fn locate(&self, lon: f64, lat: f64) -> usize {
        lonlat2pix(self.order, lon, lat) as usize
    }

    fn overlapped(&self, bbox: &GeoBound) -> Vec<usize> {
        if bbox.width() == 0.0 && bbox.height() == 0.0 {
            return vec![self.locate(bbox.west, bbox.south)];
        }

        let mut pixels = Vec::new();
        for polygon in self.slice_polygons(bbox) {
            match query_polygon(&polygon, self.order, DEFAULT_OVERSAMPLING) {
                Ok(found) => pixels.extend(found),
                Err(e) => {
                    tracing::warn!(error = %e, bbox = %bbox, "polygon query failed, using all tiles");
                    return (0..npix(self.order) as usize).collect();
                }
            }
        }
        pixels.sort_unstable();
        pixels.dedup();
        pixels.into_iter().map(|p| p as usize).collect()
    }

    fn bound(&self, address: &TileAddress) -> GeoBound {
        if !matches!(address, TileAddress::Nested { .. }) {
            return GeoBound::WORLD;
        }
        let grid = self.grid(address, 9);
        let mut south = f64::MAX;
        let mut north = f64::MIN;
        let mut west = f64::MAX;
        let mut east = f64::MIN;
        for &(lon, lat) in &grid {
            south = south.min(lat);
            north = north.max(lat);
            if lat.abs() < POLE_LATITUDE {
                west = west.min(lon);
                east = east.max(lon);
            }
        }
        if west > east || east - west > 180.0 {
            west = -180.0;
            east = 180.0;
        }
        GeoBound::new(
            (west - BOUND_PADDING).max(-180.0),
            (south - BOUND_PADDING).max(-90.0),
            (east + BOUND_PADDING).min(180.0),
            (north + BOUND_PADDING).min(90.0),
        )
    }

    fn grid(&self, address: &TileAddress, size: usize) -> Vec<(f64, f64)> {
        let TileAddress::Nested { order, pixel } = *address else {
            return Vec::new();
        };
        let xyf = nest2xyf(pixel, order);
        let nside = order2nside(order) as f64;
        let size = size.max(2);
        let step = 1.0 / (size - 1) as f64;
        let mut points = Vec::with_capacity(size * size);
        for j in 0..size {
            let fx = (xyf.ix as f64 + 1.0 - j as f64 * step) / nside;
            for i in 0..size {
                let fy = (xyf.iy as f64 + 1.0 - i as f64 * step) / nside;
                let (lon, lat) = vec2lonlat(&fxyf(fx, fy, xyf.face));
                let lon = if lon > 180.0 { lon - 360.0 } else { lon };
                points.push((lon, lat));
            }
        }
        points
    }

    fn contains(&self, address: &TileAddress, lon: f64, lat: f64) -> bool {
        match *address {
            TileAddress::Nested { order, pixel } => lonlat2pix(order, lon, lat) == pixel,
            TileAddress::Quad { .. } => false,
        }
    }

    fn child_slot(&self, address: &TileAddress, lon: f64, lat: f64) -> usize {
        match *address {
            TileAddress::Nested { order, .. } => {
                let k = (lonlat2pix(order + 1, lon, lat) & 3) as usize;
                2 * (k & 1) + (k >> 1)
            }
            TileAddress::Quad { .. } => 0,
        }
    }

    fn configure(&self, config: &mut TileConfig, _crs: &dyn CoordinateSystem) {
        config.skirt = false;
        config.cull_sign = -1.0;
        config.tesselation = HEALPIX_TESSELATION;
    }
}
