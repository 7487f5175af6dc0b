//! Tile vertex grids.
//!
//! A mesh is a `size x size` vertex grid laid out row-major from the
//! north-west corner, stored relative to the tile center so that single
//! precision is enough on the GPU side. Optional skirts hang one extra ring
//! of vertices below the tile edges to hide cracks between levels.

use nalgebra::Vector3;
use tracing::warn;

use crate::config::TileConfig;
use crate::crs::CoordinateSystem;
use crate::tiling::{SpatialIndex, TileAddress, Tiling};

/// Skirt depth as a fraction of the tile bounding radius.
const SKIRT_RATIO: f64 = 0.05;

/// Generated geometry of a tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMesh {
    size: usize,
    center: Vector3<f64>,
    vertices: Vec<Vector3<f32>>,
    lonlat: Vec<(f64, f64)>,
    heights: Option<Vec<f32>>,
    indices: Vec<u32>,
    skirt_vertices: usize,
}

impl TileMesh {
    /// Builds the mesh of a tile.
    ///
    /// # Arguments
    ///
    /// * `tiling` - Scheme the address belongs to
    /// * `address` - Tile to build
    /// * `crs` - Coordinate system used to place vertices
    /// * `config` - Tesselation, skirt and winding settings
    /// * `center` - Tile center; vertices are stored relative to it
    /// * `radius` - Bounding radius, scales the skirt
    /// * `elevations` - Heights in meters, one per grid vertex
    pub fn build(
        tiling: &Tiling,
        address: &TileAddress,
        crs: &dyn CoordinateSystem,
        config: &TileConfig,
        center: Vector3<f64>,
        radius: f64,
        elevations: Option<&[f32]>,
    ) -> Self {
        let size = config.tesselation.max(2);
        let lonlat = tiling.grid(address, size);

        let heights = match elevations {
            Some(h) if h.len() == lonlat.len() => Some(h.to_vec()),
            Some(h) => {
                warn!(
                    tile = %address,
                    expected = lonlat.len(),
                    got = h.len(),
                    "Ignoring elevation grid of wrong size"
                );
                None
            }
            None => None,
        };

        let height_at = |k: usize| heights.as_ref().map_or(0.0, |h| h[k] as f64);
        let mut vertices: Vec<Vector3<f32>> = lonlat
            .iter()
            .enumerate()
            .map(|(k, &(lon, lat))| (crs.world_to_3d(lon, lat, height_at(k)) - center).cast())
            .collect();

        let mut indices = grid_indices(size, config.cull_sign < 0.0);

        let mut skirt_vertices = 0;
        if config.skirt {
            let depth = radius * SKIRT_RATIO / crs.height_scale();
            let ring = edge_ring(size);
            let base = vertices.len() as u32;
            for &k in &ring {
                let (lon, lat) = lonlat[k];
                vertices.push((crs.world_to_3d(lon, lat, height_at(k) - depth) - center).cast());
            }
            skirt_vertices = ring.len();
            let n = ring.len();
            for r in 0..n {
                let (a, b) = (ring[r] as u32, ring[(r + 1) % n] as u32);
                let (sa, sb) = (base + r as u32, base + ((r + 1) % n) as u32);
                indices.extend_from_slice(&[a, sa, b, b, sa, sb]);
            }
        }

        Self {
            size,
            center,
            vertices,
            lonlat,
            heights,
            indices,
            skirt_vertices,
        }
    }

    /// Vertices per side.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn center(&self) -> Vector3<f64> {
        self.center
    }

    /// Vertex positions relative to [`TileMesh::center`], skirt last.
    pub fn vertices(&self) -> &[Vector3<f32>] {
        &self.vertices
    }

    /// Triangle list indexing [`TileMesh::vertices`].
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn skirt_vertex_count(&self) -> usize {
        self.skirt_vertices
    }

    pub fn heights(&self) -> Option<&[f32]> {
        self.heights.as_deref()
    }

    /// Geographic position of grid vertex `(i, j)`.
    pub fn lonlat(&self, i: usize, j: usize) -> Option<(f64, f64)> {
        (i < self.size && j < self.size).then(|| self.lonlat[j * self.size + i])
    }

    /// Bilinear height at fractional grid coordinates `u` (west to east) and
    /// `v` (north to south), both in `[0, 1]`.
    pub fn height_at_uv(&self, u: f64, v: f64) -> f64 {
        let Some(heights) = &self.heights else {
            return 0.0;
        };
        let max = (self.size - 1) as f64;
        let x = u.clamp(0.0, 1.0) * max;
        let y = v.clamp(0.0, 1.0) * max;
        let (i0, j0) = (x.floor() as usize, y.floor() as usize);
        let (i1, j1) = ((i0 + 1).min(self.size - 1), (j0 + 1).min(self.size - 1));
        let (fx, fy) = (x - i0 as f64, y - j0 as f64);
        let h = |i: usize, j: usize| heights[j * self.size + i] as f64;
        let top = h(i0, j0) * (1.0 - fx) + h(i1, j0) * fx;
        let bottom = h(i0, j1) * (1.0 - fx) + h(i1, j1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Height of the grid vertex closest to a point.
    pub fn nearest_height(&self, lon: f64, lat: f64) -> f64 {
        let Some(heights) = &self.heights else {
            return 0.0;
        };
        self.lonlat
            .iter()
            .zip(heights)
            .min_by(|(a, _), (b, _)| {
                let da = (a.0 - lon).powi(2) + (a.1 - lat).powi(2);
                let db = (b.0 - lon).powi(2) + (b.1 - lat).powi(2);
                da.total_cmp(&db)
            })
            .map_or(0.0, |(_, h)| *h as f64)
    }
}

fn grid_indices(size: usize, flip: bool) -> Vec<u32> {
    let mut indices = Vec::with_capacity((size - 1) * (size - 1) * 6);
    for j in 0..size - 1 {
        for i in 0..size - 1 {
            let a = (j * size + i) as u32;
            let b = a + 1;
            let c = a + size as u32;
            let d = c + 1;
            if flip {
                indices.extend_from_slice(&[a, b, c, c, b, d]);
            } else {
                indices.extend_from_slice(&[a, c, b, b, c, d]);
            }
        }
    }
    indices
}

/// Grid indices of the border, clockwise from the north-west corner.
fn edge_ring(size: usize) -> Vec<usize> {
    let last = size - 1;
    let mut ring = Vec::with_capacity(4 * last);
    ring.extend(0..last);
    ring.extend((0..last).map(|j| j * size + last));
    ring.extend((1..=last).rev().map(|i| last * size + i));
    ring.extend((1..=last).rev().map(|j| j * size));
    ring
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::{PlateCarreeCrs, SphericalCrs};
    use crate::tiling::TilingScheme;
    use approx::assert_relative_eq;

    fn build(config: &TileConfig, elevations: Option<&[f32]>) -> TileMesh {
        let tiling = TilingScheme::default().build().unwrap();
        let crs = SphericalCrs::wgs84();
        let address = TileAddress::Quad { level: 0, x: 2, y: 0 };
        let footprint = tiling.footprint(&address, &crs);
        TileMesh::build(
            &tiling,
            &address,
            &crs,
            config,
            footprint.center,
            footprint.radius,
            elevations,
        )
    }

    #[test]
    fn test_grid_without_skirt() {
        let config = TileConfig {
            skirt: false,
            ..TileConfig::default().with_tesselation(3)
        };
        let mesh = build(&config, None);
        assert_eq!(mesh.vertices().len(), 9);
        assert_eq!(mesh.indices().len(), 4 * 6);
        assert_eq!(mesh.skirt_vertex_count(), 0);
        assert_eq!(mesh.lonlat(0, 0), Some((0.0, 90.0)));
        assert_eq!(mesh.lonlat(2, 2), Some((90.0, 0.0)));
        assert_eq!(mesh.lonlat(3, 0), None);
    }

    #[test]
    fn test_skirt_adds_edge_ring() {
        let config = TileConfig::default().with_tesselation(4);
        let mesh = build(&config, None);
        assert_eq!(mesh.skirt_vertex_count(), 12);
        assert_eq!(mesh.vertices().len(), 16 + 12);
        assert_eq!(mesh.indices().len(), 9 * 6 + 12 * 6);
        assert!(mesh.indices().iter().all(|&i| (i as usize) < mesh.vertices().len()));
    }

    #[test]
    fn test_vertices_are_relative_to_center() {
        let config = TileConfig {
            skirt: false,
            ..TileConfig::default().with_tesselation(3)
        };
        let mesh = build(&config, None);
        let corner = mesh.center() + mesh.vertices()[8].cast::<f64>();
        assert_relative_eq!(corner, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_flipped_winding() {
        assert_eq!(grid_indices(2, false), vec![0, 2, 1, 1, 2, 3]);
        assert_eq!(grid_indices(2, true), vec![0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn test_edge_ring_visits_each_border_vertex_once() {
        let mut ring = edge_ring(4);
        ring.sort_unstable();
        assert_eq!(ring, vec![0, 1, 2, 3, 4, 7, 8, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn test_height_sampling() {
        let config = TileConfig {
            skirt: false,
            ..TileConfig::default().with_tesselation(2)
        };
        let mesh = build(&config, Some(&[0.0, 100.0, 200.0, 300.0]));
        assert_relative_eq!(mesh.height_at_uv(0.0, 0.0), 0.0);
        assert_relative_eq!(mesh.height_at_uv(1.0, 1.0), 300.0);
        assert_relative_eq!(mesh.height_at_uv(0.5, 0.5), 150.0);
        assert_relative_eq!(mesh.nearest_height(89.0, 1.0), 300.0);
    }

    #[test]
    fn test_wrong_elevation_size_is_ignored() {
        let config = TileConfig::default().with_tesselation(3);
        let mesh = build(&config, Some(&[1.0, 2.0]));
        assert!(mesh.heights().is_none());
        assert_eq!(mesh.height_at_uv(0.5, 0.5), 0.0);
    }

    #[test]
    fn test_flat_mesh_heights_move_along_z() {
        let tiling = TilingScheme::default().build().unwrap();
        let crs = PlateCarreeCrs::default();
        let address = TileAddress::Quad { level: 0, x: 0, y: 0 };
        let config = TileConfig {
            skirt: false,
            ..TileConfig::default().with_tesselation(2)
        };
        let mesh = TileMesh::build(
            &tiling,
            &address,
            &crs,
            &config,
            Vector3::zeros(),
            1.0,
            Some(&[0.0, 0.0, 0.0, 6_378_137.0]),
        );
        assert_relative_eq!(mesh.vertices()[3].z, 1.0, epsilon = 1e-6);
    }
}
