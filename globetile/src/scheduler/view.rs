//! What the scheduler needs to know about the camera.
//!
//! The render context decides visibility, refinement and priority. The
//! scheduler only calls the three methods of [`RenderView`] with tiles whose
//! footprint (geographic bound plus bounding sphere) is already computed.
//!
//! [`OrbitView`] is a self-contained implementation for a perspective camera
//! around a globe, inside a sky sphere or above a flat map.

use nalgebra::Vector3;

use crate::crs::CoordinateSystem;
use crate::tile::Tile;

/// Default vertical field of view in degrees.
pub const DEFAULT_FOV_DEGREES: f64 = 45.0;

/// Default viewport size in pixels.
pub const DEFAULT_VIEWPORT: (u32, u32) = (1280, 720);

/// Camera-dependent decisions made during traversal.
pub trait RenderView {
    /// `true` when the tile cannot be seen.
    fn is_culled(&self, tile: &Tile) -> bool;

    /// `true` when the tile covers more screen pixels than its content has.
    fn needs_refinement(&self, tile: &Tile, tile_pixel_size: u32) -> bool;

    /// Priority distance; closer tiles are requested first.
    fn distance(&self, tile: &Tile) -> f64;
}

/// Shape of the surface the camera looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Surface {
    /// Sphere of the given radius seen from outside; tiles beyond the
    /// horizon are culled.
    Globe { radius: f64 },
    /// Sphere seen from inside.
    Sky,
    /// Plane.
    Flat,
}

/// Perspective camera.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitView {
    eye: Vector3<f64>,
    forward: Vector3<f64>,
    fov_y: f64,
    viewport: (u32, u32),
    surface: Surface,
}

impl OrbitView {
    /// Creates a view from an eye position and a viewing direction.
    pub fn new(eye: Vector3<f64>, forward: Vector3<f64>, surface: Surface) -> Self {
        let forward = forward.try_normalize(f64::EPSILON).unwrap_or(-Vector3::z());
        Self {
            eye,
            forward,
            fov_y: DEFAULT_FOV_DEGREES.to_radians(),
            viewport: DEFAULT_VIEWPORT,
            surface,
        }
    }

    /// Camera above `(lon, lat)` at `altitude` meters looking at the
    /// globe center.
    pub fn globe(crs: &dyn CoordinateSystem, lon: f64, lat: f64, altitude: f64) -> Self {
        let eye = crs.world_to_3d(lon, lat, altitude);
        Self::new(
            eye,
            -eye,
            Surface::Globe {
                radius: crs.radius(),
            },
        )
    }

    /// Camera at the sphere center looking towards `(lon, lat)`.
    pub fn sky(crs: &dyn CoordinateSystem, lon: f64, lat: f64) -> Self {
        let target = crs.world_to_3d(lon, lat, 0.0);
        Self::new(Vector3::zeros(), target, Surface::Sky)
    }

    /// Camera above a flat map looking straight down.
    pub fn flat(crs: &dyn CoordinateSystem, lon: f64, lat: f64, altitude: f64) -> Self {
        let eye = crs.world_to_3d(lon, lat, altitude);
        Self::new(eye, -Vector3::z(), Surface::Flat)
    }

    pub fn with_fov_degrees(mut self, fov: f64) -> Self {
        self.fov_y = fov.clamp(1.0, 170.0).to_radians();
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width.max(1), height.max(1));
        self
    }

    pub fn eye(&self) -> Vector3<f64> {
        self.eye
    }

    pub fn forward(&self) -> Vector3<f64> {
        self.forward
    }

    /// Pixels per unit of angular size at distance one.
    fn focal_pixels(&self) -> f64 {
        self.viewport.1 as f64 / (2.0 * (self.fov_y / 2.0).tan())
    }

    /// Half-angle of the cone enclosing the view frustum.
    fn half_diagonal_fov(&self) -> f64 {
        let aspect = self.viewport.0 as f64 / self.viewport.1 as f64;
        ((self.fov_y / 2.0).tan() * (1.0 + aspect * aspect).sqrt()).atan()
    }

    fn beyond_horizon(&self, center: &Vector3<f64>, radius: f64, planet: f64) -> bool {
        let eye_distance = self.eye.norm();
        if eye_distance <= planet {
            return false;
        }
        center.dot(&self.eye) + radius * eye_distance < planet * planet
    }

    fn outside_cone(&self, center: &Vector3<f64>, radius: f64) -> bool {
        let to_center = center - self.eye;
        let distance = to_center.norm();
        if distance <= radius {
            return false;
        }
        let cos_angle = (to_center.dot(&self.forward) / distance).clamp(-1.0, 1.0);
        let angle = cos_angle.acos();
        let spread = (radius / distance).asin();
        angle - spread > self.half_diagonal_fov()
    }
}

impl RenderView for OrbitView {
    fn is_culled(&self, tile: &Tile) -> bool {
        let footprint = tile.footprint();
        if let Surface::Globe { radius } = self.surface {
            if self.beyond_horizon(&footprint.center, footprint.radius, radius) {
                return true;
            }
        }
        self.outside_cone(&footprint.center, footprint.radius)
    }

    fn needs_refinement(&self, tile: &Tile, tile_pixel_size: u32) -> bool {
        let footprint = tile.footprint();
        let distance = ((footprint.center - self.eye).norm() - footprint.radius).max(1e-9);
        let projected = 2.0 * footprint.radius / distance * self.focal_pixels();
        projected > tile_pixel_size as f64
    }

    fn distance(&self, tile: &Tile) -> f64 {
        (tile.footprint().center - self.eye).norm()
    }
}

/// View accepting every tile not explicitly culled and refining down to a
/// fixed level.
#[cfg(test)]
pub(crate) struct LevelView {
    pub refine_to: u32,
    pub culled: Vec<crate::tiling::TileAddress>,
}

#[cfg(test)]
impl LevelView {
    pub fn new(refine_to: u32) -> Self {
        Self {
            refine_to,
            culled: Vec::new(),
        }
    }
}

#[cfg(test)]
impl RenderView for LevelView {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::{PlateCarreeCrs, SphericalCrs, EARTH_RADIUS_METERS};
    use crate::tiling::{SpatialIndex, TileAddress, TilingScheme};

    fn level_zero_tile(x: u32, y: u32) -> Tile {
        tile_at(0, x, y)
    }

    fn tile_at(level: u32, x: u32, y: u32) -> Tile {
        let tiling = TilingScheme::default().build().unwrap();
        let address = TileAddress::Quad { level, x, y };
        let footprint = tiling.footprint(&address, &SphericalCrs::wgs84());
        Tile::new(address, footprint, None)
    }

    #[test]
    fn test_globe_view_culls_far_side() {
        let crs = SphericalCrs::wgs84();
        let view = OrbitView::globe(&crs, 45.0, 45.0, 2.0 * EARTH_RADIUS_METERS);
        // Tile under the camera: lon 0..90, lat 0..90.
        assert!(!view.is_culled(&level_zero_tile(2, 0)));
        // Antipodal tile: lon -180..-90, lat -90..0.
        assert!(view.is_culled(&level_zero_tile(0, 1)));
    }

    #[test]
    fn test_sky_view_culls_behind() {
        let crs = SphericalCrs::equatorial();
        let view = OrbitView::sky(&crs, 45.0, 45.0);
        // lon 45..90, lat 0..45
        assert!(!view.is_culled(&tile_at(1, 5, 1)));
        // lon -180..-135, lat -45..0
        assert!(view.is_culled(&tile_at(1, 0, 2)));
    }

    #[test]
    fn test_refinement_depends_on_distance() {
        let crs = SphericalCrs::wgs84();
        let tile = level_zero_tile(2, 0);
        let near = OrbitView::globe(&crs, 45.0, 45.0, 0.2 * EARTH_RADIUS_METERS);
        let far = OrbitView::globe(&crs, 45.0, 45.0, 50.0 * EARTH_RADIUS_METERS);
        assert!(near.needs_refinement(&tile, 256));
        assert!(!far.needs_refinement(&tile, 256));
    }

    #[test]
    fn test_distance_orders_tiles() {
        let crs = SphericalCrs::wgs84();
        let view = OrbitView::globe(&crs, 45.0, 45.0, EARTH_RADIUS_METERS);
        assert!(view.distance(&level_zero_tile(2, 0)) < view.distance(&level_zero_tile(0, 1)));
    }

    #[test]
    fn test_flat_view_looks_down() {
        let crs = PlateCarreeCrs::default();
        let view = OrbitView::flat(&crs, 10.0, 10.0, EARTH_RADIUS_METERS);
        assert_eq!(view.forward(), -Vector3::z());
        assert!(view.eye().z > 0.0);
    }

    #[test]
    fn test_degenerate_forward_defaults_down() {
        let view = OrbitView::new(Vector3::zeros(), Vector3::zeros(), Surface::Sky);
        assert_eq!(view.forward(), -Vector3::z());
    }
}
