//! Coordinate systems used by the tiling core.
//!
//! The tiling core only needs a handful of operations from a coordinate
//! system: converting a geographic position to a 3D position and back, the
//! covered geographic bound, and whether the surface is a sphere or a plane.
//!
//! # Implementations
//!
//! - [`SphericalCrs`]: a sphere (planet seen from outside, or sky seen from inside)
//! - [`PlateCarreeCrs`]: an equirectangular plane

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::geo::GeoBound;

// =============================================================================
// Constants
// =============================================================================

/// Internal sphere radius in scene units.
pub const DEFAULT_RADIUS: f64 = 1.0;

/// Real Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// Longitude convention applied after a 3D to geographic conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongitudeConvention {
    /// Longitudes in `[-180, 180]`.
    Signed,
    /// Longitudes in `[0, 360)`, as used by celestial coordinates.
    Positive,
}

/// Radius and height scaling of the rendered body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geoide {
    radius: f64,
    real_planet_radius: f64,
}

impl Geoide {
    /// Creates a geoide.
    ///
    /// # Arguments
    ///
    /// * `radius` - Radius in scene units
    /// * `real_planet_radius` - Physical radius in meters, used to scale heights
    pub fn new(radius: f64, real_planet_radius: f64) -> Self {
        Self {
            radius,
            real_planet_radius,
        }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn real_planet_radius(&self) -> f64 {
        self.real_planet_radius
    }

    /// Factor converting meters into scene units.
    pub fn height_scale(&self) -> f64 {
        1.0 / self.real_planet_radius
    }
}

impl Default for Geoide {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS, EARTH_RADIUS_METERS)
    }
}

/// Geographic to 3D conversions needed by tiles, culling and refinement.
pub trait CoordinateSystem: Send + Sync + fmt::Debug {
    /// Short identifier, e.g. `"WGS84"`.
    fn name(&self) -> &str;

    /// Converts `(lon, lat, height_meters)` to a 3D scene position.
    fn world_to_3d(&self, lon: f64, lat: f64, height: f64) -> Vector3<f64>;

    /// Converts a 3D scene position back to `(lon, lat, height_meters)`.
    fn world_from_3d(&self, position: &Vector3<f64>) -> (f64, f64, f64);

    /// Geographic extent covered by the coordinate system.
    fn geo_bound(&self) -> GeoBound;

    /// True for projected planes.
    fn is_flat(&self) -> bool;

    fn geoide(&self) -> &Geoide;

    fn radius(&self) -> f64 {
        self.geoide().radius()
    }

    fn height_scale(&self) -> f64 {
        self.geoide().height_scale()
    }
}

// =============================================================================
// Spherical
// =============================================================================

/// Sphere centered on the origin; longitude 0 points along +X, the north
/// pole along +Z.
#[derive(Debug, Clone)]
pub struct SphericalCrs {
    name: String,
    geoide: Geoide,
    convention: LongitudeConvention,
}

impl SphericalCrs {
    pub fn new(name: impl Into<String>, geoide: Geoide, convention: LongitudeConvention) -> Self {
        Self {
            name: name.into(),
            geoide,
            convention,
        }
    }

    /// Planet-style coordinates with signed longitudes.
    pub fn wgs84() -> Self {
        Self::new("WGS84", Geoide::default(), LongitudeConvention::Signed)
    }

    /// Celestial equatorial coordinates with right ascension in `[0, 360)`.
    pub fn equatorial() -> Self {
        Self::new("Equatorial", Geoide::default(), LongitudeConvention::Positive)
    }
}

impl CoordinateSystem for SphericalCrs {
    fn name(&self) -> &str {
        &self.name
    }

    fn world_to_3d(&self, lon: f64, lat: f64, height: f64) -> Vector3<f64> {
        let lon = if lon > 180.0 { lon - 360.0 } else { lon };
        let (lon, lat) = (lon.to_radians(), lat.to_radians());
        let radius = self.geoide.radius() + height * self.geoide.height_scale();
        let cos_lat = lat.cos();
        Vector3::new(
            radius * lon.cos() * cos_lat,
            radius * lon.sin() * cos_lat,
            radius * lat.sin(),
        )
    }

    fn world_from_3d(&self, position: &Vector3<f64>) -> (f64, f64, f64) {
        let r = position.norm();
        if r == 0.0 {
            return (0.0, 0.0, -self.geoide.real_planet_radius());
        }
        let mut lon = (position.y / r).atan2(position.x / r).to_degrees();
        let lat = (position.z / r).clamp(-1.0, 1.0).asin().to_degrees();
        if self.convention == LongitudeConvention::Positive && lon < 0.0 {
            lon += 360.0;
        }
        let height = self.geoide.real_planet_radius() * (r - self.geoide.radius());
        (lon, lat, height)
    }

    fn geo_bound(&self) -> GeoBound {
        GeoBound::WORLD
    }

    fn is_flat(&self) -> bool {
        false
    }

    fn geoide(&self) -> &Geoide {
        &self.geoide
    }
}

// =============================================================================
// Plate carree
// =============================================================================

/// Equirectangular plane: X grows with longitude, Y with latitude, Z is height.
#[derive(Debug, Clone)]
pub struct PlateCarreeCrs {
    geoide: Geoide,
    bound: GeoBound,
}

impl PlateCarreeCrs {
    pub fn new(geoide: Geoide, bound: GeoBound) -> Self {
        Self { geoide, bound }
    }
}

impl Default for PlateCarreeCrs {
    fn default() -> Self {
        Self::new(Geoide::default(), GeoBound::WORLD)
    }
}

impl CoordinateSystem for PlateCarreeCrs {
    fn name(&self) -> &str {
        "PlateCarree"
    }

    fn world_to_3d(&self, lon: f64, lat: f64, height: f64) -> Vector3<f64> {
        let r = self.geoide.radius();
        Vector3::new(
            r * lon.to_radians(),
            r * lat.to_radians(),
            height * self.geoide.height_scale(),
        )
    }

    fn world_from_3d(&self, position: &Vector3<f64>) -> (f64, f64, f64) {
        let r = self.geoide.radius();
        (
            (position.x / r).to_degrees(),
            (position.y / r).to_degrees(),
            position.z / self.geoide.height_scale(),
        )
    }

    fn geo_bound(&self) -> GeoBound {
        self.bound
    }

    fn is_flat(&self) -> bool {
        true
    }

    fn geoide(&self) -> &Geoide {
        &self.geoide
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Coordinate system selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrsKind {
    #[default]
    Wgs84,
    Equatorial,
    PlateCarree,
}

impl CrsKind {
    /// Instantiates the coordinate system.
    pub fn build(&self) -> Arc<dyn CoordinateSystem> {
        match self {
            CrsKind::Wgs84 => Arc::new(SphericalCrs::wgs84()),
            CrsKind::Equatorial => Arc::new(SphericalCrs::equatorial()),
            CrsKind::PlateCarree => Arc::new(PlateCarreeCrs::default()),
        }
    }

    /// Name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            CrsKind::Wgs84 => "wgs84",
            CrsKind::Equatorial => "equatorial",
            CrsKind::PlateCarree => "platecarree",
        }
    }
}

impl fmt::Display for CrsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrsKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wgs84" => Ok(CrsKind::Wgs84),
            "equatorial" => Ok(CrsKind::Equatorial),
            "platecarree" | "plate_carree" => Ok(CrsKind::PlateCarree),
            other => Err(format!("unknown coordinate system '{}'", other)),
        }
    }
}
