//! GeoJSON geometries and the bounding logic used to bind them to tiles.
//!
//! Geometries deserialize directly from GeoJSON geometry objects:
//!
//! ```
//! use globetile::geo::Geometry;
//!
//! let json = r#"{"type":"LineString","coordinates":[[0.0,0.0],[10.0,5.0]]}"#;
//! let line: Geometry = serde_json::from_str(json).unwrap();
//! let bbox = line.bbox().unwrap();
//! assert_eq!(bbox.east, 10.0);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::GeoBound;

/// A GeoJSON position: `[lon, lat]` with an optional altitude.
pub type Position = Vec<f64>;

/// Rejection reasons for malformed input geometries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("geometry has no coordinates")]
    Empty,

    #[error("position must have at least two components, got {0}")]
    ShortPosition(usize),

    #[error("position contains a non-finite component")]
    NonFinite,

    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),
}

/// Input feature geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

/// Two consecutive longitudes more than half a turn apart are taken as a
/// dateline crossing.
pub fn is_cross_dateline(lon1: f64, lon2: f64) -> bool {
    let delta = (lon2 - lon1).abs();
    delta > 180.0 && delta < 360.0
}

impl Geometry {
    /// GeoJSON type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// True for `Point` and `MultiPoint`.
    pub fn is_point_like(&self) -> bool {
        matches!(self, Geometry::Point(_) | Geometry::MultiPoint(_))
    }

    /// Every coordinate sequence of the geometry (lines, rings, or points).
    pub fn parts(&self) -> Vec<&[Position]> {
        match self {
            Geometry::Point(p) => vec![std::slice::from_ref(p)],
            Geometry::MultiPoint(points) | Geometry::LineString(points) => vec![points.as_slice()],
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                lines.iter().map(|l| l.as_slice()).collect()
            }
            Geometry::MultiPolygon(polygons) => polygons
                .iter()
                .flat_map(|rings| rings.iter().map(|r| r.as_slice()))
                .collect(),
        }
    }

    /// Sequences that define the extent: outer rings only for polygons.
    fn outer_parts(&self) -> Vec<&[Position]> {
        match self {
            Geometry::Polygon(rings) => rings.first().map(|r| r.as_slice()).into_iter().collect(),
            Geometry::MultiPolygon(polygons) => polygons
                .iter()
                .filter_map(|rings| rings.first().map(|r| r.as_slice()))
                .collect(),
            _ => self.parts(),
        }
    }

    /// Checks that the geometry can be bound to tiles.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let parts = self.parts();
        if parts.is_empty() || parts.iter().all(|p| p.is_empty()) {
            return Err(GeometryError::Empty);
        }
        for position in parts.iter().flat_map(|p| p.iter()) {
            if position.len() < 2 {
                return Err(GeometryError::ShortPosition(position.len()));
            }
            if position.iter().any(|c| !c.is_finite()) {
                return Err(GeometryError::NonFinite);
            }
            if !(-90.0..=90.0).contains(&position[1]) {
                return Err(GeometryError::LatitudeOutOfRange(position[1]));
            }
        }
        Ok(())
    }

    /// Bounding rectangle of the geometry.
    ///
    /// Lines and rings whose consecutive vertices jump across the dateline widen
    /// the longitude range to the full `[-180, 180]`. Multi-points never do.
    pub fn bbox(&self) -> Result<GeoBound, GeometryError> {
        self.validate()?;

        let check_dateline = !matches!(self, Geometry::MultiPoint(_));
        let mut bound: Option<GeoBound> = None;
        let mut crosses = false;

        for part in self.outer_parts() {
            for (i, position) in part.iter().enumerate() {
                match bound.as_mut() {
                    Some(b) => b.extend(position[0], position[1]),
                    None => bound = Some(GeoBound::from_point(position[0], position[1])),
                }
                if check_dateline && i > 0 && is_cross_dateline(part[i - 1][0], position[0]) {
                    crosses = true;
                }
            }
        }

        let mut bound = bound.ok_or(GeometryError::Empty)?;
        if crosses {
            bound.west = -180.0;
            bound.east = 180.0;
        }
        Ok(bound)
    }

    /// Whether the geometry touches a tile bound.
    ///
    /// Points use inclusive containment; lines and rings compare their own
    /// bounding rectangles with a strict overlap test.
    pub fn intersects_bound(&self, bound: &GeoBound) -> bool {
        if self.is_point_like() {
            return self
                .parts()
                .iter()
                .flat_map(|p| p.iter())
                .any(|p| p.len() >= 2 && bound.contains(p[0], p[1]));
        }

        self.parts().iter().any(|part| match part_bound(part) {
            Some(b) => b.intersects(bound),
            None => false,
        })
    }
}

fn part_bound(part: &[Position]) -> Option<GeoBound> {
    let mut iter = part.iter().filter(|p| p.len() >= 2);
    let first = iter.next()?;
    let mut bound = GeoBound::from_point(first[0], first[1]);
    let mut previous = first[0];
    let mut crosses = false;
    for p in iter {
        bound.extend(p[0], p[1]);
        crosses |= is_cross_dateline(previous, p[0]);
        previous = p[0];
    }
    if crosses {
        bound.west = -180.0;
        bound.east = 180.0;
    }
    Some(bound)
}
