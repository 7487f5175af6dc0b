//! Smallest enclosing circle of a set of points on the unit sphere.

use nalgebra::Vector3;

/// Finds a small circle containing every input point.
///
/// The result is exact for the minimal enclosing circle when the points lie
/// within a hemisphere, which is always the case for the convex polygons
/// handed to the region queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleFinder {
    center: Vector3<f64>,
    cos_rad: f64,
}

impl CircleFinder {
    /// Returns `None` for fewer than two points.
    pub fn new(points: &[Vector3<f64>]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let center = (points[0] + points[1]).normalize();
        let mut finder = Self {
            center,
            cos_rad: points[0].dot(&center),
        };
        for i in 2..points.len() {
            if points[i].dot(&finder.center) < finder.cos_rad {
                finder.circle_through(points, i);
            }
        }
        Some(finder)
    }

    fn circle_through(&mut self, points: &[Vector3<f64>], q: usize) {
        self.center = (points[0] + points[q]).normalize();
        self.cos_rad = points[0].dot(&self.center);
        for i in 1..q {
            if points[i].dot(&self.center) < self.cos_rad {
                self.circle_through_pair(points, i, q);
            }
        }
    }

    fn circle_through_pair(&mut self, points: &[Vector3<f64>], q1: usize, q2: usize) {
        self.center = (points[q1] + points[q2]).normalize();
        self.cos_rad = points[q1].dot(&self.center);
        for i in 0..q1 {
            if points[i].dot(&self.center) < self.cos_rad {
                self.center = (points[q1] - points[i])
                    .cross(&(points[q2] - points[i]))
                    .normalize();
                self.cos_rad = points[i].dot(&self.center);
                if self.cos_rad < 0.0 {
                    self.center = -self.center;
                    self.cos_rad = -self.cos_rad;
                }
            }
        }
    }

    /// Unit vector of the circle center.
    pub fn center(&self) -> Vector3<f64> {
        self.center
    }

    /// Cosine of the angular radius.
    pub fn cos_rad(&self) -> f64 {
        self.cos_rad
    }

    /// Angular radius in radians.
    pub fn radius(&self) -> f64 {
        self.cos_rad.clamp(-1.0, 1.0).acos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit(lon: f64, lat: f64) -> Vector3<f64> {
        let (lon, lat) = (lon.to_radians(), lat.to_radians());
        Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
    }

    #[test]
    fn test_too_few_points() {
        assert!(CircleFinder::new(&[unit(0.0, 0.0)]).is_none());
    }

    #[test]
    fn test_two_points_midpoint() {
        let cf = CircleFinder::new(&[unit(-10.0, 0.0), unit(10.0, 0.0)]).unwrap();
        assert_relative_eq!(cf.center(), unit(0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(cf.radius(), 10f64.to_radians(), epsilon = 1e-12);
    }

    #[test]
    fn test_circle_contains_all_points() {
        let points = vec![
            unit(0.0, 0.0),
            unit(20.0, 5.0),
            unit(5.0, 25.0),
            unit(-3.0, 12.0),
            unit(14.0, -8.0),
        ];
        let cf = CircleFinder::new(&points).unwrap();
        for p in &points {
            assert!(p.dot(&cf.center()) >= cf.cos_rad() - 1e-12);
        }
    }
}
