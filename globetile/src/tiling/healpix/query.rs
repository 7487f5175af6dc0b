//! Region queries: which pixels does a convex spherical polygon touch?
//!
//! A polygon is described as the intersection of discs: one hemisphere per
//! edge (bounded by the great circle through the edge) and, for inclusive
//! queries, the polygon's enclosing small circle. The pixel hierarchy is then
//! walked from the 12 base pixels with an explicit stack. Each candidate's
//! center is classified against every disc using the order's maximum pixel
//! radius as a safety margin:
//!
//! - zone 0: certainly outside, dropped
//! - zone 1: within the safety margin of the boundary
//! - zone 2: center inside the shape
//! - zone 3: certainly fully inside
//!
//! Fully-inside pixels above the target order are emitted as a whole range of
//! descendants. Inclusive queries may descend below the target order
//! (oversampling) to decide boundary pixels more precisely, and then emit the
//! ancestor at the target order.
//!
//! # Example
//!
//! ```
//! use globetile::tiling::healpix::query_polygon;
//!
//! let square = [(10.0, 10.0), (20.0, 10.0), (20.0, 20.0), (10.0, 20.0)];
//! let pixels = query_polygon(&square, 3, 4).unwrap();
//! assert!(!pixels.is_empty());
//! ```

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::Vector3;
use thiserror::Error;

use super::base::{lonlat2ang, max_pixrad, pix2vec, ilog2, ORDER_MAX};
use super::circle::CircleFinder;

/// Precondition failures of region queries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),

    #[error("degenerate corner at vertex {0}")]
    DegenerateCorner(usize),

    #[error("polygon is not convex at vertex {0}")]
    NotConvex(usize),

    #[error("oversampling factor {0} must be a power of two")]
    InvalidOversampling(u32),

    #[error("order {0} exceeds the maximum order {ORDER_MAX}")]
    OrderTooLarge(u32),

    #[error("normals and radii differ in length ({normals} vs {radii})")]
    InconsistentDiscs { normals: usize, radii: usize },
}

/// Unit vector for a geographic position.
fn lonlat_to_vec(lon: f64, lat: f64) -> Vector3<f64> {
    let (phi, theta) = lonlat2ang(lon, lat);
    let st = theta.sin();
    Vector3::new(st * phi.cos(), st * phi.sin(), theta.cos())
}

/// Pixels at `order` overlapping a convex polygon given in `(lon, lat)` degrees.
///
/// # Arguments
///
/// * `vertices` - Polygon corners in order (either winding); not closed
/// * `order` - Target pixel order
/// * `fact` - Oversampling factor; `0` for an exclusive query (pixel centers
///   inside the polygon), a power of two for an inclusive query (every pixel
///   touching the polygon, possibly a few more)
///
/// # Returns
///
/// Sorted, deduplicated pixel numbers.
pub fn query_polygon(
    vertices: &[(f64, f64)],
    order: u32,
    fact: u32,
) -> Result<Vec<u64>, QueryError> {
    let vv: Vec<Vector3<f64>> = vertices
        .iter()
        .map(|&(lon, lat)| lonlat_to_vec(lon, lat))
        .collect();
    query_polygon_vec(&vv, order, fact)
}

/// Same as [`query_polygon`] with vertices given as unit vectors.
pub fn query_polygon_vec(
    vv: &[Vector3<f64>],
    order: u32,
    fact: u32,
) -> Result<Vec<u64>, QueryError> {
    let nv = vv.len();
    if nv < 3 {
        return Err(QueryError::TooFewVertices(nv));
    }
    let inclusive = fact != 0;

    let mut normals = Vec::with_capacity(nv + 1);
    let mut flip = 1.0;
    for i in 0..nv {
        let n = vv[i].cross(&vv[(i + 1) % nv]);
        let len = n.norm();
        if len == 0.0 {
            return Err(QueryError::DegenerateCorner(i));
        }
        let n = n / len;
        let hnd = n.dot(&vv[(i + 2) % nv]);
        if hnd.abs() <= 1e-10 {
            return Err(QueryError::DegenerateCorner(i));
        }
        if i == 0 {
            flip = if hnd < 0.0 { -1.0 } else { 1.0 };
        } else if flip * hnd <= 0.0 {
            return Err(QueryError::NotConvex(i));
        }
        normals.push(n * flip);
    }

    let mut radii = vec![FRAC_PI_2; nv];
    if inclusive {
        if let Some(cf) = CircleFinder::new(vv) {
            normals.push(cf.center());
            radii.push(cf.radius());
        }
    }

    query_multi_disc(&normals, &radii, order, fact)
}

/// Pixels at `order` overlapping the intersection of discs.
///
/// Disc `i` is centered on the unit vector `normals[i]` with angular radius
/// `radii[i]` (radians).
pub fn query_multi_disc(
    normals: &[Vector3<f64>],
    radii: &[f64],
    order: u32,
    fact: u32,
) -> Result<Vec<u64>, QueryError> {
    if normals.len() != radii.len() {
        return Err(QueryError::InconsistentDiscs {
            normals: normals.len(),
            radii: radii.len(),
        });
    }
    let inclusive = fact != 0;
    let oplus = if inclusive {
        if !fact.is_power_of_two() {
            return Err(QueryError::InvalidOversampling(fact));
        }
        ilog2(fact as u64)
    } else {
        0
    };
    let omax = order + oplus;
    if omax > ORDER_MAX {
        return Err(QueryError::OrderTooLarge(omax));
    }

    let nv = normals.len();
    let crlimit: Vec<Vec<[f64; 3]>> = (0..=omax)
        .map(|o| {
            let dr = max_pixrad(o);
            radii
                .iter()
                .map(|&rad| {
                    [
                        if rad + dr > PI { -1.0 } else { (rad + dr).cos() },
                        rad.cos(),
                        if rad - dr < 0.0 { 1.0 } else { (rad - dr).cos() },
                    ]
                })
                .collect()
        })
        .collect();

    let mut walk = Walk {
        order,
        omax,
        inclusive,
        stack: Vec::with_capacity(12 + 3 * omax as usize),
        mark: 0,
        result: Vec::new(),
    };
    for pix in (0..12u64).rev() {
        walk.stack.push((pix, 0));
    }

    while let Some((pix, o)) = walk.stack.pop() {
        let pv = pix2vec(pix, o);
        let mut zone = 3usize;
        for i in 0..nv {
            if zone == 0 {
                break;
            }
            let crad = pv.dot(&normals[i]);
            if let Some(iz) = (0..zone).find(|&iz| crad < crlimit[o as usize][i][iz]) {
                zone = iz;
            }
        }
        if zone > 0 {
            walk.check_pixel(o, zone, pix);
        }
    }

    let mut result = walk.result;
    result.sort_unstable();
    result.dedup();
    Ok(result)
}

struct Walk {
    order: u32,
    omax: u32,
    inclusive: bool,
    stack: Vec<(u64, u32)>,
    mark: usize,
    result: Vec<u64>,
}

impl Walk {
    fn push_children(&mut self, pix: u64, o: u32) {
        for i in 0..4 {
            self.stack.push((4 * pix + 3 - i, o + 1));
        }
    }

    fn pop_to_mark(&mut self) {
        self.stack.truncate(self.mark);
    }

    fn check_pixel(&mut self, o: u32, zone: usize, pix: u64) {
        if o < self.order {
            if zone >= 3 {
                let sdist = 2 * (self.order - o);
                self.result.extend((pix << sdist)..((pix + 1) << sdist));
            } else {
                self.push_children(pix, o);
            }
        } else if o > self.order {
            let ancestor = pix >> (2 * (o - self.order));
            if zone >= 2 {
                self.result.push(ancestor);
                self.pop_to_mark();
            } else if o < self.omax {
                self.push_children(pix, o);
            } else {
                self.result.push(ancestor);
                self.pop_to_mark();
            }
        } else if zone >= 2 {
            self.result.push(pix);
        } else if self.inclusive {
            if self.order < self.omax {
                self.mark = self.stack.len();
                self.push_children(pix, o);
            } else {
                self.result.push(pix);
            }
        }
    }
}
