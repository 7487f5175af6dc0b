//! Nested hierarchical equal-area pixelisation of the sphere.
//!
//! Pixels are numbered in the NESTED scheme: the 12 base faces are split
//! recursively into four children, and a pixel number at order `o` is
//! `face << 2o` followed by the interleaved bits of its face-relative
//! `(ix, iy)` coordinates. All index arithmetic uses native 64-bit integers.
//!
//! Angles follow the usual convention: `theta` is the colatitude in radians
//! (0 at the north pole), `phi` the longitude in radians in `[0, 2pi)`.

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::Vector3;

// =============================================================================
// Constants
// =============================================================================

/// Highest supported order: `12 * 4^29` pixels still fit in an `i64`.
pub const ORDER_MAX: u32 = 29;

/// Number of base faces.
pub const NUM_FACES: u64 = 12;

/// Ring number (in units of nside) of the northernmost corner of each face.
const JRLL: [i64; 12] = [2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];

/// Longitude index (in units of nside/2) of the center of each face.
const JPLL: [i64; 12] = [1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7];

const TWO_PI: f64 = 2.0 * PI;

// =============================================================================
// Bit manipulation
// =============================================================================

/// Spreads the 32 bits of `v` onto the even bit positions of a `u64`.
pub fn spread_bits(v: u32) -> u64 {
    let mut x = v as u64;
    x = (x | (x << 16)) & 0x0000_ffff_0000_ffff;
    x = (x | (x << 8)) & 0x00ff_00ff_00ff_00ff;
    x = (x | (x << 4)) & 0x0f0f_0f0f_0f0f_0f0f;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

/// Inverse of [`spread_bits`]: gathers the even bits of `v`.
pub fn compress_bits(v: u64) -> u32 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0f0f_0f0f_0f0f_0f0f;
    x = (x | (x >> 4)) & 0x00ff_00ff_00ff_00ff;
    x = (x | (x >> 8)) & 0x0000_ffff_0000_ffff;
    x = (x | (x >> 16)) & 0x0000_0000_ffff_ffff;
    x as u32
}

/// Integer base-2 logarithm, `0` for `0`.
pub fn ilog2(arg: u64) -> u32 {
    if arg == 0 {
        0
    } else {
        63 - arg.leading_zeros()
    }
}

/// Order of a power-of-two nside, or `None` when nside is not a power of two.
pub fn nside2order(nside: u64) -> Option<u32> {
    if nside == 0 || !nside.is_power_of_two() {
        None
    } else {
        Some(ilog2(nside))
    }
}

/// `2^order`.
pub fn order2nside(order: u32) -> u64 {
    1u64 << order
}

/// Number of pixels covering the sphere at `order`.
pub fn npix(order: u32) -> u64 {
    NUM_FACES << (2 * order)
}

// =============================================================================
// Nested index <-> face coordinates
// =============================================================================

/// Face-relative pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xyf {
    pub ix: u32,
    pub iy: u32,
    pub face: u32,
}

/// Builds a nested pixel number from face coordinates.
pub fn xyf2nest(ix: u32, iy: u32, face: u32, order: u32) -> u64 {
    ((face as u64) << (2 * order)) + spread_bits(ix) + (spread_bits(iy) << 1)
}

/// Splits a nested pixel number into face coordinates.
pub fn nest2xyf(pix: u64, order: u32) -> Xyf {
    let npface = 1u64 << (2 * order);
    let local = pix & (npface - 1);
    Xyf {
        ix: compress_bits(local),
        iy: compress_bits(local >> 1),
        face: (pix >> (2 * order)) as u32,
    }
}

/// The four children of `pix` at the next order, `4p .. 4p+3`.
pub fn children(pix: u64) -> [u64; 4] {
    [4 * pix, 4 * pix + 1, 4 * pix + 2, 4 * pix + 3]
}

/// The parent of `pix` at the previous order.
pub fn parent(pix: u64) -> u64 {
    pix >> 2
}

/// Encodes `(order, pix)` as a NUNIQ number.
pub fn pixel_to_uniq(order: u32, pix: u64) -> u64 {
    4 * (1u64 << (2 * order)) + pix
}

/// Decodes a NUNIQ number into `(order, pix)`.
pub fn uniq_to_pixel(uniq: u64) -> (u32, u64) {
    let order = (ilog2(uniq / 4)) / 2;
    (order, uniq - 4 * (1u64 << (2 * order)))
}

/// Mean pixel size in arc seconds for a given nside.
pub fn pixel_resolution_arcsec(nside: u64) -> f64 {
    let rad2arcsec = 180.0 * 60.0 * 60.0 / PI;
    let n = nside as f64;
    rad2arcsec * (4.0 * PI / (12.0 * n * n)).sqrt()
}

// =============================================================================
// Angles <-> pixels
// =============================================================================

/// Non-negative remainder of `v1 / v2` for positive `v2`.
fn fmodulo(v1: f64, v2: f64) -> f64 {
    if v1 >= 0.0 {
        if v1 < v2 {
            v1
        } else {
            v1 % v2
        }
    } else {
        let tmp = v1 % v2 + v2;
        if tmp == v2 {
            0.0
        } else {
            tmp
        }
    }
}

/// Converts geographic degrees to `(phi, theta)` radians.
pub fn lonlat2ang(lon: f64, lat: f64) -> (f64, f64) {
    let lon = if lon < 0.0 { lon + 360.0 } else { lon };
    (lon.to_radians(), (90.0 - lat).to_radians())
}

/// Pixel containing the direction `(phi, theta)` at `order`.
pub fn ang2pix(order: u32, phi: f64, theta: f64) -> u64 {
    let nside = order2nside(order) as i64;
    let z = theta.cos();
    let za = z.abs();
    let tt = fmodulo(phi * (2.0 / PI), 4.0);

    if za <= 2.0 / 3.0 {
        let temp1 = nside as f64 * (0.5 + tt);
        let temp2 = nside as f64 * (z * 0.75);
        let jp = (temp1 - temp2) as i64;
        let jm = (temp1 + temp2) as i64;
        let ifp = jp >> order;
        let ifm = jm >> order;
        let face = if ifp == ifm {
            ifp | 4
        } else if ifp < ifm {
            ifp
        } else {
            ifm + 8
        };
        let ix = jm & (nside - 1);
        let iy = nside - 1 - (jp & (nside - 1));
        xyf2nest(ix as u32, iy as u32, face as u32, order)
    } else {
        let ntt = (tt as i64).min(3);
        let tp = tt - ntt as f64;
        let tmp = if za < 0.9 {
            nside as f64 * (3.0 * (1.0 - za)).sqrt()
        } else {
            nside as f64 * theta.sin() / ((1.0 + za) / 3.0).sqrt()
        };
        let jp = ((tp * tmp) as i64).min(nside - 1);
        let jm = (((1.0 - tp) * tmp) as i64).min(nside - 1);
        if z >= 0.0 {
            xyf2nest(
                (nside - jm - 1) as u32,
                (nside - jp - 1) as u32,
                ntt as u32,
                order,
            )
        } else {
            xyf2nest(jp as u32, jm as u32, (ntt + 8) as u32, order)
        }
    }
}

/// Pixel containing the geographic position at `order`.
pub fn lonlat2pix(order: u32, lon: f64, lat: f64) -> u64 {
    let (phi, theta) = lonlat2ang(lon, lat);
    ang2pix(order, phi, theta)
}

/// Location of a pixel center: `z = cos(theta)`, `phi`, and `sin(theta)` when
/// it was computed directly near the poles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Loc {
    pub z: f64,
    pub phi: f64,
    pub sth: Option<f64>,
}

impl Loc {
    /// Unit vector for this location.
    pub fn to_vec(&self) -> Vector3<f64> {
        let st = self
            .sth
            .unwrap_or_else(|| ((1.0 - self.z) * (1.0 + self.z)).sqrt());
        Vector3::new(st * self.phi.cos(), st * self.phi.sin(), self.z)
    }
}

/// Center location of a pixel.
pub fn pix2loc(pix: u64, order: u32) -> Loc {
    let nside = order2nside(order) as i64;
    let npix = 12.0 * (nside as f64) * (nside as f64);
    let fact2 = 4.0 / npix;
    let fact1 = (2 * nside) as f64 * fact2;
    let (nl2, nl3, nl4) = (2 * nside, 3 * nside, 4 * nside);

    let xyf = nest2xyf(pix, order);
    let face = xyf.face as usize;
    let jr = (JRLL[face] << order) - xyf.ix as i64 - xyf.iy as i64 - 1;

    let mut sth = None;
    let (nr, z) = if jr < nside {
        let nr = jr;
        let tmp = (nr * nr) as f64 * fact2;
        let z = 1.0 - tmp;
        if z > 0.99 {
            sth = Some((tmp * (2.0 - tmp)).sqrt());
        }
        (nr, z)
    } else if jr > nl3 {
        let nr = nl4 - jr;
        let tmp = (nr * nr) as f64 * fact2;
        let z = tmp - 1.0;
        if z < -0.99 {
            sth = Some((tmp * (2.0 - tmp)).sqrt());
        }
        (nr, z)
    } else {
        (nside, (nl2 - jr) as f64 * fact1)
    };

    let mut tmp = JPLL[face] * nr + xyf.ix as i64 - xyf.iy as i64;
    if tmp < 0 {
        tmp += 8 * nr;
    }
    let phi = if nr == nside {
        0.75 * FRAC_PI_2 * tmp as f64 * fact1
    } else {
        0.5 * FRAC_PI_2 * tmp as f64 / nr as f64
    };

    Loc { z, phi, sth }
}

/// Unit vector of a pixel center.
pub fn pix2vec(pix: u64, order: u32) -> Vector3<f64> {
    pix2loc(pix, order).to_vec()
}

/// Geographic `(lon, lat)` of a pixel center, longitude in `[0, 360)`.
pub fn pix2lonlat(pix: u64, order: u32) -> (f64, f64) {
    vec2lonlat(&pix2vec(pix, order))
}

/// Geographic `(lon, lat)` of a unit vector, longitude in `[0, 360)`.
pub fn vec2lonlat(v: &Vector3<f64>) -> (f64, f64) {
    let mut phi = v.y.atan2(v.x);
    if phi < 0.0 {
        phi += TWO_PI;
    }
    let lat = v.z.clamp(-1.0, 1.0).asin();
    (phi.to_degrees(), lat.to_degrees())
}

/// Unit vector for continuous face coordinates `(fx, fy)` in `[0, 1]`.
///
/// `(0, 0)` is the southern corner of the face and `(1, 1)` the northern one.
pub fn fxyf(fx: f64, fy: f64, face: u32) -> Vector3<f64> {
    let face = face as usize;
    let jr = JRLL[face] as f64 - fx - fy;

    let mut sth = None;
    let (nr, z) = if jr < 1.0 {
        let nr = jr;
        let tmp = nr * nr / 3.0;
        let z = 1.0 - tmp;
        if z > 0.99 {
            sth = Some((tmp * (2.0 - tmp)).sqrt());
        }
        (nr, z)
    } else if jr > 3.0 {
        let nr = 4.0 - jr;
        let tmp = nr * nr / 3.0;
        let z = tmp - 1.0;
        if z < -0.99 {
            sth = Some((tmp * (2.0 - tmp)).sqrt());
        }
        (nr, z)
    } else {
        (1.0, (2.0 - jr) * 2.0 / 3.0)
    };

    let mut tmp = JPLL[face] as f64 * nr + fx - fy;
    if tmp < 0.0 {
        tmp += 8.0;
    }
    if tmp >= 8.0 {
        tmp -= 8.0;
    }
    let phi = if nr < 1e-15 {
        0.0
    } else {
        0.5 * FRAC_PI_2 * tmp / nr
    };

    Loc { z, phi, sth }.to_vec()
}

/// Unit vector from `z = cos(theta)` and `phi`.
pub fn vec_from_zphi(z: f64, phi: f64) -> Vector3<f64> {
    let sth = ((1.0 - z) * (1.0 + z)).sqrt();
    Vector3::new(sth * phi.cos(), sth * phi.sin(), z)
}

/// Angle in radians between two vectors.
pub fn angle(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    a.cross(b).norm().atan2(a.dot(b))
}

/// Upper bound of the angular distance between a pixel center and its corners.
pub fn max_pixrad(order: u32) -> f64 {
    let nside = order2nside(order) as f64;
    let nl4 = 4.0 * nside;
    let va = vec_from_zphi(2.0 / 3.0, PI / nl4);
    let mut t1 = 1.0 - 1.0 / nside;
    t1 *= t1;
    let vb = vec_from_zphi(1.0 - t1 / 3.0, 0.0);
    angle(&va, &vb)
}
