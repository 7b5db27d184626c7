//! Point-sampling kernels over voxel grids.
//!
//! Coordinates are continuous 0-based voxel indices; anything outside the
//! grid reads as the fill value 0. The 2D slice primitive mirrors the 3D one
//! so the two resampling strategies can cross-validate each other.

use nalgebra::Vector4;
use ndarray::{Array2, ArrayView3, ShapeBuilder};

use crate::affine::Affine4;
use crate::error::{GspError, Result};

/// Sampling kernel applied when reading a volume at non-integer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Order 0: value of the closest voxel.
    Nearest,
    /// Order 1: linear blend of the 8 surrounding voxels.
    Trilinear,
    /// Orders 2 and 3: Catmull-Rom cubic kernel over 64 voxels.
    Tricubic,
}

impl Interpolation {
    /// Map a numeric interpolation order to a kernel.
    ///
    /// # Errors
    ///
    /// - `GspError::Unsupported` for orders above 3.
    pub fn from_order(order: u32) -> Result<Interpolation> {
        match order {
            0 => Ok(Interpolation::Nearest),
            1 => Ok(Interpolation::Trilinear),
            2 | 3 => Ok(Interpolation::Tricubic),
            n => Err(GspError::Unsupported(format!(
                "interpolation order {}",
                n
            ))),
        }
    }
}

/// Sample `vol` at the continuous voxel coordinate `(x, y, z)`.
pub fn sample3(vol: &ArrayView3<f64>, x: f64, y: f64, z: f64, kernel: Interpolation) -> f64 {
    match kernel {
        Interpolation::Nearest => nearest(vol, x, y, z),
        Interpolation::Trilinear => trilinear(vol, x, y, z),
        Interpolation::Tricubic => tricubic(vol, x, y, z),
    }
}

/// Fill an `nx` by `ny` plane by mapping `(i, j, 0, 1)` through `m` into the
/// voxel space of `vol` and sampling there.
///
/// This is the slice-wise counterpart of [`sample3`]; `m` carries the slice
/// position in its translation column.
pub fn sample_slice(
    vol: &ArrayView3<f64>,
    m: &Affine4,
    nx: usize,
    ny: usize,
    kernel: Interpolation,
) -> Array2<f64> {
    let mut plane = Array2::zeros((nx, ny).f());
    for j in 0..ny {
        for i in 0..nx {
            let p = m * Vector4::new(i as f64, j as f64, 0.0, 1.0);
            plane[[i, j]] = sample3(vol, p[0], p[1], p[2], kernel);
        }
    }
    plane
}

/// Voxel value at an integer coordinate, 0 outside the grid.
#[inline]
fn at(vol: &ArrayView3<f64>, x: isize, y: isize, z: isize) -> f64 {
    if x < 0 || y < 0 || z < 0 {
        return 0.0;
    }
    let (nx, ny, nz) = vol.dim();
    let (x, y, z) = (x as usize, y as usize, z as usize);
    if x >= nx || y >= ny || z >= nz {
        0.0
    } else {
        vol[[x, y, z]]
    }
}

fn nearest(vol: &ArrayView3<f64>, x: f64, y: f64, z: f64) -> f64 {
    at(
        vol,
        x.round() as isize,
        y.round() as isize,
        z.round() as isize,
    )
}

fn trilinear(vol: &ArrayView3<f64>, x: f64, y: f64, z: f64) -> f64 {
    let (bx, by, bz) = (x.floor(), y.floor(), z.floor());
    let (fx, fy, fz) = (x - bx, y - by, z - bz);
    let (x0, y0, z0) = (bx as isize, by as isize, bz as isize);
    let mut acc = 0.0;
    for dz in 0..2isize {
        let wz = if dz == 0 { 1.0 - fz } else { fz };
        if wz == 0.0 {
            continue;
        }
        for dy in 0..2isize {
            let wy = if dy == 0 { 1.0 - fy } else { fy };
            if wy == 0.0 {
                continue;
            }
            for dx in 0..2isize {
                let wx = if dx == 0 { 1.0 - fx } else { fx };
                if wx == 0.0 {
                    continue;
                }
                acc += wx * wy * wz * at(vol, x0 + dx, y0 + dy, z0 + dz);
            }
        }
    }
    acc
}

/// Catmull-Rom kernel weight (Keys, a = -0.5).
fn cubic_weight(t: f64) -> f64 {
    let t = t.abs();
    if t < 1.0 {
        ((1.5 * t - 2.5) * t) * t + 1.0
    } else if t < 2.0 {
        ((-0.5 * t + 2.5) * t - 4.0) * t + 2.0
    } else {
        0.0
    }
}

fn tricubic(vol: &ArrayView3<f64>, x: f64, y: f64, z: f64) -> f64 {
    let (bx, by, bz) = (x.floor(), y.floor(), z.floor());
    let (fx, fy, fz) = (x - bx, y - by, z - bz);
    let (x0, y0, z0) = (bx as isize, by as isize, bz as isize);
    let mut acc = 0.0;
    for dz in -1..3isize {
        let wz = cubic_weight(dz as f64 - fz);
        if wz == 0.0 {
            continue;
        }
        for dy in -1..3isize {
            let wy = cubic_weight(dy as f64 - fy);
            if wy == 0.0 {
                continue;
            }
            for dx in -1..3isize {
                let wx = cubic_weight(dx as f64 - fx);
                if wx == 0.0 {
                    continue;
                }
                acc += wx * wy * wz * at(vol, x0 + dx, y0 + dy, z0 + dz);
            }
        }
    }
    acc
}
