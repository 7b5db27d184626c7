//! Affine handling for axis-aligned voxel grids.
//!
//! Affines map homogeneous voxel-index coordinates `(i, j, k, 1)` to
//! millimeter-space coordinates. Everything here assumes the grid axes are
//! aligned with the physical axes: the upper-left 3x3 block must be diagonal,
//! with per-axis voxel spacings (possibly negative, encoding a reflection) on
//! the diagonal. Sheared or rotated affines are rejected.

use nalgebra::{Matrix4, Vector4};

use crate::error::{GspError, Result};

/// 4x4 voxel-to-millimeter affine transform, in double precision.
pub type Affine4 = Matrix4<f64>;

/// Off-diagonal magnitude above which an affine counts as sheared.
const SHEAR_TOLERANCE: f64 = 1e-6;

/// Ensure the spatial 3x3 block of `mat` is diagonal.
pub fn validate_axis_aligned(mat: &Affine4) -> Result<()> {
    for i in 0..3 {
        for j in 0..3 {
            if i != j && mat[(i, j)].abs() > SHEAR_TOLERANCE {
                return Err(GspError::UnsupportedAffine);
            }
        }
    }
    Ok(())
}

/// Per-axis voxel spacing in millimeters, as the absolute value of the
/// diagonal of `mat`.
///
/// # Errors
///
/// - `GspError::UnsupportedAffine` if `mat` is sheared, or if any diagonal
///   entry is zero or not finite.
pub fn voxel_spacing(mat: &Affine4) -> Result<[f64; 3]> {
    validate_axis_aligned(mat)?;
    let spacing = [
        mat[(0, 0)].abs(),
        mat[(1, 1)].abs(),
        mat[(2, 2)].abs(),
    ];
    if spacing.iter().any(|s| *s <= 0.0 || !s.is_finite()) {
        return Err(GspError::UnsupportedAffine);
    }
    Ok(spacing)
}

/// Affine of a grid resampled to `target` spacing.
///
/// Keeps the input's diagonal sign pattern (axis reflections) and its
/// translation column, so the center of voxel `(0, 0, 0)` maps to the same
/// spatial point under both affines. Only the diagonal magnitudes change.
pub fn resampled_affine(mat: &Affine4, target: [f64; 3]) -> Affine4 {
    let mut out = *mat;
    for i in 0..3 {
        out[(i, i)] = mat[(i, i)].signum() * target[i];
    }
    out
}

/// Composed map taking output voxel indices straight to input voxel indices:
/// `inv(mat_in) * mat_out`.
///
/// Computed once per resampling run and reused for every sampled point.
pub fn voxel_map(mat_in: &Affine4, mat_out: &Affine4) -> Result<Affine4> {
    let inv = mat_in.try_inverse().ok_or(GspError::UnsupportedAffine)?;
    Ok(inv * mat_out)
}

/// Apply a voxel map to the index triple `(i, j, k)`.
#[inline]
pub fn map_index(map: &Affine4, i: usize, j: usize, k: usize) -> [f64; 3] {
    let p = map * Vector4::new(i as f64, j as f64, k as f64, 1.0);
    [p[0], p[1], p[2]]
}
