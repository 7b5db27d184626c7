//! Graph-signal extraction from volumes registered to a graph space.
//!
//! A graph signal is a vector of scalar values indexed by graph-node
//! positions. Nodes are associated with voxels of a reference grid (the
//! [`GraphSpace`]); extraction reads the volume at those voxels, one column
//! per frame. The volume must live on the reference grid; a volume with the
//! right geometry but a different resolution can optionally be resliced
//! through the resampler first.

use std::path::Path;

use approx::abs_diff_eq;
use log::debug;
use ndarray::{Array2, ArrayD, Ix3, Ix4};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};

use crate::affine::{self, Affine4};
use crate::error::{GspError, Result};
use crate::interp::Interpolation;
use crate::resample::{ResampleOptions, Strategy};
use crate::scratch::WorkingCopy;
use crate::util;

/// Reference voxel grid of the graph domain.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSpace {
    /// Grid extents.
    pub dim: [usize; 3],
    /// Voxel-to-millimeter affine of the grid.
    pub mat: Affine4,
}

/// Maximum per-element deviation between a volume's affine and the graph
/// space affine.
const AFFINE_TOLERANCE: f64 = 1e-6;

/// Options and flags which can be used to configure graph-signal
/// extraction.
#[derive(Debug, Clone)]
pub struct GsigOptions {
    frames: Option<Vec<usize>>,
    reslice: bool,
    interpolation: Interpolation,
}

impl Default for GsigOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl GsigOptions {
    /// Create the default configuration: all frames, no reslicing.
    pub fn new() -> GsigOptions {
        GsigOptions {
            frames: None,
            reslice: false,
            interpolation: Interpolation::Trilinear,
        }
    }

    /// Extract only these frames, in the given order.
    pub fn frames(mut self, frames: &[usize]) -> Self {
        self.frames = Some(frames.to_vec());
        self
    }

    /// Allow reslicing a volume into the reference space before extraction.
    pub fn reslice(mut self, reslice: bool) -> Self {
        self.reslice = reslice;
        self
    }

    /// Kernel used when reslicing is required.
    pub fn interpolation(mut self, kernel: Interpolation) -> Self {
        self.interpolation = kernel;
        self
    }

    /// Extract graph signals from the volume at `path`.
    ///
    /// `indices` are flat 0-based voxel indices into the reference grid, in
    /// Fortran order (`i = x + y * nx + z * nx * ny`, x fastest). Returns
    /// one row per index and one column per selected frame; a 3D volume
    /// counts as a single frame.
    ///
    /// # Errors
    ///
    /// - `GspError::SpaceMismatch` if the volume is not on the reference
    ///   grid (and reslicing is disabled or insufficient).
    /// - `GspError::OutOfBounds` for voxel or frame indices outside the
    ///   grid.
    pub fn extract<P: AsRef<Path>>(
        &self,
        path: P,
        indices: &[usize],
        space: &GraphSpace,
    ) -> Result<Array2<f64>> {
        let path = path.as_ref();
        if !util::is_volume_file(path) {
            return Err(GspError::UnknownFormat(path.to_path_buf()));
        }
        let copy = WorkingCopy::new(path)?;
        let obj = ReaderOptions::new().read_file(copy.path())?;
        let mut mat = obj.header().affine::<f64>();
        let mut data = obj.into_volume().into_ndarray::<f64>()?;

        if check_space(&data, &mat, space).is_err() && self.reslice {
            let spacing = affine::voxel_spacing(&space.mat)?;
            debug!(
                "reslicing {} to reference spacing {:?}",
                path.display(),
                spacing
            );
            let (resliced, resliced_mat) = ResampleOptions::new()
                .interpolation(self.interpolation)
                .strategy(Strategy::Full3d)
                .resample_volume(&data, &mat, spacing)?;
            data = resliced;
            mat = resliced_mat;
        }
        check_space(&data, &mat, space)?;

        self.extract_from_array(&data, indices)
    }

    fn extract_from_array(&self, data: &ArrayD<f64>, indices: &[usize]) -> Result<Array2<f64>> {
        let shape = data.shape().to_vec();
        let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
        let nvox = nx * ny * nz;
        let nframes = if shape.len() == 4 { shape[3] } else { 1 };

        let frames: Vec<usize> = match &self.frames {
            Some(frames) => frames.clone(),
            None => (0..nframes).collect(),
        };
        for &f in &frames {
            if f >= nframes {
                return Err(GspError::OutOfBounds(f));
            }
        }

        let mut out = Array2::zeros((indices.len(), frames.len()));
        if shape.len() == 4 {
            let data4 = data
                .view()
                .into_dimensionality::<Ix4>()
                .map_err(|_| GspError::Unsupported("malformed 4D volume".to_string()))?;
            for (row, &idx) in indices.iter().enumerate() {
                let (x, y, z) = unravel(idx, nx, ny, nvox)?;
                for (col, &f) in frames.iter().enumerate() {
                    out[[row, col]] = data4[[x, y, z, f]];
                }
            }
        } else {
            let data3 = data
                .view()
                .into_dimensionality::<Ix3>()
                .map_err(|_| GspError::Unsupported("malformed 3D volume".to_string()))?;
            for (row, &idx) in indices.iter().enumerate() {
                let (x, y, z) = unravel(idx, nx, ny, nvox)?;
                for (col, _) in frames.iter().enumerate() {
                    out[[row, col]] = data3[[x, y, z]];
                }
            }
        }
        Ok(out)
    }
}

/// Split a flat Fortran-order index into voxel coordinates.
fn unravel(idx: usize, nx: usize, ny: usize, nvox: usize) -> Result<(usize, usize, usize)> {
    if idx >= nvox {
        return Err(GspError::OutOfBounds(idx));
    }
    Ok((idx % nx, (idx / nx) % ny, idx / (nx * ny)))
}

/// Verify that the volume lives on the reference grid.
fn check_space(data: &ArrayD<f64>, mat: &Affine4, space: &GraphSpace) -> Result<()> {
    let shape = data.shape();
    if shape.len() < 3 {
        return Err(GspError::SpaceMismatch(format!(
            "expected a 3D or 4D volume, got {} dimensions",
            shape.len()
        )));
    }
    if shape[..3] != space.dim {
        return Err(GspError::SpaceMismatch(format!(
            "grid is {:?}, reference is {:?}",
            &shape[..3],
            space.dim
        )));
    }
    for r in 0..4 {
        for c in 0..4 {
            if !abs_diff_eq!(mat[(r, c)], space.mat[(r, c)], epsilon = AFFINE_TOLERANCE) {
                return Err(GspError::SpaceMismatch(format!(
                    "affine element ({}, {}) is {}, reference has {}",
                    r,
                    c,
                    mat[(r, c)],
                    space.mat[(r, c)]
                )));
            }
        }
    }
    Ok(())
}
