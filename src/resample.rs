//! Volume resampling onto a coarser or finer voxel grid.
//!
//! Resampling derives a new grid and affine from a target voxel resolution,
//! composes a single output-voxel-to-input-voxel map, and fills every output
//! voxel by sampling the input volume through an interpolation kernel. Two
//! execution strategies are provided and produce numerically equivalent
//! output; see [`Strategy`].

use std::path::{Path, PathBuf};

use log::debug;
use nalgebra::Vector3;
use ndarray::{s, ArrayD, ArrayView3, ArrayViewMut3, Axis, Ix3, Ix4, IxDyn, ShapeBuilder};
use nifti::writer::WriterOptions;
use nifti::{DataElement, IntoNdArray, NiftiHeader, NiftiObject, NiftiType, ReaderOptions};
use num_traits::FromPrimitive;

use crate::affine::{self, Affine4};
use crate::error::{GspError, Result};
use crate::interp::{self, Interpolation};
use crate::scratch::WorkingCopy;
use crate::util;

/// Target voxel resolution in millimeters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// The same spacing on all three axes.
    Isotropic(f64),
    /// One spacing per axis.
    Anisotropic([f64; 3]),
}

impl Resolution {
    /// Spacing per axis, validated to be positive and finite.
    pub(crate) fn per_axis(&self) -> Result<[f64; 3]> {
        let v = match *self {
            Resolution::Isotropic(r) => [r; 3],
            Resolution::Anisotropic(v) => v,
        };
        for r in &v {
            if !r.is_finite() || *r <= 0.0 {
                return Err(GspError::BadResolution(*r));
            }
        }
        Ok(v)
    }
}

impl From<f64> for Resolution {
    fn from(r: f64) -> Self {
        Resolution::Isotropic(r)
    }
}

impl From<[f64; 3]> for Resolution {
    fn from(v: [f64; 3]) -> Self {
        Resolution::Anisotropic(v)
    }
}

/// How output voxels are produced.
///
/// The strategies are deliberately independent code paths: their agreement on
/// the same input is a cross-check of the coordinate handling, exercised by
/// the integration tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Map every output coordinate through the composed affine and sample
    /// the volume directly. Supports downsampling and upsampling.
    Full3d,
    /// Compose one transform per output slice and fill the slice through the
    /// 2D sampling primitive. Downsampling only.
    Slice2d,
}

/// Options and flags which can be used to configure how a volume is
/// resampled.
///
/// Defaults to trilinear interpolation, the [`Strategy::Full3d`] strategy,
/// and bounded-memory plane-by-plane traversal.
#[derive(Debug, Clone)]
pub struct ResampleOptions {
    interpolation: Interpolation,
    strategy: Strategy,
    memory_safe: bool,
    output_path: Option<PathBuf>,
}

impl Default for ResampleOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ResampleOptions {
    /// Create the default configuration.
    pub fn new() -> ResampleOptions {
        ResampleOptions {
            interpolation: Interpolation::Trilinear,
            strategy: Strategy::Full3d,
            memory_safe: true,
            output_path: None,
        }
    }

    /// Select the sampling kernel (see [`Interpolation::from_order`]).
    pub fn interpolation(mut self, kernel: Interpolation) -> Self {
        self.interpolation = kernel;
        self
    }

    /// Select the execution strategy.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// With `true` (the default), the full-3D strategy materializes one
    /// output plane of coordinates at a time; with `false` it builds the
    /// whole coordinate grid up front. The numerical output is identical.
    pub fn memory_safe(mut self, memory_safe: bool) -> Self {
        self.memory_safe = memory_safe;
        self
    }

    /// Write to this path instead of deriving a name from the input.
    ///
    /// The extension decides whether the output is gzip-compressed.
    pub fn output_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Resample the volume at `input` to the given resolution and write the
    /// result next to it, returning the written path.
    ///
    /// Without an explicit output path, an isotropic resolution `r` appends
    /// a 4-digit millimeter-by-1000 code to the input base name (2 mm:
    /// `vol.nii` becomes `vol_2000.nii`) and an anisotropic resolution
    /// appends `_resampled`; the extension, and with it gzip compression,
    /// mirrors the input. Gzipped inputs are expanded to a scoped
    /// [`WorkingCopy`] which is removed on every exit path.
    ///
    /// Output writing is not atomic: a failure mid-write can leave a partial
    /// file behind. Callers that need atomicity should pass a temporary
    /// output path and rename on success.
    ///
    /// # Errors
    ///
    /// - `GspError::UnknownFormat` for unrecognized file extensions, before
    ///   any I/O takes place.
    /// - `GspError::BadResolution` for non-positive target resolutions.
    /// - `GspError::UnsupportedAffine` if the input affine is sheared.
    /// - `GspError::Unsupported` when upsampling with [`Strategy::Slice2d`].
    /// - `GspError::UnsupportedDataType` for non-scalar voxel types.
    pub fn resample<P, R>(&self, input: P, resolution: R) -> Result<PathBuf>
    where
        P: AsRef<Path>,
        R: Into<Resolution>,
    {
        let input = input.as_ref();
        if !util::is_volume_file(input) {
            return Err(GspError::UnknownFormat(input.to_path_buf()));
        }
        let target = resolution.into();
        let per_axis = target.per_axis()?;

        let copy = WorkingCopy::new(input)?;
        let obj = ReaderOptions::new().read_file(copy.path())?;
        let header = obj.header().clone();
        let datatype = supported_datatype(header.datatype)?;
        let mat = header.affine::<f64>();
        let data = obj.into_volume().into_ndarray::<f64>()?;

        let (out, mat_out) = self.resample_volume(&data, &mat, target)?;

        let mut out_header = header;
        set_output_geometry(&mut out_header, &out, &mat_out, per_axis);

        let out_path = match &self.output_path {
            Some(p) => p.clone(),
            None => derive_output_path(input, target)?,
        };
        debug!("writing resampled volume to {}", out_path.display());
        write_with_datatype(&out_path, &out, &out_header, datatype)?;
        Ok(out_path)
    }

    /// Resample an in-memory volume, returning the new grid and its affine.
    ///
    /// `data` must be 3-dimensional, or 4-dimensional with frames on the
    /// last axis; frames are resampled independently through one shared
    /// coordinate map. This is the entry point used by the graph-signal
    /// extractor when reslicing into a reference space.
    pub fn resample_volume<R>(
        &self,
        data: &ArrayD<f64>,
        mat: &Affine4,
        resolution: R,
    ) -> Result<(ArrayD<f64>, Affine4)>
    where
        R: Into<Resolution>,
    {
        let target = resolution.into().per_axis()?;
        let spacing = affine::voxel_spacing(mat)?;
        let mut scale = [0.0; 3];
        for i in 0..3 {
            scale[i] = target[i] / spacing[i];
        }
        if self.strategy == Strategy::Slice2d && scale.iter().any(|s| *s < 1.0) {
            return Err(GspError::Unsupported(
                "slice-wise resampling cannot upsample".to_string(),
            ));
        }

        let in_shape = data.shape().to_vec();
        let (in_dim, frames) = match in_shape.len() {
            3 => ([in_shape[0], in_shape[1], in_shape[2]], None),
            4 => ([in_shape[0], in_shape[1], in_shape[2]], Some(in_shape[3])),
            n => {
                return Err(GspError::Unsupported(format!(
                    "{}-dimensional volumes",
                    n
                )))
            }
        };

        let out_dim = output_dims(in_dim, scale);
        let mat_out = affine::resampled_affine(mat, target);
        let map = affine::voxel_map(mat, &mat_out)?;
        debug!(
            "resampling grid {:?} -> {:?} (scale factors {:?})",
            in_dim, out_dim, scale
        );

        let mut out_shape = vec![out_dim[0], out_dim[1], out_dim[2]];
        if let Some(n) = frames {
            out_shape.push(n);
        }
        let mut out = ArrayD::zeros(IxDyn(&out_shape).f());

        if let Some(n) = frames {
            let data4 = data
                .view()
                .into_dimensionality::<Ix4>()
                .map_err(|_| GspError::Unsupported("malformed 4D volume".to_string()))?;
            let mut out4 = out
                .view_mut()
                .into_dimensionality::<Ix4>()
                .map_err(|_| GspError::Unsupported("malformed 4D volume".to_string()))?;
            for f in 0..n {
                let src = data4.index_axis(Axis(3), f);
                let mut dst = out4.index_axis_mut(Axis(3), f);
                self.fill_frame(&src, &mut dst, &map, out_dim);
            }
        } else {
            let src = data
                .view()
                .into_dimensionality::<Ix3>()
                .map_err(|_| GspError::Unsupported("malformed 3D volume".to_string()))?;
            let mut dst = out
                .view_mut()
                .into_dimensionality::<Ix3>()
                .map_err(|_| GspError::Unsupported("malformed 3D volume".to_string()))?;
            self.fill_frame(&src, &mut dst, &map, out_dim);
        }

        Ok((out, mat_out))
    }

    fn fill_frame(
        &self,
        src: &ArrayView3<f64>,
        dst: &mut ArrayViewMut3<f64>,
        map: &Affine4,
        dim: [usize; 3],
    ) {
        match self.strategy {
            Strategy::Full3d if self.memory_safe => {
                full3d_by_plane(src, dst, map, dim, self.interpolation)
            }
            Strategy::Full3d => full3d_buffered(src, dst, map, dim, self.interpolation),
            Strategy::Slice2d => slice2d(src, dst, map, dim, self.interpolation),
        }
    }
}

/// One output plane of coordinates at a time; plane `k` is complete before
/// plane `k + 1` begins.
fn full3d_by_plane(
    src: &ArrayView3<f64>,
    dst: &mut ArrayViewMut3<f64>,
    map: &Affine4,
    dim: [usize; 3],
    kernel: Interpolation,
) {
    for k in 0..dim[2] {
        for j in 0..dim[1] {
            for i in 0..dim[0] {
                let p = affine::map_index(map, i, j, k);
                dst[[i, j, k]] = interp::sample3(src, p[0], p[1], p[2], kernel);
            }
        }
    }
}

/// The whole coordinate grid up front, then one sampling pass.
fn full3d_buffered(
    src: &ArrayView3<f64>,
    dst: &mut ArrayViewMut3<f64>,
    map: &Affine4,
    dim: [usize; 3],
    kernel: Interpolation,
) {
    let mut coords = Vec::with_capacity(dim[0] * dim[1] * dim[2]);
    for k in 0..dim[2] {
        for j in 0..dim[1] {
            for i in 0..dim[0] {
                coords.push(affine::map_index(map, i, j, k));
            }
        }
    }
    let samples: Vec<f64> = coords
        .iter()
        .map(|p| interp::sample3(src, p[0], p[1], p[2], kernel))
        .collect();
    let mut n = 0;
    for k in 0..dim[2] {
        for j in 0..dim[1] {
            for i in 0..dim[0] {
                dst[[i, j, k]] = samples[n];
                n += 1;
            }
        }
    }
}

/// One 2D transform per output slice, filled through the slice primitive.
fn slice2d(
    src: &ArrayView3<f64>,
    dst: &mut ArrayViewMut3<f64>,
    map: &Affine4,
    dim: [usize; 3],
    kernel: Interpolation,
) {
    for k in 0..dim[2] {
        let m = map * Affine4::new_translation(&Vector3::new(0.0, 0.0, k as f64));
        let plane = interp::sample_slice(src, &m, dim[0], dim[1], kernel);
        dst.slice_mut(s![.., .., k]).assign(&plane);
    }
}

/// Output grid extents: `round(in_dim / scale)`, at least 1 per axis.
fn output_dims(dim: [usize; 3], scale: [f64; 3]) -> [usize; 3] {
    let mut out = [0; 3];
    for i in 0..3 {
        out[i] = ((dim[i] as f64 / scale[i]).round() as usize).max(1);
    }
    out
}

fn supported_datatype(code: i16) -> Result<NiftiType> {
    let datatype = NiftiType::from_i16(code).ok_or(GspError::UnsupportedDataType(code))?;
    match datatype {
        NiftiType::Uint8
        | NiftiType::Int8
        | NiftiType::Uint16
        | NiftiType::Int16
        | NiftiType::Uint32
        | NiftiType::Int32
        | NiftiType::Uint64
        | NiftiType::Int64
        | NiftiType::Float32
        | NiftiType::Float64 => Ok(datatype),
        other => Err(GspError::UnsupportedDataType(other as i16)),
    }
}

/// Carry the resampled geometry into the output header. Datatype and
/// intensity scaling are deliberately left untouched.
fn set_output_geometry(
    header: &mut NiftiHeader,
    out: &ArrayD<f64>,
    mat_out: &Affine4,
    target: [f64; 3],
) {
    let mut dim = [1u16; 8];
    dim[0] = out.ndim() as u16;
    for (i, s) in out.shape().iter().enumerate() {
        dim[i + 1] = *s as u16;
    }
    header.dim = dim;
    for i in 0..3 {
        header.pixdim[i + 1] = target[i] as f32;
    }
    header.srow_x = srow(mat_out, 0);
    header.srow_y = srow(mat_out, 1);
    header.srow_z = srow(mat_out, 2);
    // "aligned" sform carries the new grid; the stale qform is disabled
    header.sform_code = 2;
    header.qform_code = 0;
}

fn srow(mat: &Affine4, r: usize) -> [f32; 4] {
    [
        mat[(r, 0)] as f32,
        mat[(r, 1)] as f32,
        mat[(r, 2)] as f32,
        mat[(r, 3)] as f32,
    ]
}

fn derive_output_path(input: &Path, resolution: Resolution) -> Result<PathBuf> {
    let (stem, ext) = util::split_volume_name(input)
        .ok_or_else(|| GspError::UnknownFormat(input.to_path_buf()))?;
    let suffix = match resolution {
        Resolution::Isotropic(r) => format!("_{}", util::resolution_code(r)),
        Resolution::Anisotropic(_) => "_resampled".to_string(),
    };
    Ok(input.with_file_name(format!("{}{}{}", stem, suffix, ext)))
}

fn write_with_datatype(
    path: &Path,
    data: &ArrayD<f64>,
    header: &NiftiHeader,
    datatype: NiftiType,
) -> Result<()> {
    match datatype {
        NiftiType::Uint8 => write_as::<u8>(path, data, header),
        NiftiType::Int8 => write_as::<i8>(path, data, header),
        NiftiType::Uint16 => write_as::<u16>(path, data, header),
        NiftiType::Int16 => write_as::<i16>(path, data, header),
        NiftiType::Uint32 => write_as::<u32>(path, data, header),
        NiftiType::Int32 => write_as::<i32>(path, data, header),
        NiftiType::Uint64 => write_as::<u64>(path, data, header),
        NiftiType::Int64 => write_as::<i64>(path, data, header),
        NiftiType::Float32 => write_as::<f32>(path, data, header),
        NiftiType::Float64 => write_as::<f64>(path, data, header),
        other => Err(GspError::UnsupportedDataType(other as i16)),
    }
}

fn write_as<T>(path: &Path, data: &ArrayD<f64>, header: &NiftiHeader) -> Result<()>
where
    T: DataElement + FromSample + bytemuck::Pod,
{
    let converted = data.mapv(T::from_sample);
    WriterOptions::new(path)
        .reference_header(header)
        .write_nifti(&converted)?;
    Ok(())
}

/// Conversion from an interpolated sample back into a stored voxel value.
trait FromSample {
    fn from_sample(v: f64) -> Self;
}

macro_rules! int_from_sample {
    ($($t:ty),*) => {
        $(impl FromSample for $t {
            fn from_sample(v: f64) -> $t {
                if v.is_nan() {
                    return 0;
                }
                let v = v.round();
                if v <= <$t>::MIN as f64 {
                    <$t>::MIN
                } else if v >= <$t>::MAX as f64 {
                    <$t>::MAX
                } else {
                    v as $t
                }
            }
        })*
    };
}

int_from_sample!(u8, i8, u16, i16, u32, i32, u64, i64);

impl FromSample for f32 {
    fn from_sample(v: f64) -> f32 {
        v as f32
    }
}

impl FromSample for f64 {
    fn from_sample(v: f64) -> f64 {
        v
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{derive_output_path, output_dims, FromSample, Resolution};

    #[test]
    fn dimension_law() {
        assert_eq!(output_dims([10, 10, 10], [2.0, 2.0, 2.0]), [5, 5, 5]);
        assert_eq!(output_dims([8, 8, 8], [1.0, 1.0, 2.0]), [8, 8, 4]);
        assert_eq!(output_dims([10, 10, 10], [0.5, 0.5, 0.5]), [20, 20, 20]);
        // never collapses below one voxel
        assert_eq!(output_dims([3, 3, 3], [100.0, 100.0, 100.0]), [1, 1, 1]);
    }

    #[test]
    fn output_name_derivation() {
        let p = derive_output_path(Path::new("/d/t1w.nii.gz"), Resolution::Isotropic(2.0)).unwrap();
        assert_eq!(p, Path::new("/d/t1w_2000.nii.gz"));
        let p = derive_output_path(Path::new("t1w.nii"), Resolution::Isotropic(0.8)).unwrap();
        assert_eq!(p, Path::new("t1w_0800.nii"));
        let p =
            derive_output_path(Path::new("t1w.nii"), Resolution::Anisotropic([1.0, 1.0, 2.0]))
                .unwrap();
        assert_eq!(p, Path::new("t1w_resampled.nii"));
    }

    #[test]
    fn sample_conversion_rounds_and_clamps() {
        assert_eq!(i16::from_sample(3.6), 4);
        assert_eq!(i16::from_sample(-3.6), -4);
        assert_eq!(u8::from_sample(-2.0), 0);
        assert_eq!(u8::from_sample(300.0), 255);
        assert_eq!(i8::from_sample(f64::NAN), 0);
        assert_eq!(f64::from_sample(3.6), 3.6);
    }

    #[test]
    fn resolution_validation() {
        assert!(Resolution::Isotropic(2.0).per_axis().is_ok());
        assert!(Resolution::Isotropic(0.0).per_axis().is_err());
        assert!(Resolution::Anisotropic([1.0, -1.0, 1.0]).per_axis().is_err());
        assert!(Resolution::Isotropic(f64::NAN).per_axis().is_err());
    }
}
