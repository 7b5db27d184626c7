mod util;

use std::path::Path;

use approx::assert_abs_diff_eq;
use ndarray::{Array3, Array4, ArrayD, Ix3, ShapeBuilder};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, NiftiType, ReaderOptions};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use niigsp::{GspError, Interpolation, ResampleOptions, Strategy};

use util::synthetic_header;

fn smooth_volume(dim: [usize; 3]) -> Array3<f64> {
    Array3::from_shape_fn(dim.f(), |(i, j, k)| {
        (0.2 * i as f64).sin() + (0.15 * j as f64).cos() + 0.1 * k as f64
    })
}

fn write_input(path: &Path, data: &Array3<f64>, spacing: [f32; 3], origin: [f32; 3]) {
    let dim: Vec<u16> = data.shape().iter().map(|s| *s as u16).collect();
    let header = synthetic_header(&dim, spacing, origin, NiftiType::Float64);
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(data)
        .unwrap();
}

fn read_output(path: &Path) -> (NiftiHeader, ArrayD<f64>) {
    let obj = ReaderOptions::new().read_file(path).unwrap();
    let header = obj.header().clone();
    let data = obj.into_volume().into_ndarray::<f64>().unwrap();
    (header, data)
}

#[test]
fn strategies_agree_on_smooth_data() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("smooth.nii");
    write_input(
        &input,
        &smooth_volume([12, 12, 12]),
        [1.0; 3],
        [-6.0, -6.0, -6.0],
    );

    let a = ResampleOptions::new()
        .output_path(dir.path().join("a.nii"))
        .resample(&input, 2.0)
        .unwrap();
    let b = ResampleOptions::new()
        .memory_safe(false)
        .output_path(dir.path().join("b.nii"))
        .resample(&input, 2.0)
        .unwrap();
    let c = ResampleOptions::new()
        .strategy(Strategy::Slice2d)
        .output_path(dir.path().join("c.nii"))
        .resample(&input, 2.0)
        .unwrap();

    let (_, va) = read_output(&a);
    let (_, vb) = read_output(&b);
    let (_, vc) = read_output(&c);
    assert_eq!(va.shape(), &[6, 6, 6]);
    assert_abs_diff_eq!(va, vb, epsilon = 1e-5);
    assert_abs_diff_eq!(va, vc, epsilon = 1e-5);
}

#[test]
fn identity_roundtrip_is_exact_under_nearest() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("vol.nii");
    let data = smooth_volume([6, 5, 4]);
    write_input(&input, &data, [1.0; 3], [0.0; 3]);

    let out = ResampleOptions::new()
        .interpolation(Interpolation::Nearest)
        .resample(&input, 1.0)
        .unwrap();
    let (_, read) = read_output(&out);
    let read = read.into_dimensionality::<Ix3>().unwrap();
    assert_eq!(read, data);
}

#[test]
fn identity_roundtrip_under_trilinear() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("vol.nii");
    let data = smooth_volume([6, 6, 6]);
    write_input(&input, &data, [1.0; 3], [-3.0; 3]);

    let out = ResampleOptions::new().resample(&input, 1.0).unwrap();
    let (_, read) = read_output(&out);
    let read = read.into_dimensionality::<Ix3>().unwrap();
    assert_abs_diff_eq!(read, data, epsilon = 1e-10);
}

#[test]
fn two_mm_scenario() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("iso.nii");
    write_input(
        &input,
        &smooth_volume([10, 10, 10]),
        [1.0; 3],
        [-5.0, -5.0, -5.0],
    );

    let out = ResampleOptions::new().resample(&input, 2.0).unwrap();
    assert_eq!(out.file_name().unwrap(), "iso_2000.nii");

    let (header, data) = read_output(&out);
    assert_eq!(data.shape(), &[5, 5, 5]);
    assert_eq!(&header.dim[..4], &[3, 5, 5, 5]);
    assert_abs_diff_eq!(header.pixdim[1], 2.0);
    assert_abs_diff_eq!(header.pixdim[2], 2.0);
    assert_abs_diff_eq!(header.pixdim[3], 2.0);

    let affine = header.affine::<f64>();
    assert_abs_diff_eq!(affine[(0, 0)], 2.0, epsilon = 1e-6);
    // the first voxel center stays at the input origin
    assert_abs_diff_eq!(affine[(0, 3)], -5.0, epsilon = 1e-6);
    assert_abs_diff_eq!(affine[(1, 3)], -5.0, epsilon = 1e-6);
    assert_abs_diff_eq!(affine[(2, 3)], -5.0, epsilon = 1e-6);
}

#[test]
fn anisotropic_scenario() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("iso.nii");
    write_input(&input, &smooth_volume([8, 8, 8]), [1.0; 3], [0.0; 3]);

    let out = ResampleOptions::new()
        .resample(&input, [1.0, 1.0, 2.0])
        .unwrap();
    assert_eq!(out.file_name().unwrap(), "iso_resampled.nii");

    let (header, data) = read_output(&out);
    assert_eq!(data.shape(), &[8, 8, 4]);
    assert_abs_diff_eq!(header.pixdim[3], 2.0);
}

#[test]
fn upsampling_with_full3d() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("iso.nii");
    let data = smooth_volume([10, 10, 10]);
    write_input(&input, &data, [1.0; 3], [0.0; 3]);

    let out = ResampleOptions::new().resample(&input, 0.5).unwrap();
    let (_, fine) = read_output(&out);
    assert_eq!(fine.shape(), &[20, 20, 20]);
    // voxel centers shared with the input grid keep their values
    let fine = fine.into_dimensionality::<Ix3>().unwrap();
    assert_abs_diff_eq!(fine[[4, 6, 8]], data[[2, 3, 4]], epsilon = 1e-10);
}

#[test]
fn sign_pattern_preserved_for_flipped_axes() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("flip.nii");
    let data = smooth_volume([8, 8, 8]);
    let dim: Vec<u16> = data.shape().iter().map(|s| *s as u16).collect();
    let mut header = synthetic_header(&dim, [1.0; 3], [12.0, -7.0, 3.0], NiftiType::Float64);
    // radiological x axis: spacing -1, like shape_zoom conventions
    header.srow_x = [-1.0, 0.0, 0.0, 12.0];
    WriterOptions::new(&input)
        .reference_header(&header)
        .write_nifti(&data)
        .unwrap();

    let out = ResampleOptions::new()
        .interpolation(Interpolation::Nearest)
        .resample(&input, 2.0)
        .unwrap();
    let (out_header, _) = read_output(&out);
    let affine = out_header.affine::<f64>();
    assert_abs_diff_eq!(affine[(0, 0)], -2.0, epsilon = 1e-6);
    assert_abs_diff_eq!(affine[(1, 1)], 2.0, epsilon = 1e-6);
    assert_abs_diff_eq!(affine[(0, 3)], 12.0, epsilon = 1e-6);
    assert_abs_diff_eq!(affine[(1, 3)], -7.0, epsilon = 1e-6);
}

#[test]
fn datatype_preserved() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("labels.nii");
    let data = Array3::<i16>::from_shape_fn((6, 6, 6).f(), |(i, j, k)| (i + j + k) as i16);
    let header = synthetic_header(&[6, 6, 6], [1.0; 3], [0.0; 3], NiftiType::Int16);
    WriterOptions::new(&input)
        .reference_header(&header)
        .write_nifti(&data)
        .unwrap();

    let out = ResampleOptions::new()
        .interpolation(Interpolation::Nearest)
        .resample(&input, 2.0)
        .unwrap();
    let (out_header, values) = read_output(&out);
    assert_eq!(out_header.datatype, NiftiType::Int16 as i16);
    assert_eq!(out_header.bitpix, 16);
    let values = values.into_dimensionality::<Ix3>().unwrap();
    assert_eq!(values[[1, 1, 1]], (2 + 2 + 2) as f64);
}

#[test]
fn intensity_scaling_preserved() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("scaled.nii");
    let data = Array3::<f32>::from_shape_fn((6, 6, 6).f(), |(i, j, k)| {
        2.0 * (i + 2 * j + 3 * k) as f32 - 3.0
    });
    let mut header = synthetic_header(&[6, 6, 6], [1.0; 3], [0.0; 3], NiftiType::Float32);
    header.scl_slope = 2.0;
    header.scl_inter = -3.0;
    WriterOptions::new(&input)
        .reference_header(&header)
        .write_nifti(&data)
        .unwrap();

    let out = ResampleOptions::new()
        .interpolation(Interpolation::Nearest)
        .resample(&input, 1.0)
        .unwrap();
    let (out_header, values) = read_output(&out);
    assert_abs_diff_eq!(out_header.scl_slope, 2.0);
    assert_abs_diff_eq!(out_header.scl_inter, -3.0);
    // scaled values survive the round trip
    let values = values.into_dimensionality::<Ix3>().unwrap();
    assert_abs_diff_eq!(values[[2, 1, 3]], 2.0 * 13.0 - 3.0, epsilon = 1e-4);
}

#[test]
fn sheared_affine_rejected() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("sheared.nii");
    let data = smooth_volume([5, 5, 5]);
    let mut header = synthetic_header(&[5, 5, 5], [1.0; 3], [0.0; 3], NiftiType::Float64);
    header.srow_y = [0.0, 1.0, 0.4, 0.0];
    WriterOptions::new(&input)
        .reference_header(&header)
        .write_nifti(&data)
        .unwrap();

    let err = ResampleOptions::new().resample(&input, 2.0).unwrap_err();
    assert!(matches!(err, GspError::UnsupportedAffine));
    // rejected before any output was produced
    assert!(!dir.path().join("sheared_2000.nii").exists());
}

#[test]
fn slice2d_rejects_upsampling() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("iso.nii");
    write_input(&input, &smooth_volume([8, 8, 8]), [1.0; 3], [0.0; 3]);

    let err = ResampleOptions::new()
        .strategy(Strategy::Slice2d)
        .resample(&input, 0.5)
        .unwrap_err();
    assert!(matches!(err, GspError::Unsupported(_)));
}

#[test]
fn unknown_extension_rejected() {
    let err = ResampleOptions::new()
        .resample("measurements.txt", 2.0)
        .unwrap_err();
    assert!(matches!(err, GspError::UnknownFormat(_)));
}

#[test]
fn bad_resolution_rejected_before_reading() {
    // the path does not exist; validation must fire first
    let err = ResampleOptions::new()
        .resample("missing.nii", 0.0)
        .unwrap_err();
    assert!(matches!(err, GspError::BadResolution(_)));
    let err = ResampleOptions::new()
        .resample("missing.nii", [1.0, -2.0, 1.0])
        .unwrap_err();
    assert!(matches!(err, GspError::BadResolution(_)));
}

#[test]
fn gz_output_mirrors_gz_input() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("smooth.nii.gz");
    write_input(&input, &smooth_volume([10, 10, 10]), [1.0; 3], [0.0; 3]);

    let out = ResampleOptions::new().resample(&input, 2.0).unwrap();
    assert_eq!(out.file_name().unwrap(), "smooth_2000.nii.gz");

    let (_, data) = read_output(&out);
    assert_eq!(data.shape(), &[5, 5, 5]);
}

#[test]
fn frames_resampled_independently() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bold.nii");
    let data = Array4::<f64>::from_shape_fn((6, 6, 6, 3).f(), |(_, _, _, f)| (f + 1) as f64);
    let header = synthetic_header(&[6, 6, 6, 3], [1.0; 3], [0.0; 3], NiftiType::Float64);
    WriterOptions::new(&input)
        .reference_header(&header)
        .write_nifti(&data)
        .unwrap();

    let out = ResampleOptions::new()
        .interpolation(Interpolation::Nearest)
        .resample(&input, 2.0)
        .unwrap();
    let (out_header, values) = read_output(&out);
    assert_eq!(values.shape(), &[3, 3, 3, 3]);
    assert_eq!(&out_header.dim[..5], &[4, 3, 3, 3, 3]);
    for f in 0..3 {
        for k in 0..3 {
            for j in 0..3 {
                for i in 0..3 {
                    assert_eq!(values[[i, j, k, f]], (f + 1) as f64);
                }
            }
        }
    }
}
