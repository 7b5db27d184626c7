use nifti::{NiftiHeader, NiftiType};

/// Header for a synthetic volume on an axis-aligned grid.
pub fn synthetic_header(
    dim: &[u16],
    spacing: [f32; 3],
    origin: [f32; 3],
    datatype: NiftiType,
) -> NiftiHeader {
    let mut d = [1u16; 8];
    d[0] = dim.len() as u16;
    for (i, s) in dim.iter().enumerate() {
        d[i + 1] = *s;
    }
    let mut pixdim = [0.0f32; 8];
    for i in 0..3 {
        pixdim[i + 1] = spacing[i];
    }
    if dim.len() > 3 {
        pixdim[4] = 1.0;
    }
    NiftiHeader {
        dim: d,
        pixdim,
        datatype: datatype as i16,
        bitpix: (datatype.size_of() * 8) as i16,
        srow_x: [spacing[0], 0.0, 0.0, origin[0]],
        srow_y: [0.0, spacing[1], 0.0, origin[1]],
        srow_z: [0.0, 0.0, spacing[2], origin[2]],
        sform_code: 2,
        qform_code: 0,
        scl_slope: 1.0,
        scl_inter: 0.0,
        magic: *nifti::header::MAGIC_CODE_NIP1,
        ..NiftiHeader::default()
    }
}
