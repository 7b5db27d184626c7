//! Error types.

use std::io::Error as IOError;
use std::path::PathBuf;

quick_error! {
    /// Error enumeration for every fallible operation in this crate.
    #[derive(Debug)]
    pub enum GspError {
        /// The file path does not carry a recognized volume extension.
        UnknownFormat(path: PathBuf) {
            display("unrecognized volume file format: {}", path.display())
        }
        /// The volume's affine is sheared or rotated. Only axis-aligned
        /// affines, diagonal up to the translation column, are supported.
        UnsupportedAffine {
            display("volume affine is not axis-aligned")
        }
        /// The requested operation is not available with the selected options.
        Unsupported(reason: String) {
            display("unsupported operation: {}", reason)
        }
        /// Target resolution was zero, negative or not finite.
        BadResolution(value: f64) {
            display("invalid target resolution: {} mm", value)
        }
        /// The volume is not registered to the reference graph space.
        SpaceMismatch(reason: String) {
            display("volume does not match the reference space: {}", reason)
        }
        /// Attempted to read a voxel or frame outside the volume boundaries.
        OutOfBounds(index: usize) {
            display("index {} is out of bounds", index)
        }
        /// Volumes of this datatype cannot be resampled.
        UnsupportedDataType(code: i16) {
            display("unsupported data type (code {})", code)
        }
        /// I/O error.
        Io(err: IOError) {
            from()
            source(err)
            display("I/O error: {}", err)
        }
        /// Error reported by the NIfTI format layer.
        Nifti(err: nifti::NiftiError) {
            from()
            source(err)
            display("{}", err)
        }
    }
}

/// Alias type for results originated from this crate.
pub type Result<T> = ::std::result::Result<T, GspError>;
