//! Utilities for processing NIfTI volumes registered to a graph domain.
//!
//! This crate covers the two volume-side operations of a graph signal
//! processing pipeline for brain imaging data:
//!
//! - resampling a volume onto a coarser or finer voxel grid
//!   ([`resample::ResampleOptions`]), via affine composition and a choice of
//!   interpolation kernels and execution strategies;
//! - extracting graph signals, one value per graph node and frame, from a
//!   volume registered to a reference voxel grid ([`gsig::GsigOptions`]).
//!
//! Reading and writing of the NIfTI format itself is delegated to the
//! [`nifti`] crate.
//!
//! # Example
//!
//! ```no_run
//! use niigsp::ResampleOptions;
//! # use niigsp::Result;
//!
//! # fn run() -> Result<()> {
//! // 2 mm isotropic, trilinear, derived output name ("t1w_2000.nii.gz")
//! let out = ResampleOptions::new().resample("t1w.nii.gz", 2.0)?;
//! println!("wrote {}", out.display());
//! # Ok(())
//! # }
//! ```
#![deny(missing_debug_implementations)]
#![warn(missing_docs, unused_extern_crates, trivial_casts)]

#[macro_use]
extern crate quick_error;

pub mod affine;
pub mod error;
pub mod gsig;
pub mod interp;
pub mod resample;
pub mod scratch;
mod util;

pub use affine::Affine4;
pub use error::{GspError, Result};
pub use gsig::{GraphSpace, GsigOptions};
pub use interp::Interpolation;
pub use resample::{ResampleOptions, Resolution, Strategy};
pub use scratch::WorkingCopy;
