//! Scoped uncompressed working copies of gzipped volumes.
//!
//! Some collaborating tools can only read plain `.nii` files. A
//! [`WorkingCopy`] expands a gzipped input into the system temp directory
//! and removes the copy when dropped, on every exit path. Uncompressed
//! inputs are passed through untouched.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::bufread::GzDecoder;

use crate::error::Result;
use crate::util::is_gz_file;

/// An uncompressed view of a volume file.
///
/// Holds a decompressed copy for gzipped inputs; the copy is deleted when
/// this value is dropped. For plain inputs the original path is used as is
/// and nothing is ever deleted.
#[derive(Debug)]
pub struct WorkingCopy {
    path: PathBuf,
    owned: bool,
}

impl WorkingCopy {
    /// Make the file at `path` readable as an uncompressed volume.
    ///
    /// If decompression fails, no file is left behind.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<WorkingCopy> {
        let path = path.as_ref();
        if !is_gz_file(path) {
            return Ok(WorkingCopy {
                path: path.to_path_buf(),
                owned: false,
            });
        }
        let target = unpack_target(path);
        let mut reader = GzDecoder::new(BufReader::new(File::open(path)?));
        let mut writer = BufWriter::new(File::create(&target)?);
        match io::copy(&mut reader, &mut writer) {
            Ok(_) => Ok(WorkingCopy {
                path: target,
                owned: true,
            }),
            Err(e) => {
                drop(writer);
                let _ = fs::remove_file(&target);
                Err(e.into())
            }
        }
    }

    /// Path of the readable, uncompressed file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a temporary copy was created for this input.
    pub fn is_temporary(&self) -> bool {
        self.owned
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if self.owned {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn unpack_target(input: &Path) -> PathBuf {
    // "x.nii.gz" -> "<tmp>/<pid>.x.nii"
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("volume.nii");
    std::env::temp_dir().join(format!("{}.{}", std::process::id(), stem))
}
