//! Private utility module
use std::path::Path;

/// Check that the given file path ends in ".gz".
pub fn is_gz_file<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .map(|e| e == "gz")
        .unwrap_or(false)
}

/// Check that the given file path carries a recognized volume extension.
pub fn is_volume_file<P: AsRef<Path>>(path: P) -> bool {
    split_volume_name(path.as_ref()).is_some()
}

/// Split a volume file name into its base name and volume extension.
pub fn split_volume_name(path: &Path) -> Option<(String, &'static str)> {
    let name = path.file_name()?.to_str()?;
    if let Some(stem) = name.strip_suffix(".nii.gz") {
        Some((stem.to_string(), ".nii.gz"))
    } else if let Some(stem) = name.strip_suffix(".nii") {
        Some((stem.to_string(), ".nii"))
    } else {
        None
    }
}

/// Millimeter resolution encoded as a 4-digit micrometer code, e.g.
/// 2.0 -> "2000", 0.8 -> "0800".
pub fn resolution_code(res: f64) -> String {
    format!("{:04}", (res * 1000.0).round() as u32)
}
