//! Storage root availability

use std::path::Path;

use atfs_core::{AtfsError, AtfsResult};

/// The root must exist, be a directory, and accept writes.
pub fn check_root(root: &Path) -> AtfsResult<()> {
    let meta = std::fs::metadata(root).map_err(|e| {
        tracing::warn!(root = %root.display(), error = %e, "storage root missing");
        AtfsError::StorageUnavailable(root.to_path_buf())
    })?;
    if !meta.is_dir() || meta.permissions().readonly() {
        tracing::warn!(root = %root.display(), "storage root is not a writable directory");
        return Err(AtfsError::StorageUnavailable(root.to_path_buf()));
    }
    Ok(())
}

/// Non-failing form of [`check_root`].
pub fn is_available(root: &Path) -> bool {
    check_root(root).is_ok()
}
