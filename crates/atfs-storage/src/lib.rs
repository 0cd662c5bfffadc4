//! atfs-storage: where `.at` containers and the key vault live on disk

pub mod health;
pub mod local;
pub mod vault_file;

pub use health::{check_root, is_available};
pub use local::LocalStore;
pub use vault_file::{read_vault, vault_capacity, write_vault};

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use atfs_core::{AtfsError, AtfsResult};

/// Free bytes on the filesystem holding `path`. A path that does not exist
/// yet is measured at its nearest existing ancestor.
pub fn free_space(path: &Path) -> AtfsResult<u64> {
    let existing = path
        .ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .unwrap_or_else(|| Path::new("."));
    Ok(fs2::available_space(existing)?)
}

/// ENOSPC and its Windows equivalents. `ErrorKind::StorageFull` needs a newer
/// toolchain than the workspace targets.
fn is_out_of_space(e: &io::Error) -> bool {
    #[cfg(unix)]
    let codes: &[i32] = &[28];
    #[cfg(windows)]
    let codes: &[i32] = &[39, 112];
    #[cfg(not(any(unix, windows)))]
    let codes: &[i32] = &[];
    e.raw_os_error().is_some_and(|code| codes.contains(&code))
}

/// Turn a failed write of `required` bytes next to `path` into an
/// `AtfsError`; running out of space becomes `InsufficientStorage`.
pub(crate) fn write_error(e: io::Error, path: &Path, required: u64) -> AtfsError {
    if is_out_of_space(&e) {
        let available = free_space(path).unwrap_or(0);
        tracing::warn!(required, available, path = %path.display(), "device full during write");
        return AtfsError::InsufficientStorage {
            required,
            available,
        };
    }
    e.into()
}

/// Write `data` next to `path` and rename it into place, so readers see
/// either the old file or the complete new one. With `owner_only` the
/// temporary file is created 0600 before any byte is written (Unix).
pub(crate) fn write_atomic(path: &Path, data: &[u8], owner_only: bool) -> AtfsResult<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    let result = (|| {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            if owner_only {
                options.mode(0o600);
            }
        }
        #[cfg(not(unix))]
        let _ = owner_only;
        // a stale temp file would keep its old permissions
        match fs::remove_file(&tmp) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        let mut file = options.open(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map_err(|e| write_error(e, path, data.len() as u64))
}
