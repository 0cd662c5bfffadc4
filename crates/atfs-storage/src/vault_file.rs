//! The haystack vault file

use std::fs;
use std::path::Path;

use atfs_core::{AtfsError, AtfsResult};

use crate::{free_space, write_atomic};

/// Bytes available for a vault at `path`: free space on its filesystem,
/// capped by the configured medium capacity.
pub fn vault_capacity(path: &Path, configured: Option<u64>) -> AtfsResult<u64> {
    let free = free_space(path)?;
    Ok(configured.map_or(free, |cap| cap.min(free)))
}

/// Write a vault, creating parent directories. On Unix the file is
/// owner-only from the moment it is created.
pub fn write_vault(path: &Path, bytes: &[u8], capacity: Option<u64>) -> AtfsResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let available = vault_capacity(path, capacity)?;
    if bytes.len() as u64 > available {
        return Err(AtfsError::InsufficientStorage {
            required: bytes.len() as u64,
            available,
        });
    }
    write_atomic(path, bytes, true)?;
    tracing::debug!(path = %path.display(), len = bytes.len(), "wrote key vault");
    Ok(())
}

pub fn read_vault(path: &Path) -> AtfsResult<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AtfsError::NotFound(path.display().to_string()),
        _ => e.into(),
    })
}
