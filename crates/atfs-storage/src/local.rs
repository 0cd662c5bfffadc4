//! Local directory holding `.at` containers
//!
//! Layout: `{root}/{hex(encrypted name)}.at`, flat. Writes go through a
//! `.{name}.tmp` sibling and a rename. Free space on the root's filesystem,
//! capped by an optional quota, is checked again right before every write;
//! a device that fills up in between surfaces as `InsufficientStorage`.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use atfs_core::{AtfsError, AtfsResult};
use atfs_crypto::{container, names};
use rand::RngCore;

use crate::{check_root, free_space, write_atomic};

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    quota: Option<u64>,
}

impl LocalStore {
    /// Open an existing directory. `quota` is the byte budget for
    /// containers; `None` means unbounded.
    pub fn open(root: impl Into<PathBuf>, quota: Option<u64>) -> AtfsResult<Self> {
        let root = root.into();
        check_root(&root)?;
        Ok(LocalStore { root, quota })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for a stored name, rejecting anything that is not `<hex>.at`.
    fn path_for(&self, name: &str) -> AtfsResult<PathBuf> {
        names::parse_stored_name(name)?;
        Ok(self.root.join(name))
    }

    /// Total size of the containers currently stored.
    pub fn used_bytes(&self) -> AtfsResult<u64> {
        let mut total = 0u64;
        for entry in self.entries()? {
            total += entry.1;
        }
        Ok(total)
    }

    /// Bytes that can still be stored: free space on the root's filesystem,
    /// further capped by the remaining quota if there is one.
    pub fn available_bytes(&self) -> AtfsResult<u64> {
        let free = free_space(&self.root)?;
        match self.quota {
            None => Ok(free),
            Some(quota) => Ok(quota.saturating_sub(self.used_bytes()?).min(free)),
        }
    }

    fn ensure_capacity(&self, required: u64) -> AtfsResult<()> {
        check_root(&self.root)?;
        let available = self.available_bytes()?;
        if required > available {
            tracing::warn!(required, available, "not enough space in storage root");
            return Err(AtfsError::InsufficientStorage {
                required,
                available,
            });
        }
        Ok(())
    }

    fn entries(&self) -> AtfsResult<Vec<(String, u64)>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if names::parse_stored_name(&name).is_ok() {
                out.push((name, meta.len()));
            }
        }
        out.sort();
        Ok(out)
    }

    /// Store a new container under its encrypted name and return that name.
    pub fn put(&self, bytes: &[u8]) -> AtfsResult<String> {
        let name = container::encrypted_name(bytes)?;
        let path = self.path_for(&name)?;
        if path.exists() {
            return Err(AtfsError::InvalidName(format!("{name} already exists")));
        }
        self.ensure_capacity(bytes.len() as u64)?;
        write_atomic(&path, bytes, false)?;
        tracing::debug!(%name, len = bytes.len(), "stored container");
        Ok(name)
    }

    pub fn get(&self, name: &str) -> AtfsResult<Vec<u8>> {
        let path = self.path_for(name)?;
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => AtfsError::NotFound(name.to_string()),
            _ => e.into(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Stored names in ascending order.
    pub fn list(&self) -> AtfsResult<Vec<String>> {
        Ok(self.entries()?.into_iter().map(|(name, _)| name).collect())
    }

    /// Overwrite an existing container, e.g. after its descriptor changed.
    pub fn replace(&self, name: &str, bytes: &[u8]) -> AtfsResult<()> {
        let path = self.path_for(name)?;
        let old_len = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AtfsError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        self.ensure_capacity((bytes.len() as u64).saturating_sub(old_len))?;
        write_atomic(&path, bytes, false)?;
        tracing::debug!(%name, len = bytes.len(), "replaced container");
        Ok(())
    }

    /// Overwrite the container with random bytes, then unlink it.
    pub fn remove(&self, name: &str) -> AtfsResult<()> {
        let path = self.path_for(name)?;
        let len = match fs::metadata(&path) {
            Ok(meta) => meta.len() as usize,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AtfsError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let mut noise = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut noise);
        let mut file = fs::OpenOptions::new().write(true).open(&path)?;
        file.write_all(&noise)?;
        file.sync_all()?;
        drop(file);
        fs::remove_file(&path)?;
        tracing::debug!(%name, "removed container");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            LocalStore::open(dir.path().join("nope"), None),
            Err(AtfsError::StorageUnavailable(_))
        ));
    }

    #[test]
    fn test_path_for_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        assert!(store.path_for("../etc/passwd").is_err());
        assert!(store.path_for("../00.at").is_err());
        assert!(store.path_for("00ff.at").is_ok());
    }

    #[test]
    fn test_available_without_quota_is_free_space() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        let available = store.available_bytes().unwrap();
        assert!(available > 0);
        assert!(available < u64::MAX);
    }

    #[test]
    fn test_put_larger_than_device_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        let free = free_space(dir.path()).unwrap();
        assert!(matches!(
            store.ensure_capacity(free.saturating_mul(2).max(1)),
            Err(AtfsError::InsufficientStorage { .. })
        ));
    }

    #[test]
    fn test_quota_accounting_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("abcd.at"), vec![0u8; 100]).unwrap();
        fs::write(dir.path().join("notes.txt"), vec![0u8; 500]).unwrap();
        let store = LocalStore::open(dir.path(), Some(1000)).unwrap();
        assert_eq!(store.used_bytes().unwrap(), 100);
        assert_eq!(store.available_bytes().unwrap(), 900);
        assert_eq!(store.list().unwrap(), vec!["abcd.at".to_string()]);
    }

    #[test]
    fn test_remove_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        assert!(matches!(
            store.remove("abcd.at"),
            Err(AtfsError::NotFound(_))
        ));
        assert!(matches!(store.get("abcd.at"), Err(AtfsError::NotFound(_))));
    }

    #[test]
    fn test_remove_unlinks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("abcd.at"), b"secret container").unwrap();
        let store = LocalStore::open(dir.path(), None).unwrap();
        store.remove("abcd.at").unwrap();
        assert!(!store.contains("abcd.at"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_replace_checks_growth_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("abcd.at"), vec![1u8; 90]).unwrap();
        let store = LocalStore::open(dir.path(), Some(100)).unwrap();
        // +10 bytes fits exactly
        store.replace("abcd.at", &[2u8; 100]).unwrap();
        assert!(matches!(
            store.replace("abcd.at", &[3u8; 101]),
            Err(AtfsError::InsufficientStorage { .. })
        ));
        assert_eq!(store.get("abcd.at").unwrap(), vec![2u8; 100]);
    }
}
