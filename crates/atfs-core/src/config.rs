use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AtfsError, AtfsResult};

/// Top-level configuration (loaded from atfs.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtfsConfig {
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub vault: VaultConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the `.at` containers
    pub root: PathBuf,
    /// Upper bound on bytes stored under `root` (unbounded if unset)
    pub quota_bytes: Option<u64>,
}

/// Cipher defaults and key-derivation cost
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Cipher identifier used when none is given (default: AES-256-CBC)
    pub default_cipher: String,
    /// Hash identifier used when none is given (default: SHA256)
    pub default_hash: String,
    /// RSA modulus size for newly generated key pairs
    pub rsa_bits: usize,
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
}

/// Needle-in-haystack private key vault
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Haystack file holding the concealed private key
    pub path: PathBuf,
    /// PEM file with the matching public key
    pub public_key_path: PathBuf,
    /// Haystack size as a multiple of the needle length (before random margin)
    pub inflation_factor: u32,
    /// Capacity of the medium the vault is written to (unbounded if unset)
    pub capacity_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("~/.local/share/atfs/store"),
            quota_bytes: None,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            default_cipher: "AES-256-CBC".into(),
            default_hash: "SHA256".into(),
            rsa_bits: 2048,
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.config/atfs/key.vault"),
            public_key_path: PathBuf::from("~/.config/atfs/key.pub.pem"),
            inflation_factor: 256,
            capacity_bytes: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl AtfsConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist. Callers report the fallback once logging is up.
    pub fn load(path: &Path) -> AtfsResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: AtfsConfig = toml::from_str(&content)
            .map_err(|e| AtfsError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no operation could work with.
    ///
    /// Identifier names are only checked for length here; the registry in
    /// atfs-crypto decides whether they name a supported algorithm.
    pub fn validate(&self) -> AtfsResult<()> {
        if self.crypto.default_cipher.is_empty() || self.crypto.default_cipher.len() > 13 {
            return Err(AtfsError::Config(format!(
                "crypto.default_cipher must be 1..=13 characters, got {:?}",
                self.crypto.default_cipher
            )));
        }
        if self.crypto.default_hash.is_empty() || self.crypto.default_hash.len() > 10 {
            return Err(AtfsError::Config(format!(
                "crypto.default_hash must be 1..=10 characters, got {:?}",
                self.crypto.default_hash
            )));
        }
        if !matches!(self.crypto.rsa_bits, 2048 | 3072 | 4096) {
            return Err(AtfsError::Config(format!(
                "crypto.rsa_bits must be 2048, 3072 or 4096, got {}",
                self.crypto.rsa_bits
            )));
        }
        if self.vault.inflation_factor < 2 {
            return Err(AtfsError::Config(
                "vault.inflation_factor must be at least 2".into(),
            ));
        }
        if !matches!(self.log.format.as_str(), "json" | "text") {
            return Err(AtfsError::Config(format!(
                "log.format must be \"json\" or \"text\", got {:?}",
                self.log.format
            )));
        }
        Ok(())
    }
}

/// Expand a leading `~/` to `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
