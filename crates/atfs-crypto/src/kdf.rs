//! Key derivation: Argon2id password → vault key

use argon2::{Algorithm, Argon2, Params, Version};
use atfs_core::{AtfsError, AtfsResult};
use secrecy::{ExposeSecret, SecretString};

use crate::scrub::scrub;

/// Size of a vault key in bytes (256-bit)
pub const VAULT_KEY_SIZE: usize = 32;

/// A 256-bit key that encrypts the private key before it is concealed.
///
/// Overwritten with random bytes on drop.
pub struct VaultKey {
    bytes: [u8; VAULT_KEY_SIZE],
}

impl VaultKey {
    pub fn as_bytes(&self) -> &[u8; VAULT_KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for VaultKey {
    fn drop(&mut self) {
        scrub(&mut self.bytes);
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Iterations (default: 3)
    pub time_cost: u32,
    /// Lanes (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    pub fn from_config(cfg: &atfs_core::config::CryptoConfig) -> Self {
        Self {
            mem_cost_kib: cfg.argon2_mem_cost_kib,
            time_cost: cfg.argon2_time_cost,
            parallelism: cfg.argon2_parallelism,
        }
    }
}

/// Derive a vault key from a password and a 16-byte random salt.
pub fn derive_vault_key(
    password: &SecretString,
    salt: &[u8; 16],
    params: &KdfParams,
) -> AtfsResult<VaultKey> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(VAULT_KEY_SIZE),
    )
    .map_err(|e| AtfsError::Config(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut bytes = [0u8; VAULT_KEY_SIZE];
    argon2
        .hash_password_into(password.expose_secret().as_bytes(), salt, &mut bytes)
        .map_err(|e| AtfsError::Key(format!("Argon2id failed: {e}")))?;

    Ok(VaultKey { bytes })
}
