//! Private key vault: PKCS#8 key → XChaCha20-Poly1305 → haystack
//!
//! The needle buried in the haystack is
//! ```text
//! [4B mem_cost_kib][4B time_cost][4B parallelism]
//! [16B Argon2id salt][24B nonce][ciphertext ‖ 16B tag]
//! ```
//! Argon2id parameters travel with the needle so a vault stays readable after
//! the configured defaults change. The haystack's own salt and password digest
//! are independent of the Argon2id salt.

use atfs_core::{AtfsError, AtfsResult};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};

use crate::haystack::{self, HaystackParams, SALT_LEN};
use crate::kdf::{derive_vault_key, KdfParams};
use crate::keys::KeyPair;
use crate::scrub::Scrubbed;

const NONCE_SIZE: usize = 24;
const PARAMS_LEN: usize = 12;
const NEEDLE_HEADER_LEN: usize = PARAMS_LEN + SALT_LEN + NONCE_SIZE;

/// Everything needed to seal a vault.
#[derive(Debug, Clone, Default)]
pub struct VaultParams {
    pub kdf: KdfParams,
    pub haystack: HaystackParams,
}

impl VaultParams {
    pub fn from_config(cfg: &atfs_core::AtfsConfig) -> Self {
        Self {
            kdf: KdfParams::from_config(&cfg.crypto),
            haystack: HaystackParams {
                inflation_factor: cfg.vault.inflation_factor as usize,
            },
        }
    }
}

fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Encrypt `key`'s private half under `password` and conceal it.
/// `available` is the free space where the vault will be written.
pub fn seal_private_key(
    key: &KeyPair,
    password: &SecretString,
    available: u64,
    params: &VaultParams,
) -> AtfsResult<Vec<u8>> {
    let der = key.private_der()?;

    let kdf_salt = random_salt();
    let vault_key = derive_vault_key(password, &kdf_salt, &params.kdf)?;
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = XChaCha20Poly1305::new(vault_key.as_bytes().into())
        .encrypt(XNonce::from_slice(&nonce), &der[..])
        .map_err(|e| AtfsError::Key(format!("sealing private key failed: {e}")))?;

    let mut needle = Vec::with_capacity(NEEDLE_HEADER_LEN + ciphertext.len());
    needle.extend_from_slice(&params.kdf.mem_cost_kib.to_le_bytes());
    needle.extend_from_slice(&params.kdf.time_cost.to_le_bytes());
    needle.extend_from_slice(&params.kdf.parallelism.to_le_bytes());
    needle.extend_from_slice(&kdf_salt);
    needle.extend_from_slice(&nonce);
    needle.extend_from_slice(&ciphertext);

    let salt = random_salt();
    let digest = haystack::password_digest(password.expose_secret().as_bytes(), &salt);
    haystack::conceal(&needle, &salt, &digest, available, &params.haystack)
}

/// Reveal and decrypt a vault produced by [`seal_private_key`].
pub fn open_private_key(vault: &[u8], password: &SecretString) -> AtfsResult<KeyPair> {
    let needle = haystack::reveal(vault, password.expose_secret().as_bytes())?;
    if needle.len() <= NEEDLE_HEADER_LEN {
        return Err(AtfsError::MalformedVault(format!(
            "needle of {} bytes is too short",
            needle.len()
        )));
    }
    let u32_at = |at: usize| {
        let mut b = [0u8; 4];
        b.copy_from_slice(&needle[at..at + 4]);
        u32::from_le_bytes(b)
    };
    let kdf = KdfParams {
        mem_cost_kib: u32_at(0),
        time_cost: u32_at(4),
        parallelism: u32_at(8),
    };
    let mut kdf_salt = [0u8; SALT_LEN];
    kdf_salt.copy_from_slice(&needle[PARAMS_LEN..PARAMS_LEN + SALT_LEN]);
    let nonce = XNonce::from_slice(&needle[PARAMS_LEN + SALT_LEN..NEEDLE_HEADER_LEN]);

    let vault_key = derive_vault_key(password, &kdf_salt, &kdf)?;
    let der = XChaCha20Poly1305::new(vault_key.as_bytes().into())
        .decrypt(nonce, &needle[NEEDLE_HEADER_LEN..])
        .map(Scrubbed::new)
        .map_err(|_| AtfsError::MalformedVault("sealed private key failed authentication".into()))?;
    tracing::debug!("opened private key vault");
    KeyPair::from_private_der(&der)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn fast() -> VaultParams {
        VaultParams {
            kdf: KdfParams {
                mem_cost_kib: 1024,
                time_cost: 1,
                parallelism: 1,
            },
            haystack: HaystackParams {
                inflation_factor: 8,
            },
        }
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let pair = test_support::alice();
        let pw = SecretString::from("vault password");
        let vault = seal_private_key(pair, &pw, u64::MAX, &fast()).unwrap();
        let restored = open_private_key(&vault, &pw).unwrap();
        assert_eq!(restored.public(), pair.public());
    }

    #[test]
    fn test_wrong_password() {
        let vault = seal_private_key(
            test_support::alice(),
            &SecretString::from("right"),
            u64::MAX,
            &fast(),
        )
        .unwrap();
        assert!(matches!(
            open_private_key(&vault, &SecretString::from("wrong")),
            Err(AtfsError::InvalidPassword)
        ));
    }

    #[test]
    fn test_vault_does_not_contain_der() {
        let pair = test_support::bob();
        let der = pair.private_der().unwrap();
        let vault =
            seal_private_key(pair, &SecretString::from("pw"), u64::MAX, &fast()).unwrap();
        assert!(!vault.windows(32).any(|w| w == &der[..32]));
    }

    #[test]
    fn test_capacity_respected() {
        assert!(matches!(
            seal_private_key(
                test_support::alice(),
                &SecretString::from("pw"),
                512,
                &fast()
            ),
            Err(AtfsError::InsufficientStorage { .. })
        ));
    }

    #[test]
    fn test_tampered_needle_detected() {
        let pw = SecretString::from("pw");
        let mut vault = seal_private_key(test_support::alice(), &pw, u64::MAX, &fast()).unwrap();
        let header = haystack::HaystackHeader::read(&vault).unwrap();
        let last = (header.start + header.needle_len - 1) as usize;
        vault[last] ^= 0x01;
        assert!(matches!(
            open_private_key(&vault, &pw),
            Err(AtfsError::MalformedVault(_))
        ));
    }
}
