//! RSA key pairs: generation and PKCS#8 / SPKI import-export

use atfs_core::{AtfsError, AtfsResult};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::scrub::Scrubbed;

/// Modulus sizes accepted for new key pairs.
pub const SUPPORTED_BITS: [usize; 3] = [2048, 3072, 4096];

/// Smallest modulus accepted when importing a key.
pub const MIN_IMPORT_BITS: usize = 2048;

/// An owner's asymmetric key pair. The private half never leaves memory
/// except through [`KeyPair::private_der`], which returns a scrubbed buffer.
#[derive(Clone)]
pub struct KeyPair {
    public: RsaPublicKey,
    private: RsaPrivateKey,
}

impl KeyPair {
    pub fn generate(bits: usize) -> AtfsResult<Self> {
        if !SUPPORTED_BITS.contains(&bits) {
            return Err(AtfsError::UnsupportedKeySize(bits));
        }
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
            .map_err(|e| AtfsError::Key(format!("RSA key generation failed: {e}")))?;
        tracing::debug!(bits, "generated RSA key pair");
        Ok(Self::from_private(private))
    }

    pub fn from_private(private: RsaPrivateKey) -> Self {
        KeyPair {
            public: private.to_public_key(),
            private,
        }
    }

    pub fn public(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn private(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// Modulus size in bytes; every envelope and signature has this length.
    pub fn modulus_len(&self) -> usize {
        self.public.size()
    }

    pub fn bits(&self) -> usize {
        self.modulus_len() * 8
    }

    /// PKCS#8 DER encoding of the private key.
    pub fn private_der(&self) -> AtfsResult<Scrubbed> {
        let doc = self
            .private
            .to_pkcs8_der()
            .map_err(|e| AtfsError::Key(format!("PKCS#8 encoding failed: {e}")))?;
        Ok(Scrubbed::from_slice(doc.as_bytes()))
    }

    pub fn from_private_der(der: &[u8]) -> AtfsResult<Self> {
        let private = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| AtfsError::Key(format!("PKCS#8 decoding failed: {e}")))?;
        check_import_size(&private.to_public_key())?;
        Ok(Self::from_private(private))
    }

    pub fn public_pem(&self) -> AtfsResult<String> {
        public_key_to_pem(&self.public)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.bits())
            .field("private", &"[REDACTED]")
            .finish()
    }
}

pub fn public_key_to_pem(key: &RsaPublicKey) -> AtfsResult<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| AtfsError::Key(format!("SPKI encoding failed: {e}")))
}

pub fn public_key_from_pem(pem: &str) -> AtfsResult<RsaPublicKey> {
    let key = RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| AtfsError::Key(format!("SPKI decoding failed: {e}")))?;
    check_import_size(&key)?;
    Ok(key)
}

pub fn public_key_to_der(key: &RsaPublicKey) -> AtfsResult<Vec<u8>> {
    key.to_public_key_der()
        .map(|doc| doc.as_bytes().to_vec())
        .map_err(|e| AtfsError::Key(format!("SPKI encoding failed: {e}")))
}

pub fn public_key_from_der(der: &[u8]) -> AtfsResult<RsaPublicKey> {
    let key = RsaPublicKey::from_public_key_der(der)
        .map_err(|e| AtfsError::Key(format!("SPKI decoding failed: {e}")))?;
    check_import_size(&key)?;
    Ok(key)
}

fn check_import_size(key: &RsaPublicKey) -> AtfsResult<()> {
    let bits = key.size() * 8;
    if bits < MIN_IMPORT_BITS {
        return Err(AtfsError::UnsupportedKeySize(bits));
    }
    Ok(())
}
