//! File Encryption Key (FEK) and its RSA envelope
//!
//! Cleartext envelope body (little-endian), before RSA-OAEP(SHA-256):
//! ```text
//! [1B cipher id len][cipher id ASCII]
//! [1B hash id len][hash id ASCII]
//! [4B key+iv len][key][iv]
//! ```
//! The IV length is not stored; it is re-derived from the cipher id
//! (16 bytes for AES/2FISH/CAMLL, 8 for 3DES, none for ECB).
//!
//! The wrapped envelope is always exactly the recipient's modulus size. OAEP
//! padding is checked on unwrap, so a mismatched private key is reported as
//! `DecryptionFailed` instead of yielding a garbage key.

use atfs_core::{AtfsError, AtfsResult};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::cursor::{put_u32_prefixed, put_u8_prefixed, Cursor, Truncated};
use crate::hash::HashId;
use crate::registry::{CipherId, CipherSuite};
use crate::scrub::Scrubbed;

/// Per-file symmetric key, IV and algorithm choice.
#[derive(Clone)]
pub struct Fek {
    suite: CipherSuite,
    hash: HashId,
}

impl Fek {
    /// Fresh random key and IV sized for `cipher`.
    pub fn generate(cipher: CipherId, hash: HashId) -> Self {
        Fek {
            suite: CipherSuite::generate(cipher),
            hash,
        }
    }

    pub fn from_suite(suite: CipherSuite, hash: HashId) -> Self {
        Fek { suite, hash }
    }

    pub fn cipher(&self) -> CipherId {
        self.suite.id()
    }

    pub fn hash(&self) -> HashId {
        self.hash
    }

    pub fn suite(&self) -> &CipherSuite {
        &self.suite
    }

    /// Key followed by IV (IV omitted for ECB).
    pub fn key_and_iv(&self) -> Scrubbed {
        let mut out = Vec::with_capacity(self.cipher().key_len() + self.cipher().iv_len());
        out.extend_from_slice(self.suite.key());
        if let Some(iv) = self.suite.iv() {
            out.extend_from_slice(iv);
        }
        Scrubbed::new(out)
    }

    fn encode(&self) -> Scrubbed {
        let cipher = self.cipher().to_string();
        let key_and_iv = self.key_and_iv();
        // sized up front so the buffer never reallocates and leaves a copy
        let mut out =
            Vec::with_capacity(2 + cipher.len() + self.hash.name().len() + 4 + key_and_iv.len());
        put_u8_prefixed(&mut out, cipher.as_bytes());
        put_u8_prefixed(&mut out, self.hash.name().as_bytes());
        put_u32_prefixed(&mut out, &key_and_iv);
        Scrubbed::new(out)
    }

    fn decode(body: &[u8]) -> AtfsResult<Self> {
        let truncated = |t: Truncated| AtfsError::EnvelopeCorrupt(t.to_string());

        let cur = Cursor::new(body);
        let (cipher, cur) = cur.read_u8_prefixed().map_err(truncated)?;
        let (hash, cur) = cur.read_u8_prefixed().map_err(truncated)?;
        let (key_and_iv, cur) = cur.read_u32_prefixed().map_err(truncated)?;
        if !cur.is_empty() {
            return Err(AtfsError::EnvelopeCorrupt(format!(
                "{} trailing bytes",
                cur.remaining()
            )));
        }

        let cipher = std::str::from_utf8(cipher)
            .ok()
            .and_then(|s| CipherId::parse(s).ok())
            .ok_or_else(|| AtfsError::EnvelopeCorrupt("unreadable cipher id".into()))?;
        let hash = std::str::from_utf8(hash)
            .ok()
            .and_then(|s| HashId::parse(s).ok())
            .ok_or_else(|| AtfsError::EnvelopeCorrupt("unreadable hash id".into()))?;

        let key_len = cipher.key_len();
        if key_and_iv.len() != key_len + cipher.iv_len() {
            return Err(AtfsError::EnvelopeCorrupt(format!(
                "{cipher} expects {} key+iv bytes, envelope has {}",
                key_len + cipher.iv_len(),
                key_and_iv.len()
            )));
        }
        let (key, iv) = key_and_iv.split_at(key_len);
        let iv = cipher.mode().uses_iv().then_some(iv);
        let suite = CipherSuite::from_parts(cipher, key, iv)
            .map_err(|e| AtfsError::EnvelopeCorrupt(e.to_string()))?;
        Ok(Fek { suite, hash })
    }

    /// Encrypt this FEK for one recipient.
    pub fn wrap(&self, recipient: &RsaPublicKey) -> AtfsResult<Vec<u8>> {
        let body = self.encode();
        recipient
            .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha256>(), &body)
            .map_err(|e| AtfsError::Key(format!("wrapping file key failed: {e}")))
    }

    /// Decrypt an envelope produced by [`Fek::wrap`].
    pub fn unwrap(envelope: &[u8], recipient: &RsaPrivateKey) -> AtfsResult<Self> {
        if envelope.len() != recipient.size() {
            return Err(AtfsError::EnvelopeCorrupt(format!(
                "envelope is {} bytes, key modulus is {}",
                envelope.len(),
                recipient.size()
            )));
        }
        let body = recipient
            .decrypt(Oaep::new::<Sha256>(), envelope)
            .map(Scrubbed::new)
            .map_err(|_| AtfsError::DecryptionFailed)?;
        Self::decode(&body)
    }
}

impl PartialEq for Fek {
    fn eq(&self, other: &Self) -> bool {
        self.cipher() == other.cipher()
            && self.hash == other.hash
            && bool::from(self.key_and_iv().ct_eq(&other.key_and_iv()))
    }
}

impl Eq for Fek {}

impl std::fmt::Debug for Fek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fek")
            .field("cipher", &self.cipher().to_string())
            .field("hash", &self.hash.name())
            .field("key", &"[REDACTED]")
            .finish()
    }
}
