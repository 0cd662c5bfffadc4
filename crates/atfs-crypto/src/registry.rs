//! Cipher registry: identifier strings ⇄ symmetric cipher instances
//!
//! Identifiers have the form `<ALGO>-<BITS>-<MODE>` (AES, 2FISH, CAMLL) or
//! `<ALGO>-<MODE>` (3DES, fixed three-key EDE). At most 13 characters.
//!
//! | algorithm | code    | key bits      | block / IV |
//! |-----------|---------|---------------|------------|
//! | AES       | `AES`   | 128, 192, 256 | 16         |
//! | Twofish   | `2FISH` | 128, 192, 256 | 16         |
//! | Camellia  | `CAMLL` | 128, 192, 256 | 16         |
//! | 3DES-EDE3 | `3DES`  | 192           | 8          |
//!
//! ECB and CBC pad with PKCS#7; CFB and OFB are stream modes without padding.
//! ECB carries no IV.

use aes::{Aes128, Aes192, Aes256};
use atfs_core::{AtfsError, AtfsResult};
use camellia::{Camellia128, Camellia192, Camellia256};
use cipher::{
    block_padding::Pkcs7,
    crypto_common::InnerInit,
    typenum::{IsLess, Le, NonZero, U256},
    AsyncStreamCipher, BlockCipher, BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut,
    InnerIvInit, KeyInit, StreamCipher,
};
use des::TdesEde3;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use twofish::Twofish;

use crate::scrub::scrub;

/// Symmetric algorithm families the registry knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Aes,
    Twofish,
    Camellia,
    TripleDes,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Aes,
        Algorithm::Twofish,
        Algorithm::Camellia,
        Algorithm::TripleDes,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Algorithm::Aes => "AES",
            Algorithm::Twofish => "2FISH",
            Algorithm::Camellia => "CAMLL",
            Algorithm::TripleDes => "3DES",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.code() == code)
    }

    /// Block size in bytes; also the IV length for every mode but ECB.
    pub fn block_size(self) -> usize {
        match self {
            Algorithm::Aes | Algorithm::Twofish | Algorithm::Camellia => 16,
            Algorithm::TripleDes => 8,
        }
    }

    /// Whether the key size is part of the identifier.
    fn has_variable_key(self) -> bool {
        !matches!(self, Algorithm::TripleDes)
    }

    fn supports_key_bits(self, bits: u16) -> bool {
        match self {
            Algorithm::TripleDes => bits == 192,
            _ => matches!(bits, 128 | 192 | 256),
        }
    }
}

/// Block cipher mode of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Ecb,
    Cbc,
    Cfb,
    Ofb,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Ecb, Mode::Cbc, Mode::Cfb, Mode::Ofb];

    pub fn name(self) -> &'static str {
        match self {
            Mode::Ecb => "ECB",
            Mode::Cbc => "CBC",
            Mode::Cfb => "CFB",
            Mode::Ofb => "OFB",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    pub fn uses_iv(self) -> bool {
        !matches!(self, Mode::Ecb)
    }
}

/// A parsed, validated cipher identifier such as `AES-256-CBC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherId {
    algorithm: Algorithm,
    key_bits: u16,
    mode: Mode,
}

impl CipherId {
    /// Longest identifier accepted.
    pub const MAX_LEN: usize = 13;

    pub fn new(algorithm: Algorithm, key_bits: u16, mode: Mode) -> AtfsResult<Self> {
        if !algorithm.supports_key_bits(key_bits) {
            return Err(AtfsError::UnsupportedCipher(format!(
                "{}-{key_bits}-{}",
                algorithm.code(),
                mode.name()
            )));
        }
        Ok(CipherId {
            algorithm,
            key_bits,
            mode,
        })
    }

    /// Resolve an identifier string.
    ///
    /// Length is checked first, so an over-long string is always
    /// `MalformedIdentifier` even if its parts are unknown.
    pub fn parse(s: &str) -> AtfsResult<Self> {
        if s.is_empty() || s.len() > Self::MAX_LEN || !s.is_ascii() {
            return Err(AtfsError::MalformedIdentifier(s.to_string()));
        }
        let upper = s.to_ascii_uppercase();
        let parts: Vec<&str> = upper.split('-').collect();
        let unsupported = || AtfsError::UnsupportedCipher(s.to_string());

        let (algorithm, key_bits, mode) = match parts.as_slice() {
            [algo, mode] => {
                let algorithm = Algorithm::from_code(algo).ok_or_else(unsupported)?;
                if algorithm.has_variable_key() {
                    return Err(unsupported());
                }
                (algorithm, 192, *mode)
            }
            [algo, bits, mode] => {
                let algorithm = Algorithm::from_code(algo).ok_or_else(unsupported)?;
                if !algorithm.has_variable_key() {
                    return Err(unsupported());
                }
                // only the canonical spellings, so parse and describe agree
                let bits: u16 = match *bits {
                    "128" => 128,
                    "192" => 192,
                    "256" => 256,
                    _ => return Err(unsupported()),
                };
                (algorithm, bits, *mode)
            }
            _ => return Err(AtfsError::MalformedIdentifier(s.to_string())),
        };
        let mode = Mode::from_name(mode).ok_or_else(unsupported)?;
        Self::new(algorithm, key_bits, mode).map_err(|_| unsupported())
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn key_bits(&self) -> u16 {
        self.key_bits
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn key_len(&self) -> usize {
        self.key_bits as usize / 8
    }

    /// IV length implied by the algorithm and mode (0 for ECB).
    pub fn iv_len(&self) -> usize {
        if self.mode.uses_iv() {
            self.algorithm.block_size()
        } else {
            0
        }
    }

    /// Every identifier the registry can resolve.
    pub fn all() -> Vec<CipherId> {
        let mut ids = Vec::new();
        for algorithm in Algorithm::ALL {
            for bits in [128u16, 192, 256] {
                for mode in Mode::ALL {
                    if let Ok(id) = CipherId::new(algorithm, bits, mode) {
                        ids.push(id);
                    }
                }
            }
        }
        ids
    }
}

impl fmt::Display for CipherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.algorithm.has_variable_key() {
            write!(
                f,
                "{}-{}-{}",
                self.algorithm.code(),
                self.key_bits,
                self.mode.name()
            )
        } else {
            write!(f, "{}-{}", self.algorithm.code(), self.mode.name())
        }
    }
}

impl FromStr for CipherId {
    type Err = AtfsError;

    fn from_str(s: &str) -> AtfsResult<Self> {
        CipherId::parse(s)
    }
}

/// Instantiate the concrete block cipher for a suite and hand it to `$body`.
macro_rules! with_block_cipher {
    ($suite:expr, |$c:ident| $body:expr) => {{
        let key = $suite.key.as_slice();
        match ($suite.id.algorithm(), $suite.id.key_bits()) {
            (Algorithm::Aes, 128) => {
                let $c = Aes128::new_from_slice(key).map_err(key_error)?;
                $body
            }
            (Algorithm::Aes, 192) => {
                let $c = Aes192::new_from_slice(key).map_err(key_error)?;
                $body
            }
            (Algorithm::Aes, _) => {
                let $c = Aes256::new_from_slice(key).map_err(key_error)?;
                $body
            }
            (Algorithm::Twofish, _) => {
                let $c = Twofish::new_from_slice(key).map_err(key_error)?;
                $body
            }
            (Algorithm::Camellia, 128) => {
                let $c = Camellia128::new_from_slice(key).map_err(key_error)?;
                $body
            }
            (Algorithm::Camellia, 192) => {
                let $c = Camellia192::new_from_slice(key).map_err(key_error)?;
                $body
            }
            (Algorithm::Camellia, _) => {
                let $c = Camellia256::new_from_slice(key).map_err(key_error)?;
                $body
            }
            (Algorithm::TripleDes, _) => {
                let $c = TdesEde3::new_from_slice(key).map_err(key_error)?;
                $body
            }
        }
    }};
}

/// A keyed symmetric cipher instance: identifier plus key and IV.
///
/// Immutable after construction; key material is overwritten with random
/// bytes on drop.
#[derive(Clone)]
pub struct CipherSuite {
    id: CipherId,
    key: Vec<u8>,
    iv: Option<Vec<u8>>,
}

impl CipherSuite {
    /// Fresh random key and IV from the OS CSPRNG.
    pub fn generate(id: CipherId) -> Self {
        let mut rng = rand::thread_rng();
        let mut key = vec![0u8; id.key_len()];
        rng.fill_bytes(&mut key);
        let iv = id.mode().uses_iv().then(|| {
            let mut iv = vec![0u8; id.iv_len()];
            rng.fill_bytes(&mut iv);
            iv
        });
        CipherSuite { id, key, iv }
    }

    /// Rehydrate an instance from stored key material.
    pub fn from_parts(id: CipherId, key: &[u8], iv: Option<&[u8]>) -> AtfsResult<Self> {
        if key.len() != id.key_len() {
            return Err(AtfsError::Key(format!(
                "{id} needs a {}-byte key, got {}",
                id.key_len(),
                key.len()
            )));
        }
        let iv_len = iv.map_or(0, <[u8]>::len);
        if iv_len != id.iv_len() {
            return Err(AtfsError::Key(format!(
                "{id} needs a {}-byte IV, got {iv_len}",
                id.iv_len()
            )));
        }
        Ok(CipherSuite {
            id,
            key: key.to_vec(),
            iv: iv.filter(|_| id.mode().uses_iv()).map(<[u8]>::to_vec),
        })
    }

    pub fn id(&self) -> CipherId {
        self.id
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn iv(&self) -> Option<&[u8]> {
        self.iv.as_deref()
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> AtfsResult<Vec<u8>> {
        let iv = self.iv().unwrap_or_default();
        with_block_cipher!(self, |cipher| seal(cipher, self.id.mode(), iv, plaintext))
    }

    /// Decrypt; a padding failure (ECB/CBC) reports `DecryptionFailed`.
    pub fn decrypt(&self, ciphertext: &[u8]) -> AtfsResult<Vec<u8>> {
        let iv = self.iv().unwrap_or_default();
        with_block_cipher!(self, |cipher| open(cipher, self.id.mode(), iv, ciphertext))
    }
}

impl Drop for CipherSuite {
    fn drop(&mut self) {
        scrub(&mut self.key);
        if let Some(iv) = self.iv.as_mut() {
            scrub(iv);
        }
    }
}

impl fmt::Debug for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherSuite")
            .field("id", &self.id.to_string())
            .field("key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}

/// Construct a fresh cipher instance for an identifier string.
pub fn resolve(identifier: &str) -> AtfsResult<CipherSuite> {
    CipherId::parse(identifier).map(CipherSuite::generate)
}

/// Rehydrate a cipher instance for decryption.
pub fn resolve_with(identifier: &str, key: &[u8], iv: Option<&[u8]>) -> AtfsResult<CipherSuite> {
    CipherSuite::from_parts(CipherId::parse(identifier)?, key, iv)
}

/// Identifier string of a cipher instance.
pub fn describe(suite: &CipherSuite) -> String {
    suite.id().to_string()
}

fn key_error(_: cipher::InvalidLength) -> AtfsError {
    AtfsError::Key("invalid key length for block cipher".into())
}

fn iv_error(_: cipher::InvalidLength) -> AtfsError {
    AtfsError::Key("invalid IV length for block cipher".into())
}

fn seal<C>(cipher: C, mode: Mode, iv: &[u8], plaintext: &[u8]) -> AtfsResult<Vec<u8>>
where
    C: BlockCipher + BlockEncrypt + BlockDecrypt,
    C::BlockSize: IsLess<U256>,
    Le<C::BlockSize, U256>: NonZero,
{
    let out = match mode {
        Mode::Ecb => {
            ecb::Encryptor::<C>::inner_init(cipher).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        }
        Mode::Cbc => cbc::Encryptor::<C>::inner_iv_slice_init(cipher, iv)
            .map_err(iv_error)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        Mode::Cfb => {
            let mut buf = plaintext.to_vec();
            cfb_mode::Encryptor::<C>::inner_iv_slice_init(cipher, iv)
                .map_err(iv_error)?
                .encrypt(&mut buf);
            buf
        }
        Mode::Ofb => {
            let mut buf = plaintext.to_vec();
            let core = ofb::OfbCore::<C>::inner_iv_slice_init(cipher, iv).map_err(iv_error)?;
            ofb::Ofb::<C>::from_core(core).apply_keystream(&mut buf);
            buf
        }
    };
    Ok(out)
}

fn open<C>(cipher: C, mode: Mode, iv: &[u8], ciphertext: &[u8]) -> AtfsResult<Vec<u8>>
where
    C: BlockCipher + BlockEncrypt + BlockDecrypt,
    C::BlockSize: IsLess<U256>,
    Le<C::BlockSize, U256>: NonZero,
{
    let out = match mode {
        Mode::Ecb => ecb::Decryptor::<C>::inner_init(cipher)
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| AtfsError::DecryptionFailed)?,
        Mode::Cbc => cbc::Decryptor::<C>::inner_iv_slice_init(cipher, iv)
            .map_err(iv_error)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| AtfsError::DecryptionFailed)?,
        Mode::Cfb => {
            let mut buf = ciphertext.to_vec();
            cfb_mode::Decryptor::<C>::inner_iv_slice_init(cipher, iv)
                .map_err(iv_error)?
                .decrypt(&mut buf);
            buf
        }
        Mode::Ofb => {
            let mut buf = ciphertext.to_vec();
            let core = ofb::OfbCore::<C>::inner_iv_slice_init(cipher, iv).map_err(iv_error)?;
            ofb::Ofb::<C>::from_core(core).apply_keystream(&mut buf);
            buf
        }
    };
    Ok(out)
}
