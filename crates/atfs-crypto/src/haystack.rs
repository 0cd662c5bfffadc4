//! Needle-in-Haystack vault: hides an encrypted private key in random noise
//!
//! Layout (little-endian):
//! ```text
//! [0..4)    needle start
//! [4..8)    needle length
//! [8..24)   salt
//! [24..56)  SHA-256(password ‖ salt)
//! [56..start)                 random
//! [start..start+len)          needle
//! [start+len..end)            random
//! ```
//! Neither the haystack size nor the needle position is a fixed function of
//! the needle length: the size gets a random margin and the start is drawn
//! uniformly from the legal range.

use atfs_core::{AtfsError, AtfsResult};
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::scrub::Scrubbed;

/// Size of the fixed header in front of the noise.
pub const HEADER_LEN: usize = 56;

pub const SALT_LEN: usize = 16;

pub const DIGEST_LEN: usize = 32;

/// Haystack sizing.
#[derive(Debug, Clone)]
pub struct HaystackParams {
    /// Haystack bytes per needle byte, before the random margin (at least 2)
    pub inflation_factor: usize,
}

impl Default for HaystackParams {
    fn default() -> Self {
        Self {
            inflation_factor: 256,
        }
    }
}

/// Fixed fields at the front of a haystack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaystackHeader {
    pub start: u32,
    pub needle_len: u32,
    pub salt: [u8; SALT_LEN],
    pub digest: [u8; DIGEST_LEN],
}

impl HaystackHeader {
    /// Read and bounds-check the header of `haystack`.
    pub fn read(haystack: &[u8]) -> AtfsResult<Self> {
        if haystack.len() < HEADER_LEN {
            return Err(AtfsError::MalformedVault(format!(
                "{} bytes is shorter than the {HEADER_LEN}-byte header",
                haystack.len()
            )));
        }
        let u32_at = |at: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&haystack[at..at + 4]);
            u32::from_le_bytes(b)
        };
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&haystack[8..24]);
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&haystack[24..HEADER_LEN]);
        let header = HaystackHeader {
            start: u32_at(0),
            needle_len: u32_at(4),
            salt,
            digest,
        };

        let start = header.start as usize;
        let end = start.checked_add(header.needle_len as usize);
        if start < HEADER_LEN || header.needle_len == 0 || end.map_or(true, |e| e > haystack.len())
        {
            return Err(AtfsError::MalformedVault(format!(
                "needle [{start}, +{}) outside haystack of {} bytes",
                header.needle_len,
                haystack.len()
            )));
        }
        Ok(header)
    }
}

/// SHA-256 over `password ‖ salt`.
pub fn password_digest(password: &[u8], salt: &[u8; SALT_LEN]) -> [u8; DIGEST_LEN] {
    let mut input = Scrubbed::zeroed(password.len() + SALT_LEN);
    input[..password.len()].copy_from_slice(password);
    input[password.len()..].copy_from_slice(salt);
    Sha256::digest(&*input).into()
}

/// Pick a haystack size for `needle_len`: `needle_len * factor` plus a random
/// margin of up to half that again.
fn haystack_size(needle_len: usize, params: &HaystackParams) -> AtfsResult<usize> {
    let too_large =
        || AtfsError::MalformedVault(format!("needle of {needle_len} bytes is too large"));
    let base = needle_len
        .checked_mul(params.inflation_factor)
        .ok_or_else(too_large)?;
    let margin = rand::thread_rng().gen_range(0..=base / 2);
    let size = HEADER_LEN
        .checked_add(base)
        .and_then(|s| s.checked_add(margin))
        .ok_or_else(too_large)?;
    // start and length are stored as u32
    if u32::try_from(size).is_err() {
        return Err(too_large());
    }
    Ok(size)
}

/// Bury `needle` in a fresh haystack.
///
/// `available` is the free space at the destination; it is advisory and the
/// writer must check again right before writing.
pub fn conceal(
    needle: &[u8],
    salt: &[u8; SALT_LEN],
    digest: &[u8; DIGEST_LEN],
    available: u64,
    params: &HaystackParams,
) -> AtfsResult<Vec<u8>> {
    if needle.is_empty() {
        return Err(AtfsError::MalformedVault("cannot conceal an empty needle".into()));
    }
    if params.inflation_factor < 2 {
        return Err(AtfsError::Config(format!(
            "inflation factor must be at least 2, got {}",
            params.inflation_factor
        )));
    }
    let size = haystack_size(needle.len(), params)?;
    if size as u64 > available {
        return Err(AtfsError::InsufficientStorage {
            required: size as u64,
            available,
        });
    }

    let mut rng = rand::thread_rng();
    let mut haystack = vec![0u8; size];
    rng.fill_bytes(&mut haystack);
    let start = rng.gen_range(HEADER_LEN..size - needle.len());

    haystack[0..4].copy_from_slice(&(start as u32).to_le_bytes());
    haystack[4..8].copy_from_slice(&(needle.len() as u32).to_le_bytes());
    haystack[8..24].copy_from_slice(salt);
    haystack[24..HEADER_LEN].copy_from_slice(digest);
    haystack[start..start + needle.len()].copy_from_slice(needle);

    tracing::debug!(size, needle_len = needle.len(), "concealed needle");
    Ok(haystack)
}

/// Recover the needle if `password` matches the stored digest.
pub fn reveal(haystack: &[u8], password: &[u8]) -> AtfsResult<Vec<u8>> {
    let header = HaystackHeader::read(haystack)?;
    let candidate = password_digest(password, &header.salt);
    if !bool::from(candidate.ct_eq(&header.digest)) {
        tracing::warn!("haystack password rejected");
        return Err(AtfsError::InvalidPassword);
    }
    let start = header.start as usize;
    Ok(haystack[start..start + header.needle_len as usize].to_vec())
}
