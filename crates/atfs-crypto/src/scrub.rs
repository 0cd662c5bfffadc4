//! Buffers that are overwritten with fresh random bytes when dropped.
//!
//! Used for passwords, derived keys, file keys and serialized private keys,
//! so every exit (including `?` early returns) wipes them.

use rand::RngCore;
use std::hint::black_box;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{compiler_fence, Ordering};

/// Overwrite `bytes` with random data. The buffer is passed through
/// `black_box` afterwards so the fill is not dropped as a dead store.
pub fn scrub(bytes: &mut [u8]) {
    rand::thread_rng().fill_bytes(bytes);
    black_box(&mut *bytes);
    compiler_fence(Ordering::SeqCst);
}

pub struct Scrubbed(Vec<u8>);

impl Scrubbed {
    pub fn new(bytes: Vec<u8>) -> Self {
        Scrubbed(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Scrubbed(bytes.to_vec())
    }

    pub fn zeroed(len: usize) -> Self {
        Scrubbed(vec![0u8; len])
    }
}

impl Deref for Scrubbed {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl DerefMut for Scrubbed {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl Drop for Scrubbed {
    fn drop(&mut self) {
        scrub(&mut self.0);
    }
}

impl std::fmt::Debug for Scrubbed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scrubbed")
            .field("len", &self.0.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_contents() {
        let s = Scrubbed::from_slice(b"hunter2");
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("REDACTED"));
    }

    #[test]
    fn test_scrub_overwrites_with_noise() {
        let mut buf = [0u8; 64];
        scrub(&mut buf);
        assert_ne!(buf, [0u8; 64]);
        let first = buf;
        scrub(&mut buf);
        assert_ne!(buf, first);
    }

    #[test]
    fn test_deref_exposes_bytes() {
        let mut s = Scrubbed::zeroed(4);
        s[0] = 1;
        assert_eq!(&*s, &[1, 0, 0, 0]);
    }
}
