//! Explicit read cursor for the little-endian binary formats.
//!
//! A [`Cursor`] is a cheap `Copy` value. Every read consumes the cursor and
//! returns the decoded value together with the advanced cursor, so parsers
//! thread position explicitly instead of sharing a mutable offset.

use std::fmt;

/// Position within a borrowed byte buffer. `pos <= buf.len()` always holds.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

/// A read asked for more bytes than the buffer has left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncated {
    pub at: usize,
    pub wanted: usize,
    pub remaining: usize,
}

impl fmt::Display for Truncated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "needed {} bytes at offset {}, only {} remain",
            self.wanted, self.at, self.remaining
        )
    }
}

pub type Read<'a, T> = Result<(T, Cursor<'a>), Truncated>;

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Everything from the current position to the end.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn take(self, n: usize) -> Read<'a, &'a [u8]> {
        if n > self.remaining() {
            return Err(Truncated {
                at: self.pos,
                wanted: n,
                remaining: self.remaining(),
            });
        }
        let end = self.pos + n;
        Ok((
            &self.buf[self.pos..end],
            Cursor {
                buf: self.buf,
                pos: end,
            },
        ))
    }

    pub fn read_array<const N: usize>(self) -> Read<'a, [u8; N]> {
        let (bytes, next) = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok((out, next))
    }

    pub fn read_u8(self) -> Read<'a, u8> {
        let ([b], next) = self.read_array::<1>()?;
        Ok((b, next))
    }

    pub fn read_u32(self) -> Read<'a, u32> {
        let (bytes, next) = self.read_array::<4>()?;
        Ok((u32::from_le_bytes(bytes), next))
    }

    pub fn read_i64(self) -> Read<'a, i64> {
        let (bytes, next) = self.read_array::<8>()?;
        Ok((i64::from_le_bytes(bytes), next))
    }

    /// `[1B length][bytes]`
    pub fn read_u8_prefixed(self) -> Read<'a, &'a [u8]> {
        let (len, next) = self.read_u8()?;
        next.take(len as usize)
    }

    /// `[4B LE length][bytes]`
    pub fn read_u32_prefixed(self) -> Read<'a, &'a [u8]> {
        let (len, next) = self.read_u32()?;
        next.take(len as usize)
    }
}

/// Append `[1B length][bytes]`. Callers guarantee `bytes.len() <= 255`.
pub fn put_u8_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(bytes.len() <= u8::MAX as usize);
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
}

/// Append `[4B LE length][bytes]`. Callers guarantee `bytes.len() <= u32::MAX`.
pub fn put_u32_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(bytes.len() <= u32::MAX as usize);
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}
