//! Little-endian primitives and CompactSize length prefixes.
//!
//! CompactSize is the variable-length integer used for every count and
//! byte-string length in the legacy wire format:
//!
//! ```text
//! < 0xfd        1 byte
//! <= 0xffff     0xfd followed by u16 LE
//! <= 0xffffffff 0xfe followed by u32 LE
//! otherwise     0xff followed by u64 LE
//! ```
//!
//! The decoder rejects non-minimal encodings so every value has exactly one
//! serialization, which keeps hashes of re-encoded data stable.

use crate::error::TypeError;
use crate::hash::Hash;

/// Append a CompactSize-encoded integer.
pub fn write_compact_size(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Number of bytes `write_compact_size` emits for `value`.
pub fn compact_size_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Append a length-prefixed byte string.
pub fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Cursor over a borrowed byte slice.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], TypeError> {
        if self.remaining() < n {
            return Err(TypeError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// The next `n` bytes without consuming them, if that many remain.
    pub fn peek(&self, n: usize) -> Option<&'a [u8]> {
        self.buf.get(self.pos..self.pos + n)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], TypeError> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.read_bytes(N)?);
        Ok(arr)
    }

    pub fn read_u8(&mut self) -> Result<u8, TypeError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, TypeError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, TypeError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, TypeError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, TypeError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64_le(&mut self) -> Result<i64, TypeError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_hash(&mut self) -> Result<Hash, TypeError> {
        Ok(Hash::from_bytes(self.read_array()?))
    }

    pub fn read_compact_size(&mut self) -> Result<u64, TypeError> {
        let (value, min) = match self.read_u8()? {
            0xfd => (u64::from(self.read_u16_le()?), 0xfd),
            0xfe => (u64::from(self.read_u32_le()?), 0x1_0000),
            0xff => (self.read_u64_le()?, 0x1_0000_0000),
            b => return Ok(u64::from(b)),
        };
        if value < min {
            return Err(TypeError::NonCanonicalVarInt(value));
        }
        Ok(value)
    }

    /// Read a CompactSize item count, rejecting counts that could not
    /// possibly fit in the remaining input (every item is at least one byte).
    pub fn read_count(&mut self) -> Result<usize, TypeError> {
        let count = self.read_compact_size()?;
        if count > self.remaining() as u64 {
            return Err(TypeError::TooManyItems {
                count,
                remaining: self.remaining(),
            });
        }
        Ok(count as usize)
    }

    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, TypeError> {
        let len = self.read_count()?;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// Fail if any input is left unconsumed.
    pub fn finish(self) -> Result<(), TypeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(TypeError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_size_boundaries() {
        for (value, len) in [
            (0u64, 1usize),
            (0xfc, 1),
            (0xfd, 3),
            (0xffff, 3),
            (0x1_0000, 5),
            (0xffff_ffff, 5),
            (0x1_0000_0000, 9),
        ] {
            let mut out = Vec::new();
            write_compact_size(&mut out, value);
            assert_eq!(out.len(), len, "value {value:#x}");
            assert_eq!(compact_size_len(value), len);
            let mut dec = Decoder::new(&out);
            assert_eq!(dec.read_compact_size().unwrap(), value);
            dec.finish().unwrap();
        }
    }

    #[test]
    fn rejects_non_canonical_compact_size() {
        let mut dec = Decoder::new(&[0xfd, 0x10, 0x00]);
        assert_eq!(
            dec.read_compact_size(),
            Err(TypeError::NonCanonicalVarInt(0x10))
        );
    }

    #[test]
    fn count_bounded_by_remaining_input() {
        let mut dec = Decoder::new(&[0xfe, 0xff, 0xff, 0xff, 0x00, 0x01]);
        assert!(matches!(
            dec.read_count(),
            Err(TypeError::TooManyItems { count: 0x00ff_ffff, .. })
        ));
    }

    #[test]
    fn eof_is_reported() {
        let mut dec = Decoder::new(&[1, 2]);
        assert_eq!(
            dec.read_u32_le(),
            Err(TypeError::UnexpectedEof { needed: 4, remaining: 2 })
        );
    }

    #[test]
    fn trailing_bytes_reported_by_finish() {
        let mut dec = Decoder::new(&[1, 2, 3]);
        dec.read_u8().unwrap();
        assert_eq!(dec.finish(), Err(TypeError::TrailingBytes(2)));
    }
}
