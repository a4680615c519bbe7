//! OBLIVION - Byte Utilities
//! Fixed-width big-endian integer conversion, bounds-checked slicing,
//! lexicographic comparison and the hash shared by every bloom filter.

use std::cmp::Ordering;

use crate::error::{OblivionError, Result};

/// Encode a `u32` as 4 big-endian bytes.
pub fn encode_u32_be(x: u32) -> [u8; 4] {
    x.to_be_bytes()
}

/// Encode a `u64` as 8 big-endian bytes.
pub fn encode_u64_be(x: u64) -> [u8; 8] {
    x.to_be_bytes()
}

/// Decode a big-endian `u32` starting at `offset`.
pub fn decode_u32_be(buf: &[u8], offset: usize) -> Result<u32> {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(slice(buf, offset, 4)?);
    Ok(u32::from_be_bytes(raw))
}

/// Decode a big-endian `u64` starting at `offset`.
pub fn decode_u64_be(buf: &[u8], offset: usize) -> Result<u64> {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(slice(buf, offset, 8)?);
    Ok(u64::from_be_bytes(raw))
}

/// Borrow `len` bytes of `buf` starting at `offset`.
///
/// Fails with [`OblivionError::OutOfBounds`] instead of panicking when the
/// range (or `offset + len` itself) runs past the buffer.
pub fn slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let out_of_bounds = || OblivionError::OutOfBounds {
        offset,
        len,
        buf_len: buf.len(),
    };
    let end = offset.checked_add(len).ok_or_else(out_of_bounds)?;
    buf.get(offset..end).ok_or_else(out_of_bounds)
}

/// Concatenate two byte sequences into a new buffer.
pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out
}

/// Lexicographic comparison by unsigned byte value; on a common prefix the
/// shorter sequence sorts first.
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Polynomial rolling hash over `data`, seeded at 1.
///
/// Each step computes `h = (h << 5) + h + byte` with the byte read as a
/// signed 8-bit value and all arithmetic wrapping at 32 bits. Filters built
/// by any implementation must agree on this bit-for-bit.
pub fn hash(data: &[u8]) -> i32 {
    data.iter().fold(1i32, |h, &b| {
        h.wrapping_shl(5).wrapping_add(h).wrapping_add(b as i8 as i32)
    })
}

/// Render bytes for humans: printable ASCII (excluding space) as-is,
/// everything else as `\xHH`.
pub fn to_hex(data: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(data.len());
    for &b in data {
        if b > 32 && b < 127 {
            out.push(b as char);
        } else {
            out.push_str("\\x");
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}
