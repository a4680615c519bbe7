//! OBLIVION - Versioned Record Codec
//! Serializes a single (key, value, operation, version) edit to a
//! self-describing byte layout and defines the total order used to sort
//! records inside blocks and during merges.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::{BufMut, Bytes, BytesMut};

use crate::bytes_util::{
    compare, decode_u32_be, decode_u64_be, encode_u32_be, encode_u64_be, slice, to_hex,
};
use crate::error::{OblivionError, Result};

/// Width of the raw key length field.
pub const RAW_KEY_LEN_SIZE: usize = 4;
/// Width of the value length field.
pub const VALUE_LEN_SIZE: usize = 4;
/// Width of the operation code.
pub const OP_SIZE: usize = 1;
/// Width of the version field.
pub const VERSION_SIZE: usize = 8;
/// Both length fields, which always lead an encoded record.
pub const HEADER_SIZE: usize = RAW_KEY_LEN_SIZE + VALUE_LEN_SIZE;

/// Largest key whose raw key length still fits in 4 bytes.
const MAX_KEY_LEN: usize = u32::MAX as usize - OP_SIZE - VERSION_SIZE;

/// Kind of edit a record represents.
///
/// Wire codes are fixed: extend the enum and [`Op::from_code`] together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    Put = 0,
    Delete = 1,
}

impl Op {
    /// The 1-byte wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Map a wire code back to an operation.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Op::Put),
            1 => Ok(Op::Delete),
            other => Err(OblivionError::InvalidOperation(other)),
        }
    }
}

impl TryFrom<u8> for Op {
    type Error = OblivionError;

    fn try_from(code: u8) -> Result<Self> {
        Op::from_code(code)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Put => f.write_str("Put"),
            Op::Delete => f.write_str("Delete"),
        }
    }
}

/// A single immutable, versioned key-value edit.
///
/// ## Binary Format
/// ```text
/// [raw_key_len: 4 (BE)][value_len: 4 (BE)][key: N][op: 1][version: 8 (BE)][value: M]
/// ```
/// `raw_key_len` covers key + op + version, i.e. `N + 9`.
///
/// ## Ordering
/// Key ascending, then version descending (newest first), then op code
/// ascending. The value never takes part in ordering or equality.
#[derive(Debug, Clone)]
pub struct Record {
    key: Bytes,
    value: Bytes,
    op: Op,
    version: u64,
}

impl Record {
    /// Create a record, rejecting a zero version and lengths that cannot be
    /// represented in the wire format.
    pub fn new(
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        op: Op,
        version: u64,
    ) -> Result<Self> {
        let key = key.into();
        let value = value.into();

        if version == 0 {
            return Err(OblivionError::InvalidVersion(version));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(OblivionError::KeyTooLarge(key.len()));
        }
        if value.len() > u32::MAX as usize {
            return Err(OblivionError::ValueTooLarge(value.len()));
        }

        Ok(Self {
            key,
            value,
            op,
            version,
        })
    }

    /// Create a PUT record.
    pub fn put(key: impl Into<Bytes>, value: impl Into<Bytes>, version: u64) -> Result<Self> {
        Self::new(key, value, Op::Put, version)
    }

    /// Create a DELETE record (tombstone) with an empty value.
    pub fn delete(key: impl Into<Bytes>, version: u64) -> Result<Self> {
        Self::new(key, Bytes::new(), Op::Delete, version)
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns true if this record is a tombstone.
    pub fn is_delete(&self) -> bool {
        self.op == Op::Delete
    }

    /// Length of key + op + version as written in the first length field.
    pub fn raw_key_len(&self) -> usize {
        self.key.len() + OP_SIZE + VERSION_SIZE
    }

    /// Exact number of bytes [`Record::encode`] produces.
    pub fn serialized_size(&self) -> usize {
        HEADER_SIZE + self.raw_key_len() + self.value.len()
    }

    /// Append the encoded record to `buf`.
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        // Lengths were bounded at construction.
        buf.put_slice(&encode_u32_be(self.raw_key_len() as u32));
        buf.put_slice(&encode_u32_be(self.value.len() as u32));
        buf.put_slice(&self.key);
        buf.put_u8(self.op.code());
        buf.put_slice(&encode_u64_be(self.version));
        buf.put_slice(&self.value);
    }

    /// Encode into a freshly allocated buffer of exactly
    /// [`Record::serialized_size`] bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_size());
        self.encode_into(&mut buf);
        debug_assert_eq!(buf.len(), self.serialized_size());
        buf.freeze()
    }

    /// Decode the record that starts at `offset`.
    ///
    /// Returns the record together with the offset just past it. Every read
    /// is checked against `buf.len()`; encoded lengths are never trusted.
    pub fn decode_at(buf: &[u8], offset: usize) -> Result<(Self, usize)> {
        let header = slice(buf, offset, HEADER_SIZE)?;
        let raw_key_len = decode_u32_be(header, 0)? as usize;
        let value_len = decode_u32_be(header, RAW_KEY_LEN_SIZE)? as usize;

        let key_len = raw_key_len
            .checked_sub(OP_SIZE + VERSION_SIZE)
            .ok_or_else(|| {
                OblivionError::Corruption(format!(
                    "raw key length {} at offset {} is shorter than op + version",
                    raw_key_len, offset
                ))
            })?;

        let mut pos = offset + HEADER_SIZE;

        let key = slice(buf, pos, key_len)?;
        pos += key_len;

        let op = Op::from_code(slice(buf, pos, OP_SIZE)?[0])?;
        pos += OP_SIZE;

        let version = decode_u64_be(buf, pos)?;
        pos += VERSION_SIZE;

        let value = slice(buf, pos, value_len)?;
        pos += value_len;

        let record = Self::new(
            Bytes::copy_from_slice(key),
            Bytes::copy_from_slice(value),
            op,
            version,
        )?;

        log::trace!(
            "decoded record at offset {} ({} bytes, version {})",
            offset,
            pos - offset,
            version
        );

        Ok((record, pos))
    }

    /// Decode the record at the start of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Self::decode_at(buf, 0).map(|(record, _)| record)
    }

    /// Iterate over records laid out back to back in `buf`.
    pub fn iter_block(buf: &[u8]) -> RecordIter<'_> {
        RecordIter::new(buf)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Record {}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Record {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.key, &other.key)
            .then_with(|| other.version.cmp(&self.version))
            .then_with(|| self.op.code().cmp(&other.op.code()))
    }
}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.version.hash(state);
        self.op.hash(state);
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "key={}/op={}/version={}/value={}",
            to_hex(&self.key),
            self.op,
            self.version,
            to_hex(&self.value)
        )
    }
}

/// Iterator over consecutive encoded records in a block.
///
/// Yields each decode error once, then stops.
pub struct RecordIter<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> RecordIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            failed: false,
        }
    }

    /// Offset of the next record to be decoded.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for RecordIter<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }
        match Record::decode_at(self.buf, self.offset) {
            Ok((record, next)) => {
                self.offset = next;
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
