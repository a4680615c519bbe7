//! OBLIVION - Custom Error Types
//! Defines the error hierarchy for the record codec and bloom filter.

use thiserror::Error;

/// Custom Result type for the Oblivion core.
pub type Result<T> = std::result::Result<T, OblivionError>;

/// Error types for the Oblivion core.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OblivionError {
    /// Record version must be non-zero.
    #[error("Invalid version: {0} (versions start at 1)")]
    InvalidVersion(u64),

    /// Key does not fit in the 4-byte raw key length field.
    #[error("Key too large: {0} bytes")]
    KeyTooLarge(usize),

    /// Value does not fit in the 4-byte value length field.
    #[error("Value too large: {0} bytes")]
    ValueTooLarge(usize),

    /// Unknown operation code found while decoding.
    #[error("Invalid operation code: {0}")]
    InvalidOperation(u8),

    /// A read would run past the end of the buffer.
    #[error("Out of bounds: offset {offset} + len {len} exceeds buffer length {buf_len}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        buf_len: usize,
    },

    /// Encoded data is structurally invalid (bad length, CRC mismatch).
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// Bloom filter build was given no keys.
    #[error("Cannot build bloom filter from an empty key set")]
    EmptyKeySet,

    /// Bloom filter has no bit array to answer queries from.
    #[error("Bloom filter not built")]
    FilterNotBuilt,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for OblivionError {
    fn from(err: bincode::Error) -> Self {
        OblivionError::Serialization(err.to_string())
    }
}
