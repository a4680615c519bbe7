//! OBLIVION Core - Record Layer of the LSM-Tree Storage Engine
//!
//! The two stateless building blocks every higher layer (MemTable,
//! SSTable blocks, compaction) sits on.
//!
//! ## Features
//! - **Record Codec**: Versioned key-value edits with a bit-exact,
//!   big-endian binary layout and a total sort order (key ascending,
//!   newest version first)
//! - **Bloom Filter**: Per-block membership summaries that rule out
//!   lookups for keys a block cannot contain
//! - **Byte Utilities**: Bounds-checked slicing, big-endian integers and
//!   the shared key hash
//!
//! ## Example
//! ```
//! use oblivion_core::{BloomFilter, FilterConfig, Record};
//!
//! let record = Record::put(&b"key"[..], &b"value"[..], 1).unwrap();
//! let encoded = record.encode();
//! assert_eq!(Record::decode(&encoded).unwrap(), record);
//!
//! let filter = BloomFilter::build(&[b"key"], &FilterConfig::default()).unwrap();
//! assert!(filter.contains(b"key"));
//! ```

pub mod bloom;
pub mod bytes_util;
pub mod config;
pub mod error;
pub mod record;

pub use bloom::{BloomFilter, BloomFilterBuilder};
pub use config::FilterConfig;
pub use error::{OblivionError, Result};
pub use record::{Op, Record};
