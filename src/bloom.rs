//! OBLIVION - Bloom Filter
//! A space-efficient probabilistic data structure used to test
//! whether a key is a member of a set.
//!
//! False positives are possible, but false negatives are not.
//! A storage layer builds one filter per block and consults it to skip
//! blocks that definitely do not hold a key.

use serde::{Deserialize, Serialize};

use crate::bytes_util::{decode_u32_be, encode_u32_be, hash};
use crate::config::FilterConfig;
use crate::error::{OblivionError, Result};

/// Smallest filter ever built, in bits.
pub const MIN_BIT_LEN: usize = 64;

/// Width of the CRC32 trailer on a persisted filter.
const CRC_SIZE: usize = 4;

/// Bit positions tested for one key.
///
/// One real hash, `k` synthetic derivations: each round folds `h` into
/// `[0, bit_len)` and then advances it by its own 32-bit rotation
/// (`h += (h >> 17) | (h << 15)`). Build and query both walk this
/// sequence, so they cannot drift apart.
#[derive(Debug, Clone)]
pub struct BitIndices {
    h: i32,
    remaining: u32,
    bit_len: i64,
}

impl Iterator for BitIndices {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 || self.bit_len == 0 {
            return None;
        }
        self.remaining -= 1;

        // `%` keeps the sign of a negative hash; fold it back into range.
        let n = self.bit_len;
        let idx = ((self.h as i64 % n) + n) % n;

        let delta = (self.h as u32).rotate_right(17) as i32;
        self.h = self.h.wrapping_add(delta);

        Some(idx as usize)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.bit_len == 0 {
            0
        } else {
            self.remaining as usize
        };
        (n, Some(n))
    }
}

/// Bit index sequence for `key` in a filter of `bit_len` bits.
pub fn bit_indices(key: &[u8], hash_rounds: u32, bit_len: usize) -> BitIndices {
    BitIndices {
        h: hash(key),
        remaining: hash_rounds,
        bit_len: bit_len as i64,
    }
}

/// A built Bloom filter for probabilistic set membership testing.
///
/// ## How it works
/// - Bit length is `keys * bits_per_key`, rounded up to a whole byte,
///   never less than 64 bits
/// - Each key sets `k` bits chosen by [`bit_indices`]
/// - If any tested bit is 0 → key is **definitely not** in the set
/// - If all tested bits are 1 → key is **probably** in the set
///
/// There is no unbuilt state: the only constructors are [`BloomFilter::build`]
/// and the validated restore paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FilterParts")]
pub struct BloomFilter {
    /// Bit array stored as bytes, bit `i` at `bits[i / 8] & (1 << (i % 8))`.
    bits: Vec<u8>,
    /// Number of hash rounds (`k`).
    hash_rounds: u32,
    /// Bits per key the filter was sized with.
    bits_per_key: u32,
    /// Number of bits in the filter, always `bits.len() * 8`.
    bit_len: usize,
}

/// Wire mirror of [`BloomFilter`]; deserialized state goes through
/// [`BloomFilter::from_parts`] before it can answer queries.
#[derive(Deserialize)]
struct FilterParts {
    bits: Vec<u8>,
    hash_rounds: u32,
    bits_per_key: u32,
    bit_len: usize,
}

impl TryFrom<FilterParts> for BloomFilter {
    type Error = OblivionError;

    fn try_from(parts: FilterParts) -> Result<Self> {
        BloomFilter::from_parts(
            parts.bits,
            parts.hash_rounds,
            parts.bits_per_key,
            parts.bit_len,
        )
    }
}

impl BloomFilter {
    /// Build a filter over `keys`.
    ///
    /// Fails with [`OblivionError::EmptyKeySet`] when `keys` is empty.
    pub fn build<K: AsRef<[u8]>>(keys: &[K], config: &FilterConfig) -> Result<Self> {
        config.validate()?;
        if keys.is_empty() {
            return Err(OblivionError::EmptyKeySet);
        }

        let bit_len = Self::bit_len_for(keys.len(), config.bits_per_key)?;
        let mut bits = vec![0u8; bit_len / 8];

        for key in keys {
            for idx in bit_indices(key.as_ref(), config.hash_rounds, bit_len) {
                bits[idx / 8] |= 1 << (idx % 8);
            }
        }

        log::debug!(
            "Bloom filter built: {} keys, {} bits, k = {}",
            keys.len(),
            bit_len,
            config.hash_rounds
        );

        Ok(Self {
            bits,
            hash_rounds: config.hash_rounds,
            bits_per_key: config.bits_per_key,
            bit_len,
        })
    }

    /// Bit length for `num_keys` keys: byte-aligned with a 64-bit floor.
    pub fn bit_len_for(num_keys: usize, bits_per_key: u32) -> Result<usize> {
        let raw = num_keys
            .checked_mul(bits_per_key as usize)
            .and_then(|bits| bits.checked_add(7))
            .ok_or_else(|| OblivionError::Config("bloom filter bit length overflow".into()))?;
        let aligned = (raw / 8) * 8;
        let bit_len = aligned.max(MIN_BIT_LEN);

        if bit_len > u32::MAX as usize {
            return Err(OblivionError::Config(format!(
                "bloom filter of {} bits exceeds the 32-bit index range",
                bit_len
            )));
        }
        Ok(bit_len)
    }

    /// Restore a filter from its four retained values.
    pub fn from_parts(
        bits: Vec<u8>,
        hash_rounds: u32,
        bits_per_key: u32,
        bit_len: usize,
    ) -> Result<Self> {
        if bits.is_empty() {
            return Err(OblivionError::FilterNotBuilt);
        }
        if hash_rounds == 0 {
            return Err(OblivionError::Config("hash_rounds must be > 0".into()));
        }
        if bits_per_key == 0 {
            return Err(OblivionError::Config("bits_per_key must be > 0".into()));
        }
        if bit_len != bits.len() * 8 || bit_len > u32::MAX as usize {
            return Err(OblivionError::Corruption(format!(
                "bit length {} does not match {} filter bytes",
                bit_len,
                bits.len()
            )));
        }
        Ok(Self {
            bits,
            hash_rounds,
            bits_per_key,
            bit_len,
        })
    }

    /// Check if a key **may** be in the set.
    /// - Returns `false` → key is **definitely not** in the set
    /// - Returns `true` → key is **probably** in the set (may be false positive)
    pub fn contains(&self, key: &[u8]) -> bool {
        bit_indices(key, self.hash_rounds, self.bit_len)
            .all(|idx| self.bits[idx / 8] & (1 << (idx % 8)) != 0)
    }

    /// Returns the number of bits in the filter.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Returns the number of hash rounds used.
    pub fn hash_rounds(&self) -> u32 {
        self.hash_rounds
    }

    /// Returns the bits-per-key the filter was sized with.
    pub fn bits_per_key(&self) -> u32 {
        self.bits_per_key
    }

    /// The raw bit array.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Returns the approximate memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.bits.len()
    }

    /// Estimated false positive rate for `num_keys` keys:
    /// `FPR ≈ (1 - e^(-kn/m))^k`
    pub fn estimated_fpr(&self, num_keys: usize) -> f64 {
        if num_keys == 0 {
            return 0.0;
        }
        let k = self.hash_rounds as f64;
        let m = self.bit_len as f64;
        let n = num_keys as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    /// Serialize for storage next to the block it covers.
    ///
    /// ## Format
    /// ```text
    /// [bincode(filter): N bytes][crc32 of the preceding bytes: 4 bytes (BE)]
    /// ```
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = bincode::serialize(self)?;
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&encode_u32_be(crc));
        Ok(buf)
    }

    /// Restore a filter written by [`BloomFilter::to_bytes`].
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < CRC_SIZE {
            return Err(OblivionError::Corruption(format!(
                "bloom filter too short: {} bytes",
                data.len()
            )));
        }
        let split = data.len() - CRC_SIZE;
        let (payload, _) = data.split_at(split);
        let stored_crc = decode_u32_be(data, split)?;
        let computed_crc = crc32fast::hash(payload);
        if stored_crc != computed_crc {
            log::warn!(
                "Rejecting bloom filter: CRC mismatch (stored {:#010x}, computed {:#010x})",
                stored_crc,
                computed_crc
            );
            return Err(OblivionError::Corruption("bloom filter CRC mismatch".into()));
        }

        Ok(bincode::deserialize(payload)?)
    }
}

/// Collects keys for a block, then builds its filter in one shot.
#[derive(Debug, Clone, Default)]
pub struct BloomFilterBuilder {
    keys: Vec<Vec<u8>>,
    config: FilterConfig,
}

impl BloomFilterBuilder {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            keys: Vec::new(),
            config,
        }
    }

    /// Add a key to the filter being built.
    pub fn add_key(&mut self, key: &[u8]) {
        self.keys.push(key.to_vec());
    }

    /// Number of keys collected so far.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Finalize and return the bloom filter.
    pub fn build(self) -> Result<BloomFilter> {
        BloomFilter::build(&self.keys, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_index_sequence() {
        // h("a") = 130; the third round goes through a negative hash
        let indices: Vec<usize> = bit_indices(b"a", 3, 64).collect();
        assert_eq!(indices, vec![2, 2, 34]);
    }

    #[test]
    fn test_index_sequence_from_negative_hash() {
        // h(0x80) = -95, so every mix below starts from a negative hash.
        // A sign-extending shift would give [33, 32, 31] instead.
        let indices: Vec<usize> = bit_indices(&[0x80], 3, 64).collect();
        assert_eq!(indices, vec![33, 32, 8]);
    }

    #[test]
    fn test_known_bit_pattern() {
        let bf = BloomFilter::build(&[b"a"], &FilterConfig::new(10, 3)).unwrap();
        assert_eq!(bf.as_bytes(), &[4, 0, 0, 0, 4, 0, 0, 0]);
    }

    #[test]
    fn test_indices_in_range() {
        for i in 0..200 {
            let key = format!("lookup_{}", i);
            for idx in bit_indices(key.as_bytes(), 8, 72) {
                assert!(idx < 72);
            }
        }
        assert_eq!(bit_indices(b"k", 5, 64).count(), 5);
        assert_eq!(bit_indices(b"k", 5, 0).count(), 0);
    }

    #[test]
    fn test_insert_and_contains() {
        let keys: [&[u8]; 3] = [b"alice", b"bob", b"carol"];
        let bf = BloomFilter::build(&keys, &FilterConfig::new(10, 4)).unwrap();

        assert!(bf.contains(b"alice"));
        assert!(bf.contains(b"bob"));
        assert!(bf.contains(b"carol"));
        // "dave" may go either way; only check it doesn't panic
        let _ = bf.contains(b"dave");
    }

    #[test]
    fn test_bit_len_floor_and_alignment() {
        assert_eq!(BloomFilter::bit_len_for(1, 10).unwrap(), 64);
        assert_eq!(BloomFilter::bit_len_for(7, 10).unwrap(), 72);
        assert_eq!(BloomFilter::bit_len_for(100, 10).unwrap(), 1000);
        assert_eq!(BloomFilter::bit_len_for(3, 3).unwrap(), 64);
        assert!(BloomFilter::bit_len_for(usize::MAX, 10).is_err());

        let bf = BloomFilter::build(&[b"only"], &FilterConfig::default()).unwrap();
        assert_eq!(bf.bit_len(), 64);
        assert_eq!(bf.memory_usage(), 8);
    }

    #[test]
    fn test_empty_key_set_rejected() {
        let keys: Vec<Vec<u8>> = Vec::new();
        assert_eq!(
            BloomFilter::build(&keys, &FilterConfig::default()).unwrap_err(),
            OblivionError::EmptyKeySet
        );
        assert!(BloomFilterBuilder::new(FilterConfig::default()).build().is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = BloomFilter::build(&[b"k"], &FilterConfig::new(10, 0)).unwrap_err();
        assert!(matches!(err, OblivionError::Config(_)));
    }

    #[test]
    fn test_no_false_negatives() {
        let keys: Vec<String> = (0..500).map(|i| format!("key_{}", i)).collect();
        let bf = BloomFilter::build(&keys, &FilterConfig::default()).unwrap();

        // ALL inserted keys must be found (zero false negatives)
        for key in &keys {
            assert!(bf.contains(key.as_bytes()), "False negative for key: {}", key);
        }
    }

    #[test]
    fn test_mostly_rejects_absent_keys() {
        let keys: Vec<String> = (0..500).map(|i| format!("key_{}", i)).collect();
        let bf = BloomFilter::build(&keys, &FilterConfig::new(10, 3)).unwrap();

        let false_positives = (0..1000)
            .filter(|i| bf.contains(format!("nonexistent_key_{}", i).as_bytes()))
            .count();

        assert!(
            false_positives < 200,
            "Too many false positives: {}",
            false_positives
        );
    }

    #[test]
    fn test_estimated_fpr() {
        let bf = BloomFilter::build(&[b"x"], &FilterConfig::new(10, 7)).unwrap();
        assert_eq!(bf.estimated_fpr(0), 0.0);

        let fpr = bf.estimated_fpr(6);
        assert!(fpr > 0.0);
        assert!(fpr < 0.1);
    }

    #[test]
    fn test_builder() {
        let mut builder = BloomFilterBuilder::new(FilterConfig::new(12, 5));
        assert!(builder.is_empty());
        builder.add_key(b"alpha");
        builder.add_key(b"bravo");
        assert_eq!(builder.len(), 2);

        let bf = builder.build().unwrap();
        assert_eq!(bf.bits_per_key(), 12);
        assert_eq!(bf.hash_rounds(), 5);
        assert!(bf.contains(b"alpha"));
        assert!(bf.contains(b"bravo"));
    }

    #[test]
    fn test_from_parts_validation() {
        assert_eq!(
            BloomFilter::from_parts(Vec::new(), 3, 10, 0).unwrap_err(),
            OblivionError::FilterNotBuilt
        );
        assert!(BloomFilter::from_parts(vec![0; 8], 0, 10, 64).is_err());
        assert!(BloomFilter::from_parts(vec![0; 8], 3, 10, 72).is_err());
        assert!(matches!(
            BloomFilter::from_parts(vec![0; 8], 3, 0, 64).unwrap_err(),
            OblivionError::Config(_)
        ));

        let bf = BloomFilter::build(&[b"k"], &FilterConfig::default()).unwrap();
        let restored = BloomFilter::from_parts(
            bf.as_bytes().to_vec(),
            bf.hash_rounds(),
            bf.bits_per_key(),
            bf.bit_len(),
        )
        .unwrap();
        assert_eq!(restored, bf);
    }

    #[test]
    fn test_persisted_filter() {
        let keys: Vec<String> = (0..50).map(|i| format!("user:{}", i)).collect();
        let bf = BloomFilter::build(&keys, &FilterConfig::default()).unwrap();

        let restored = BloomFilter::from_bytes(&bf.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, bf);
        assert!(restored.contains(b"user:42"));
    }

    #[test]
    fn test_deserialize_rejects_malformed_state() {
        let empty = bincode::serialize(&(Vec::<u8>::new(), 3u32, 10u32, 64usize)).unwrap();
        assert!(bincode::deserialize::<BloomFilter>(&empty).is_err());

        let mismatched = bincode::serialize(&(vec![0u8; 8], 3u32, 10u32, 128usize)).unwrap();
        assert!(bincode::deserialize::<BloomFilter>(&mismatched).is_err());

        let no_rounds = bincode::serialize(&(vec![0u8; 8], 0u32, 10u32, 64usize)).unwrap();
        assert!(bincode::deserialize::<BloomFilter>(&no_rounds).is_err());

        let bf = BloomFilter::build(&[b"k"], &FilterConfig::default()).unwrap();
        let restored: BloomFilter =
            bincode::deserialize(&bincode::serialize(&bf).unwrap()).unwrap();
        assert_eq!(restored, bf);
    }

    #[test]
    fn test_persisted_filter_rejects_empty_bits() {
        let mut data = bincode::serialize(&(Vec::<u8>::new(), 3u32, 10u32, 64usize)).unwrap();
        let crc = crc32fast::hash(&data);
        data.extend_from_slice(&encode_u32_be(crc));

        assert!(matches!(
            BloomFilter::from_bytes(&data).unwrap_err(),
            OblivionError::Serialization(_)
        ));
    }

    #[test]
    fn test_persisted_filter_corruption() {
        let bf = BloomFilter::build(&[b"k"], &FilterConfig::default()).unwrap();
        let mut data = bf.to_bytes().unwrap();
        data[0] ^= 0xFF;

        assert!(matches!(
            BloomFilter::from_bytes(&data).unwrap_err(),
            OblivionError::Corruption(_)
        ));
        assert!(BloomFilter::from_bytes(&[1, 2]).is_err());
    }
}
