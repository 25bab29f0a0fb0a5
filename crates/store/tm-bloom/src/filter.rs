//! Bloom filter sized at runtime from an expected item count and a target
//! false positive rate.
//!
//! ## Theory
//!
//! For `n` expected items at false positive rate `p`:
//! - bits: m = -n * ln(p) / (ln 2)^2
//! - hash functions: k = (m / n) * ln 2
//!
//! The filter uses double hashing: h_i(x) = h1(x) + i * h2(x) mod m, where
//! h1 and h2 are independent FNV-1a style hashes of the key bytes.

/// A space-efficient probabilistic set over byte keys.
///
/// A negative `contains` answer is guaranteed correct; a positive answer may
/// be a false positive.
#[derive(Clone)]
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Create an empty filter sized for `expected_items` at
    /// `false_positive_rate`.
    ///
    /// Out-of-range rates fall back to 1%.
    pub fn with_capacity(expected_items: u64, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = if false_positive_rate > 0.0 && false_positive_rate < 1.0 {
            false_positive_rate
        } else {
            0.01
        };

        let ln2 = std::f64::consts::LN_2;
        let m = (-(n * p.ln()) / (ln2 * ln2)).ceil().max(8.0);
        let k = ((m / n) * ln2).round().max(1.0);

        let num_bits = m as u64;
        Self {
            bits: vec![0u8; num_bits.div_ceil(8) as usize],
            num_bits,
            num_hashes: k as u32,
        }
    }

    /// Reassemble a filter from its persisted parts.
    ///
    /// Returns `None` when the bitmap length does not match the bit count or
    /// the parameters are degenerate.
    pub fn from_parts(num_bits: u64, num_hashes: u32, bits: Vec<u8>) -> Option<Self> {
        if num_bits == 0 || num_hashes == 0 {
            return None;
        }
        if bits.len() as u64 != num_bits.div_ceil(8) {
            return None;
        }
        Some(Self {
            bits,
            num_bits,
            num_hashes,
        })
    }

    /// Insert a key into the filter.
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = Self::hash_pair(key);
        for i in 0..self.num_hashes {
            let bit = self.bit_index(h1, h2, i);
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    /// Test whether a key might be in the set.
    pub fn contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = Self::hash_pair(key);
        for i in 0..self.num_hashes {
            let bit = self.bit_index(h1, h2, i);
            if self.bits[(bit / 8) as usize] & (1 << (bit % 8)) == 0 {
                return false;
            }
        }
        true
    }

    /// Total bits in the filter.
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Number of hash functions.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// The raw bitmap.
    pub fn bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Two independent FNV-1a hashes over the key, with distinct offset bases.
    fn hash_pair(key: &[u8]) -> (u64, u64) {
        let mut h1: u64 = 0xcbf2_9ce4_8422_2325;
        for &b in key {
            h1 ^= b as u64;
            h1 = h1.wrapping_mul(0x0100_0000_01b3);
        }

        let mut h2: u64 = 0x6c62_272e_07bb_0142;
        for &b in key {
            h2 ^= b as u64;
            h2 = h2.wrapping_mul(0x0100_0000_01b3);
        }

        (h1, h2)
    }

    fn bit_index(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set_bits = self.bits.iter().map(|b| b.count_ones() as u64).sum::<u64>();
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("set_bits", &set_bits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizing_formulas() {
        // n=1000, p=0.01 -> m ~= 9585 bits, k ~= 7
        let filter = BloomFilter::with_capacity(1000, 0.01);
        assert!((9500..9700).contains(&filter.num_bits()));
        assert_eq!(filter.num_hashes(), 7);
    }

    #[test]
    fn test_degenerate_rate_falls_back() {
        let filter = BloomFilter::with_capacity(1000, 0.0);
        assert!(filter.num_bits() > 0);
        assert!(filter.num_hashes() >= 1);
    }

    #[test]
    fn test_insert_and_contains() {
        let mut filter = BloomFilter::with_capacity(100, 0.01);
        filter.insert(b"event-a");
        filter.insert(b"event-b");

        assert!(filter.contains(b"event-a"));
        assert!(filter.contains(b"event-b"));
        assert!(!filter.contains(b"event-c"));
    }

    #[test]
    fn test_no_false_negatives() {
        let mut filter = BloomFilter::with_capacity(500, 0.01);
        let keys: Vec<String> = (0..500).map(|i| format!("event-{i}")).collect();

        for key in &keys {
            filter.insert(key.as_bytes());
        }
        for key in &keys {
            assert!(filter.contains(key.as_bytes()), "{key} should be found");
        }
    }

    #[test]
    fn test_false_positive_rate_bound() {
        let mut filter = BloomFilter::with_capacity(1000, 0.01);
        for i in 0..1000u32 {
            filter.insert(&i.to_le_bytes());
        }

        let mut false_positives = 0u32;
        let probes = 10_000u32;
        for i in 100_000..100_000 + probes {
            if filter.contains(&i.to_le_bytes()) {
                false_positives += 1;
            }
        }

        // Allow 3x the target to keep the test robust against hash skew.
        let rate = f64::from(false_positives) / f64::from(probes);
        assert!(rate < 0.03, "false positive rate {rate:.4} exceeds bound");
    }

    #[test]
    fn test_from_parts_round_trip() {
        let mut filter = BloomFilter::with_capacity(100, 0.01);
        filter.insert(b"event-a");

        let restored = BloomFilter::from_parts(
            filter.num_bits(),
            filter.num_hashes(),
            filter.bytes().to_vec(),
        )
        .unwrap();
        assert!(restored.contains(b"event-a"));
        assert!(!restored.contains(b"event-z"));
    }

    #[test]
    fn test_from_parts_rejects_mismatched_lengths() {
        assert!(BloomFilter::from_parts(100, 3, vec![0u8; 5]).is_none());
        assert!(BloomFilter::from_parts(0, 3, Vec::new()).is_none());
        assert!(BloomFilter::from_parts(64, 0, vec![0u8; 8]).is_none());
    }

    #[test]
    fn test_empty_key() {
        let mut filter = BloomFilter::with_capacity(10, 0.01);
        filter.insert(b"");
        assert!(filter.contains(b""));
    }
}
