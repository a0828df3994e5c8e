//! Space-efficient set fingerprinting for verification runs.
//!
//! A `BloomFilter` answers "was this element definitely never added?" with
//! no false negatives: `lacks_element` returning true proves absence, while
//! false means "probably present". One filter is owned by a single
//! verification run and discarded at its end.
//!
//! Hashing is seeded explicitly so runs are reproducible; there is no
//! process-global randomness.


use ahash::RandomState;
use std::hash::{BuildHasher, Hasher};

/// Most hash functions the sizing formula will pick.  Past this point extra
/// functions stop paying for their cost.
const MAX_HASH_FUNCS: u32 = 10;

/// Target bits per element when the byte budget allows it (~1% false
/// positive rate at the optimal hash count).
const TARGET_BITS_PER_ELEM: u64 = 10;

/// Fixed-size bit array with k seeded hash functions.
pub struct BloomFilter {
    bitset: Vec<u8>,
    /// Always a power of two, so hashes reduce with a mask.
    nbits: u64,
    k_hash_funcs: u32,
    hasher_a: RandomState,
    hasher_b: RandomState,
}

impl BloomFilter {
    /// Create a filter sized for `total_elems` elements, spending at most
    /// `byte_budget` bytes on the bit array.
    ///
    /// The bit count is the largest power of two that fits both the byte
    /// budget and the per-element target; the number of hash functions is
    /// derived from the resulting bits-per-element ratio.
    pub fn create(total_elems: u64, byte_budget: usize, seed: u64) -> Self {
        let total_elems = total_elems.max(1);
        let budget_bits = (byte_budget.max(1) as u64).saturating_mul(8);
        let wanted_bits = total_elems.saturating_mul(TARGET_BITS_PER_ELEM).max(64);
        let nbits = prev_power_of_two(wanted_bits.min(budget_bits).max(64));

        // Optimal k is ln(2) * m / n, clamped to something sane.
        let ratio = nbits as f64 / total_elems as f64;
        let k_hash_funcs = ((ratio * 0.693).round() as u32).clamp(1, MAX_HASH_FUNCS);

        Self {
            bitset: vec![0u8; (nbits / 8) as usize],
            nbits,
            k_hash_funcs,
            hasher_a: RandomState::with_seeds(seed, 0x9e37_79b9, 0x85eb_ca6b, 0xc2b2_ae35),
            hasher_b: RandomState::with_seeds(seed, 0x27d4_eb2f, 0x1656_67b1, 0x9e37_79f9),
        }
    }

    /// Add one element to the set.
    pub fn add_element(&mut self, elem: &[u8]) {
        let (h1, h2) = self.hash_pair(elem);
        for i in 0..self.k_hash_funcs {
            let bit = self.nth_bit(h1, h2, i);
            self.bitset[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    /// True iff the element was definitely never added.  A false return
    /// means the element is probably, but not certainly, present.
    pub fn lacks_element(&self, elem: &[u8]) -> bool {
        let (h1, h2) = self.hash_pair(elem);
        for i in 0..self.k_hash_funcs {
            let bit = self.nth_bit(h1, h2, i);
            if self.bitset[(bit / 8) as usize] & (1 << (bit % 8)) == 0 {
                return true;
            }
        }
        false
    }

    /// Fraction of bits set, a saturation diagnostic.  Values close to 0.5
    /// indicate the filter was sized about right; values near 1.0 mean the
    /// element estimate was far too low and probes are near-worthless.
    pub fn prop_bits_set(&self) -> f64 {
        let set: u64 = self.bitset.iter().map(|b| b.count_ones() as u64).sum();
        set as f64 / self.nbits as f64
    }

    pub fn nbits(&self) -> u64 {
        self.nbits
    }

    pub fn k_hash_funcs(&self) -> u32 {
        self.k_hash_funcs
    }

    /// Two independent 64-bit hashes; the k functions are their
    /// Kirsch-Mitzenmacher combinations h1 + i * h2.
    fn hash_pair(&self, elem: &[u8]) -> (u64, u64) {
        let mut a = self.hasher_a.build_hasher();
        a.write(elem);
        let mut b = self.hasher_b.build_hasher();
        b.write(elem);
        (a.finish(), b.finish())
    }

    fn nth_bit(&self, h1: u64, h2: u64, i: u32) -> u64 {
        // h2 is forced odd so successive functions cycle the whole array.
        h1.wrapping_add((i as u64).wrapping_mul(h2 | 1)) & (self.nbits - 1)
    }
}

fn prev_power_of_two(n: u64) -> u64 {
    debug_assert!(n > 0);
    1 << (63 - n.leading_zeros())
}
