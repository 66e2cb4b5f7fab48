//! MinHash sketches over character shingles.
//!
//! Each shingle is hashed once with xxh3; the `N` permutations are simulated by
//! re-mixing that hash with `N` fixed keys derived from a constant seed, so a
//! fingerprint depends only on the window text and the parameters.

use xxhash_rust::xxh3::xxh3_64;

use crate::config::subsystems::WindowConfig;

pub type Fingerprint = Vec<u64>;

const PERMUTATION_SEED: u64 = 0x6E61_7A69_7231_0001;

#[derive(Debug, Clone)]
pub struct MinHasher {
    chargram_length: usize,
    keys: Vec<u64>,
}

impl MinHasher {
    pub fn new(config: &WindowConfig) -> Self {
        let keys = (0..config.permutations as u64)
            .map(|j| splitmix64(PERMUTATION_SEED.wrapping_add(j.wrapping_mul(0x9E37_79B9_7F4A_7C15))))
            .collect();
        Self {
            chargram_length: config.chargram_length,
            keys,
        }
    }

    pub fn permutations(&self) -> usize {
        self.keys.len()
    }

    /// Sorted, de-duplicated hashes of every `chargram_length`-character shingle.
    ///
    /// Text shorter than one shingle contributes itself as a single shingle.
    pub fn shingles(&self, text: &str) -> Vec<u64> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let mut buffer = String::with_capacity(self.chargram_length * 4);
        let mut hashes: Vec<u64> = if chars.len() < self.chargram_length {
            vec![xxh3_64(text.as_bytes())]
        } else {
            chars
                .windows(self.chargram_length)
                .map(|gram| {
                    buffer.clear();
                    buffer.extend(gram.iter());
                    xxh3_64(buffer.as_bytes())
                })
                .collect()
        };
        hashes.sort_unstable();
        hashes.dedup();
        hashes
    }

    /// The minimum permuted shingle hash per permutation.
    pub fn fingerprint(&self, text: &str) -> Fingerprint {
        let shingles = self.shingles(text);
        self.keys
            .iter()
            .map(|&key| {
                shingles
                    .iter()
                    .map(|&h| splitmix64(h ^ key))
                    .min()
                    .unwrap_or(u64::MAX)
            })
            .collect()
    }
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Fraction of positions on which two fingerprints agree.
pub fn estimated_jaccard(a: &[u64], b: &[u64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let same = a.iter().zip(b).filter(|(x, y)| x == y).count();
    same as f64 / a.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher(permutations: usize) -> MinHasher {
        MinHasher::new(&WindowConfig { permutations, ..WindowConfig::default() })
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let text = "in the beginning was the word and the word was with god";
        let a = hasher(128).fingerprint(text);
        let b = hasher(128).fingerprint(text);
        assert_eq!(a.len(), 128);
        assert_eq!(a, b);
    }

    #[test]
    fn similar_texts_agree_on_more_positions() {
        let m = hasher(256);
        let base = m.fingerprint("the quick brown fox jumps over the lazy dog near the river bank");
        let close = m.fingerprint("the quick brown fox jumped over the lazy dog near the river bank");
        let far = m.fingerprint("completely unrelated sentence about medieval manuscripts and ink");
        assert!(estimated_jaccard(&base, &close) > estimated_jaccard(&base, &far));
        assert!(estimated_jaccard(&base, &close) > 0.5);
    }

    #[test]
    fn shingles_are_unique_and_short_text_is_one_shingle() {
        let m = hasher(4);
        assert_eq!(m.shingles("aaaa").len(), 1);
        assert_eq!(m.shingles("ab").len(), 1);
        assert!(m.shingles("").is_empty());
        assert!(m.fingerprint("").iter().all(|&v| v == u64::MAX));
    }
}
