//! LSH banding of fingerprints.
//!
//! A band is `hashband_length` consecutive fingerprint values starting at
//! offsets `0, step, 2*step, ...`. Its key is the concatenation of the values
//! as fixed-width hex, so keys sort and shard by prefix. The band offset is not
//! part of the key: equal values at different offsets collide.
//!
//! `hashband_length`, `hashband_step` and `permutations` together tune recall:
//! shorter or more overlapping bands find more pairs at the cost of more rows.

use std::fmt::Write;

use crate::config::subsystems::IndexConfig;
use crate::types::{DocId, HashbandRow, WindowIndex};

/// Hex characters of the key prefix that selects a partition.
pub const PARTITION_PREFIX_LEN: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct Bander {
    length: usize,
    step: usize,
}

impl Bander {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            length: config.hashband_length,
            step: config.hashband_step,
        }
    }

    /// Distinct band keys of one fingerprint, sorted.
    pub fn band_keys(&self, fingerprint: &[u64]) -> Vec<String> {
        if fingerprint.len() < self.length || self.length == 0 || self.step == 0 {
            return Vec::new();
        }
        let mut keys: Vec<String> = (0..=fingerprint.len() - self.length)
            .step_by(self.step)
            .map(|offset| {
                let mut key = String::with_capacity(self.length * 16);
                for value in &fingerprint[offset..offset + self.length] {
                    // Writing into a String cannot fail.
                    let _ = write!(key, "{:016x}", value);
                }
                key
            })
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    pub fn rows(&self, doc_id: DocId, window: WindowIndex, fingerprint: &[u64]) -> Vec<HashbandRow> {
        self.band_keys(fingerprint)
            .into_iter()
            .map(|band| HashbandRow { band, doc_id, window })
            .collect()
    }
}

pub fn partition_of(band: &str) -> &str {
    &band[..PARTITION_PREFIX_LEN.min(band.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bander(length: usize, step: usize) -> Bander {
        Bander::new(&IndexConfig {
            hashband_length: length,
            hashband_step: step,
            ..IndexConfig::default()
        })
    }

    #[test]
    fn band_count_follows_length_and_step() {
        let fp: Vec<u64> = (0..12).collect();
        assert_eq!(bander(4, 4).band_keys(&fp).len(), 3);
        assert_eq!(bander(4, 2).band_keys(&fp).len(), 5);
        assert_eq!(bander(4, 1).band_keys(&fp).len(), 9);
    }

    #[test]
    fn zero_step_yields_no_bands() {
        assert!(bander(4, 0).band_keys(&[1, 2, 3, 4, 5]).is_empty());
    }

    #[test]
    fn keys_are_fixed_width_hex() {
        let keys = bander(2, 2).band_keys(&[1, 255]);
        assert_eq!(keys, vec!["000000000000000100000000000000ff".to_string()]);
        assert_eq!(partition_of(&keys[0]), "00");
    }

    #[test]
    fn repeated_bands_within_a_window_are_collapsed() {
        let fp = vec![7u64; 8];
        assert_eq!(bander(2, 1).band_keys(&fp).len(), 1);
        assert_eq!(bander(2, 1).rows(3, 9, &fp)[0].doc_id, 3);
    }
}
