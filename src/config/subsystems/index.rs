// src/config/subsystems/index.rs

use serde::{Serialize, Deserialize};
use crate::error::{Error, Result};
use crate::config::{FromIni, parse_value};
use super::window::WindowConfig;

/// LSH banding parameters.
///
/// `hashband_length`, `hashband_step` and the permutation count jointly trade
/// precision for recall: shorter bands and smaller steps produce more
/// collisions (more candidates, more validation work, fewer missed matches).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Fingerprint values per band.
    pub hashband_length: usize,
    /// Offset between the starts of consecutive bands; bands overlap when smaller than the length.
    pub hashband_step: usize,
    /// Candidate pairs held in memory per worker before a flush.
    pub candidate_batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            hashband_length: 4,
            hashband_step: 3,
            candidate_batch_size: 10_000,
        }
    }
}

impl FromIni for IndexConfig {
    fn from_ini_section(&mut self, _section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        let result = match key {
            "hashband_length" => parse_value(key, value).map(|v| self.hashband_length = v),
            "hashband_step" => parse_value(key, value).map(|v| self.hashband_step = v),
            "candidate_batch_size" => parse_value(key, value).map(|v| self.candidate_batch_size = v),
            _ => return None,
        };
        Some(result)
    }
}

impl IndexConfig {
    pub fn validate(&self, window: &WindowConfig) -> Result<()> {
        if self.hashband_length == 0 {
            return Err(Error::config("hashband_length must be > 0"));
        }
        if self.hashband_step == 0 || self.hashband_step > self.hashband_length {
            return Err(Error::config(format!(
                "hashband_step must be in 1..={} (got {})",
                self.hashband_length, self.hashband_step
            )));
        }
        if self.hashband_length > window.permutations {
            return Err(Error::config(format!(
                "hashband_length {} exceeds permutations {}: no bands would be produced",
                self.hashband_length, window.permutations
            )));
        }
        if self.candidate_batch_size == 0 {
            return Err(Error::config("candidate_batch_size must be > 0"));
        }
        Ok(())
    }

    /// Number of bands cut from a fingerprint of `permutations` values.
    pub fn band_count(&self, permutations: usize) -> usize {
        if permutations < self.hashband_length || self.hashband_step == 0 {
            return 0;
        }
        (permutations - self.hashband_length) / self.hashband_step + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_count_follows_step() {
        let index = IndexConfig { hashband_length: 4, hashband_step: 4, candidate_batch_size: 1 };
        assert_eq!(index.band_count(256), 64);
        let overlapping = IndexConfig { hashband_length: 4, hashband_step: 3, candidate_batch_size: 1 };
        assert_eq!(overlapping.band_count(10), 3);
        assert_eq!(overlapping.band_count(3), 0);
    }

    #[test]
    fn zero_bands_is_a_config_error() {
        let window = WindowConfig { permutations: 2, ..WindowConfig::default() };
        assert!(IndexConfig::default().validate(&window).is_err());
        let step_too_large = IndexConfig { hashband_step: 5, ..IndexConfig::default() };
        assert!(step_too_large.validate(&WindowConfig::default()).is_err());
    }
}
