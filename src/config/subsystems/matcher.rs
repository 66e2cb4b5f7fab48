// src/config/subsystems/matcher.rs

use serde::{Serialize, Deserialize};
use std::str::FromStr;
use crate::error::{Error, Result};
use crate::config::{FromIni, parse_value};

/// When the max-file-similarity guard is evaluated, and from which windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileSimilarityPolicy {
    /// Coverage counted from the distinct validated windows of the pair.
    BeforeClustering,
    /// Coverage counted from the distinct windows of the surviving clusters.
    AfterClustering,
}

impl FileSimilarityPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSimilarityPolicy::BeforeClustering => "before_clustering",
            FileSimilarityPolicy::AfterClustering => "after_clustering",
        }
    }
}

impl FromStr for FileSimilarityPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim_matches('"').to_lowercase().as_str() {
            "before_clustering" | "before" => Ok(Self::BeforeClustering),
            "after_clustering" | "after" => Ok(Self::AfterClustering),
            _ => Err(Error::config(format!("Invalid file_similarity_policy: {}", s))),
        }
    }
}

impl Default for FileSimilarityPolicy {
    fn default() -> Self {
        Self::AfterClustering
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Minimum similarity (1..=100) for a window pair and for a cluster mean.
    pub min_similarity: u8,
    /// Fraction of `min_similarity` the cheap prefilter must reach.
    pub prefilter_ratio: f64,
    /// Windows whose share of one-character tokens exceeds this fraction are rejected.
    pub max_single_char_ratio: f64,
    /// Document pairs covering more than this fraction of either document are dropped.
    pub max_file_similarity: Option<f64>,
    pub file_similarity_policy: FileSimilarityPolicy,
    /// Keep matches between two documents by the same author.
    pub same_author_matches: bool,
    /// Maximum graph distance from a banished document at which windows are removed.
    pub banish_distance: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_similarity: 65,
            prefilter_ratio: 0.75,
            max_single_char_ratio: 0.5,
            max_file_similarity: None,
            file_similarity_policy: FileSimilarityPolicy::AfterClustering,
            same_author_matches: true,
            banish_distance: 4,
        }
    }
}

impl FromIni for MatcherConfig {
    fn from_ini_section(&mut self, _section_name: &str, key: &str, value: &str) -> Option<Result<()>> {
        let result = match key {
            "min_similarity" => parse_value::<u32>(key, value).and_then(|v| {
                if (1..=100).contains(&v) {
                    self.min_similarity = v as u8;
                    Ok(())
                } else {
                    Err(Error::config(format!(
                        "Invalid min_similarity (must be between 1 and 100): {}",
                        value
                    )))
                }
            }),
            "prefilter_ratio" => parse_value(key, value).map(|v| self.prefilter_ratio = v),
            "max_single_char_ratio" => {
                parse_value(key, value).map(|v| self.max_single_char_ratio = v)
            }
            "max_file_similarity" => {
                let raw = value.trim_matches('"');
                if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
                    self.max_file_similarity = None;
                    Ok(())
                } else {
                    parse_value(key, raw).map(|v| self.max_file_similarity = Some(v))
                }
            }
            "file_similarity_policy" => {
                value.parse::<FileSimilarityPolicy>().map(|v| self.file_similarity_policy = v)
            }
            "same_author_matches" => parse_value(key, value).map(|v| self.same_author_matches = v),
            "banish_distance" => parse_value(key, value).map(|v| self.banish_distance = v),
            _ => return None,
        };
        Some(result)
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.min_similarity) {
            return Err(Error::config(format!(
                "min_similarity must be between 1 and 100: {}",
                self.min_similarity
            )));
        }
        if !(0.0..=1.0).contains(&self.prefilter_ratio) {
            return Err(Error::config(format!(
                "prefilter_ratio must be between 0 and 1: {}",
                self.prefilter_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.max_single_char_ratio) {
            return Err(Error::config(format!(
                "max_single_char_ratio must be between 0 and 1: {}",
                self.max_single_char_ratio
            )));
        }
        if let Some(max) = self.max_file_similarity {
            if !(max > 0.0 && max <= 1.0) {
                return Err(Error::config(format!(
                    "max_file_similarity must be in (0, 1]: {}",
                    max
                )));
            }
        }
        Ok(())
    }
}
