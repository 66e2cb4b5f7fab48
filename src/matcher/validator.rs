//! Exact re-scoring of candidate window pairs.
//!
//! Window text is re-derived from the token streams. Each pair first goes
//! through [`quick_ratio`], gated at `prefilter_ratio * min_similarity`, and
//! only survivors are aligned. Windows dominated by one-character tokens
//! (numeral lists, sigla) are rejected whatever their score.

use log::{trace, warn};

use crate::config::subsystems::MatcherConfig;
use crate::types::{CandidatePair, ValidatedMatch};
use crate::window::Windower;
use super::similarity::{alignment_ratio, quick_ratio, to_score};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Prefilter,
    BelowThreshold(u8),
    SingleCharTokens,
}

pub struct Validator<'a> {
    windower: &'a Windower,
    min_similarity: u8,
    prefilter_threshold: f64,
    max_single_char_tokens: usize,
}

impl<'a> Validator<'a> {
    pub fn new(windower: &'a Windower, config: &MatcherConfig) -> Self {
        let max_single_char_tokens =
            (config.max_single_char_ratio * windower.window_length() as f64).floor() as usize;
        Self {
            windower,
            min_similarity: config.min_similarity,
            prefilter_threshold: config.prefilter_ratio * config.min_similarity as f64 / 100.0,
            max_single_char_tokens,
        }
    }

    /// Scores two window texts. Symmetric in `a` and `b`.
    pub fn score(&self, a: &str, b: &str) -> Result<u8, Rejection> {
        if self.single_char_dominated(a) || self.single_char_dominated(b) {
            return Err(Rejection::SingleCharTokens);
        }
        if quick_ratio(a, b) < self.prefilter_threshold {
            return Err(Rejection::Prefilter);
        }
        let score = to_score(alignment_ratio(a, b));
        if score < self.min_similarity {
            return Err(Rejection::BelowThreshold(score));
        }
        Ok(score)
    }

    fn single_char_dominated(&self, window: &str) -> bool {
        window.split_whitespace().filter(|t| t.chars().count() == 1).count() > self.max_single_char_tokens
    }

    /// Validates all candidates of one document pair against its token streams.
    ///
    /// Candidates naming a window past the end of either stream are logged and skipped.
    pub fn validate_pair(
        &self,
        tokens_a: &[String],
        tokens_b: &[String],
        candidates: &[CandidatePair],
    ) -> Vec<ValidatedMatch> {
        let mut kept = Vec::new();
        for pair in candidates {
            let texts = (
                self.windower.window_text(tokens_a, pair.window_a),
                self.windower.window_text(tokens_b, pair.window_b),
            );
            let (Some(text_a), Some(text_b)) = texts else {
                warn!(
                    "Skipping stale candidate {} ~ {}: window out of bounds ({} / {} tokens)",
                    pair.side_a(),
                    pair.side_b(),
                    tokens_a.len(),
                    tokens_b.len()
                );
                continue;
            };
            match self.score(&text_a, &text_b) {
                Ok(similarity) => kept.push(ValidatedMatch { pair: *pair, similarity }),
                Err(reason) => trace!("Rejected {} ~ {}: {:?}", pair.side_a(), pair.side_b(), reason),
            }
        }
        kept
    }
}
