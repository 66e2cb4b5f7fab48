//! Merging validated window pairs into passage-level clusters.
//!
//! Distinct `window_a` values and distinct `window_b` values are each cut into
//! runs of consecutive integers. Pairs are bucketed by (a-run, b-run); a bucket
//! whose own windows are not contiguous on both sides is cut again, so every
//! emitted cluster is contiguous on each side. Output order depends only on
//! the input set.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Cluster, DocPair, ValidatedMatch, WindowIndex};

type Entry = (WindowIndex, WindowIndex, u8);

/// Maximal runs of consecutive values in a sorted, distinct slice, as inclusive bounds.
pub fn sequences(values: &[WindowIndex]) -> Vec<(WindowIndex, WindowIndex)> {
    let mut runs = Vec::new();
    let mut iter = values.iter().copied();
    let Some(first) = iter.next() else {
        return runs;
    };
    let (mut start, mut last) = (first, first);
    for value in iter {
        if last.checked_add(1) != Some(value) {
            runs.push((start, last));
            start = value;
        }
        last = value;
    }
    runs.push((start, last));
    runs
}

fn run_index(runs: &[(WindowIndex, WindowIndex)], value: WindowIndex) -> usize {
    runs.partition_point(|&(_, end)| end < value)
}

fn distinct<F: Fn(&Entry) -> WindowIndex>(entries: &[Entry], key: F) -> Vec<WindowIndex> {
    entries.iter().map(key).collect::<BTreeSet<_>>().into_iter().collect()
}

fn split_contiguous(entries: Vec<Entry>) -> Vec<Vec<Entry>> {
    let runs_a = sequences(&distinct(&entries, |e| e.0));
    let runs_b = sequences(&distinct(&entries, |e| e.1));
    if runs_a.len() <= 1 && runs_b.len() <= 1 {
        return vec![entries];
    }
    let mut buckets: BTreeMap<(usize, usize), Vec<Entry>> = BTreeMap::new();
    for entry in entries {
        let key = (run_index(&runs_a, entry.0), run_index(&runs_b, entry.1));
        buckets.entry(key).or_default().push(entry);
    }
    buckets.into_values().flat_map(split_contiguous).collect()
}

#[derive(Debug, Clone, Copy)]
pub struct Clusterer {
    min_similarity: u8,
}

impl Clusterer {
    pub fn new(min_similarity: u8) -> Self {
        Self { min_similarity }
    }

    /// Clusters one document pair's matches. Clusters whose mean similarity
    /// falls below the minimum are dropped.
    pub fn cluster_pair(&self, pair: DocPair, matches: &[ValidatedMatch]) -> Vec<Cluster> {
        let mut entries: Vec<Entry> = matches
            .iter()
            .filter(|m| m.pair.doc_pair() == pair)
            .map(|m| (m.pair.window_a, m.pair.window_b, m.similarity))
            .collect();
        entries.sort_unstable();
        entries.dedup_by_key(|e| (e.0, e.1));
        if entries.is_empty() {
            return Vec::new();
        }

        let mut clusters: Vec<Cluster> = split_contiguous(entries)
            .into_iter()
            .map(|group| {
                let total: u64 = group.iter().map(|e| e.2 as u64).sum();
                Cluster {
                    doc_a: pair.doc_a,
                    doc_b: pair.doc_b,
                    windows_a: distinct(&group, |e| e.0),
                    windows_b: distinct(&group, |e| e.1),
                    mean_similarity: total as f64 / group.len() as f64,
                }
            })
            .filter(|c| c.mean_similarity >= self.min_similarity as f64)
            .collect();
        clusters.sort_by(|x, y| (&x.windows_a, &x.windows_b).cmp(&(&y.windows_a, &y.windows_b)));
        clusters
    }
}

/// Distinct windows covered on each side.
pub fn cluster_coverage(clusters: &[Cluster]) -> (usize, usize) {
    let a: BTreeSet<_> = clusters.iter().flat_map(|c| c.windows_a.iter()).collect();
    let b: BTreeSet<_> = clusters.iter().flat_map(|c| c.windows_b.iter()).collect();
    (a.len(), b.len())
}

pub fn match_coverage(matches: &[ValidatedMatch]) -> (usize, usize) {
    let a: BTreeSet<_> = matches.iter().map(|m| m.pair.window_a).collect();
    let b: BTreeSet<_> = matches.iter().map(|m| m.pair.window_b).collect();
    (a.len(), b.len())
}

/// Whether covered windows exceed `max_fraction` of either document's windows.
pub fn exceeds_file_similarity(
    covered: (usize, usize),
    window_counts: (usize, usize),
    max_fraction: f64,
) -> bool {
    let fraction = |covered: usize, total: usize| {
        if total == 0 { 0.0 } else { covered as f64 / total as f64 }
    };
    fraction(covered.0, window_counts.0) > max_fraction || fraction(covered.1, window_counts.1) > max_fraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidatePair;

    const PAIR: DocPair = DocPair { doc_a: 0, doc_b: 1 };

    fn m(window_a: WindowIndex, window_b: WindowIndex, similarity: u8) -> ValidatedMatch {
        ValidatedMatch {
            pair: CandidatePair { doc_a: 0, doc_b: 1, window_a, window_b },
            similarity,
        }
    }

    #[test]
    fn sequences_break_on_gaps() {
        assert_eq!(sequences(&[1, 2, 3, 5, 6, 9]), vec![(1, 3), (5, 6), (9, 9)]);
        assert!(sequences(&[]).is_empty());
    }

    #[test]
    fn adjacent_matches_form_one_cluster() {
        let clusters = Clusterer::new(50).cluster_pair(PAIR, &[m(5, 5, 90), m(6, 6, 100)]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].windows_a, vec![5, 6]);
        assert_eq!(clusters[0].windows_b, vec![5, 6]);
        assert_eq!(clusters[0].mean_similarity, 95.0);
    }

    #[test]
    fn isolated_match_is_its_own_cluster() {
        let clusters = Clusterer::new(50).cluster_pair(PAIR, &[m(5, 5, 90), m(6, 6, 90), m(20, 40, 80)]);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[1].windows_a, vec![20]);
        assert_eq!(clusters[1].windows_b, vec![40]);
    }

    #[test]
    fn clusters_are_contiguous_on_both_sides() {
        // (6, 30) shares the a-run with the diagonal but not the b-run.
        let clusters = Clusterer::new(1).cluster_pair(PAIR, &[m(5, 5, 90), m(6, 30, 90), m(7, 7, 90)]);
        for c in &clusters {
            for side in [&c.windows_a, &c.windows_b] {
                assert!(side.windows(2).all(|w| w[1] == w[0] + 1), "{:?}", c);
            }
        }
        assert_eq!(clusters.len(), 3);
    }

    #[test]
    fn low_mean_clusters_are_dropped() {
        let clusters = Clusterer::new(80).cluster_pair(PAIR, &[m(1, 1, 70), m(2, 2, 80)]);
        assert!(clusters.is_empty());
    }

    #[test]
    fn reclustering_is_stable() {
        let input = [m(3, 4, 70), m(1, 2, 90), m(2, 3, 80), m(10, 10, 100)];
        let c = Clusterer::new(50);
        let mut reversed = input.to_vec();
        reversed.reverse();
        assert_eq!(c.cluster_pair(PAIR, &input), c.cluster_pair(PAIR, &reversed));
    }

    #[test]
    fn file_similarity_guard_checks_both_sides() {
        assert!(exceeds_file_similarity((5, 1), (10, 100), 0.4));
        assert!(exceeds_file_similarity((1, 50), (10, 100), 0.4));
        assert!(!exceeds_file_similarity((4, 40), (10, 100), 0.4));
        assert!(!exceeds_file_similarity((3, 3), (0, 0), 0.1));
    }
}
