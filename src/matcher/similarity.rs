use ahash::AHashMap;

// Character multiset, for the cheap upper bound
type CharFreqs = AHashMap<char, usize>;

fn char_freqs(text: &str) -> CharFreqs {
    let mut freqs = CharFreqs::new();
    for c in text.chars() {
        *freqs.entry(c).or_insert(0) += 1;
    }
    freqs
}

/// `2 * M / (|a| + |b|)` where `M` is the size of the character multiset
/// intersection. Never below [`alignment_ratio`] for the same inputs, so it
/// can reject pairs without the quadratic alignment.
pub fn quick_ratio(a: &str, b: &str) -> f64 {
    let (len_a, len_b) = (a.chars().count(), b.chars().count());
    if len_a + len_b == 0 {
        return 1.0;
    }
    let freqs_a = char_freqs(a);
    let freqs_b = char_freqs(b);
    let (small, large) = if freqs_a.len() <= freqs_b.len() { (&freqs_a, &freqs_b) } else { (&freqs_b, &freqs_a) };
    let shared: usize = small
        .iter()
        .map(|(c, n)| (*n).min(large.get(c).copied().unwrap_or(0)))
        .sum();
    2.0 * shared as f64 / (len_a + len_b) as f64
}

/// `2 * LCS / (|a| + |b|)` over characters. Symmetric in its arguments.
pub fn alignment_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    2.0 * lcs_length(&a, &b) as f64 / (a.len() + b.len()) as f64
}

fn lcs_length(a: &[char], b: &[char]) -> usize {
    let (outer, inner) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; inner.len() + 1];
    let mut curr = vec![0usize; inner.len() + 1];
    for &x in outer {
        for (j, &y) in inner.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[inner.len()]
}

/// A ratio in `[0, 1]` scaled to an integer score in `[0, 100]`.
pub fn to_score(ratio: f64) -> u8 {
    (ratio.clamp(0.0, 1.0) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_scores_full_marks() {
        assert_eq!(to_score(alignment_ratio("abc def", "abc def")), 100);
        assert_eq!(to_score(quick_ratio("abc def", "abc def")), 100);
    }

    #[test]
    fn ratios_are_symmetric() {
        let pairs = [
            ("the cat sat on the mat", "a cat sat on a hat"),
            ("abcd", "dcba"),
            ("", "xyz"),
            ("qabxcd", "abycdf"),
        ];
        for (a, b) in pairs {
            assert_eq!(alignment_ratio(a, b), alignment_ratio(b, a));
            assert_eq!(quick_ratio(a, b), quick_ratio(b, a));
        }
    }

    #[test]
    fn quick_ratio_bounds_alignment() {
        let pairs = [("abcd", "dcba"), ("kitten", "sitting"), ("night", "thing")];
        for (a, b) in pairs {
            assert!(quick_ratio(a, b) >= alignment_ratio(a, b));
        }
        // anagrams share every character but not their order
        assert_eq!(quick_ratio("abcd", "dcba"), 1.0);
        assert_eq!(alignment_ratio("abcd", "dcba"), 0.25);
    }

    #[test]
    fn lcs_of_classic_example() {
        let a: Vec<char> = "ABCBDAB".chars().collect();
        let b: Vec<char> = "BDCABA".chars().collect();
        assert_eq!(lcs_length(&a, &b), 4);
    }
}
