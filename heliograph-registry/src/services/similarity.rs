//! String similarity for fuzzy title matching

/// Insertion/deletion similarity in [0, 1]
///
/// `1 - indel_distance / (len_a + len_b)`, where the indel distance counts
/// only insertions and deletions (a substitution costs two). Equivalently
/// `2 * lcs / (len_a + len_b)`. Lengths are in chars. 1.0 means identical;
/// two empty strings are identical.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let indel_distance = total - 2 * lcs_len(&a, &b);
    1.0 - indel_distance as f64 / total as f64
}

/// Longest common subsequence length, one DP row
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let (outer, inner) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut row = vec![0usize; inner.len() + 1];

    for &x in outer {
        let mut diagonal = 0;
        for (j, &y) in inner.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if x == y {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }

    row[inner.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
    }

    #[test]
    fn test_identical_strings() {
        assert_eq!(similarity_ratio("graph neural networks", "graph neural networks"), 1.0);
        assert_eq!(similarity_ratio("", ""), 1.0);
    }

    #[test]
    fn test_disjoint_strings() {
        assert_eq!(similarity_ratio("abc", "xyz"), 0.0);
        assert_eq!(similarity_ratio("abc", ""), 0.0);
    }

    #[test]
    fn test_substitution_costs_two() {
        // lcs 3 of 4 + 4
        assert_close(similarity_ratio("abcd", "abxd"), 6.0 / 8.0);
    }

    #[test]
    fn test_appended_suffix_scores_by_combined_length() {
        // 18 + 21 chars, three insertions
        let score = similarity_ratio("flux rope dynamics", "flux rope dynamics ii");
        assert_close(score, 36.0 / 39.0);
        assert!(score >= 0.9);
    }

    #[test]
    fn test_single_typo_is_above_default_threshold() {
        let a = "attention is all you need";
        let b = "attention is all you nead";
        assert!(similarity_ratio(a, b) >= 0.9);
    }

    #[test]
    fn test_different_titles_are_below_default_threshold() {
        assert!(similarity_ratio("deep residual learning", "shallow neural parsing") < 0.9);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        assert_close(similarity_ratio("café", "cafe"), 6.0 / 8.0);
    }

    #[test]
    fn test_ratio_is_symmetric() {
        let a = "protein folding";
        let b = "protein foldings";
        assert_eq!(similarity_ratio(a, b), similarity_ratio(b, a));
    }
}
