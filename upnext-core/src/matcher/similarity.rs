use super::error::ScoringResult;

/// A similarity metric on the 0..=100 scale.
pub trait SimilarityMetric: Send + Sync {
    fn score(&self, query: &str, candidate: &str) -> ScoringResult<f64>;
}

/// Partial-ratio similarity.
///
/// The shorter string is slid across the longer one, including windows that
/// hang off either end, and the best indel similarity of any alignment wins.
/// A query embedded in a longer filename therefore scores 100.
#[derive(Debug, Default, Clone, Copy)]
pub struct PartialRatio;

impl SimilarityMetric for PartialRatio {
    fn score(&self, query: &str, candidate: &str) -> ScoringResult<f64> {
        Ok(partial_ratio(query, candidate))
    }
}

pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return if a.is_empty() && b.is_empty() { 100.0 } else { 0.0 };
    }
    if a.len() == b.len() {
        return best_alignment(&a, &b).max(best_alignment(&b, &a));
    }
    if a.len() < b.len() {
        best_alignment(&a, &b)
    } else {
        best_alignment(&b, &a)
    }
}

fn best_alignment(short: &[char], long: &[char]) -> f64 {
    let len = short.len();
    let mut best = 0.0f64;

    for end in 1..len {
        best = best.max(indel_similarity(short, &long[..end]));
        if best >= 100.0 {
            return best;
        }
    }
    for start in 0..=long.len() - len {
        best = best.max(indel_similarity(short, &long[start..start + len]));
        if best >= 100.0 {
            return best;
        }
    }
    for start in long.len() - len + 1..long.len() {
        best = best.max(indel_similarity(short, &long[start..]));
        if best >= 100.0 {
            return best;
        }
    }
    best
}

fn indel_similarity(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    let lcs = longest_common_subsequence(a, b);
    200.0 * lcs as f64 / total as f64
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diagonal = 0usize;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}
