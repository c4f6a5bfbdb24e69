//! Ranking metrics against a set of relevant document ids.
//!
//! Every metric counts a relevant id at most once, at its first position,
//! so a backend that repeats a document cannot push recall or nDCG above 1.

use std::collections::HashSet;

/// Number of distinct relevant ids among the first `k` retrieved.
#[must_use]
pub fn hits_at_k(retrieved: &[String], relevant: &HashSet<String>, k: usize) -> usize {
    let mut seen = HashSet::new();
    retrieved
        .iter()
        .take(k)
        .filter(|id| relevant.contains(id.as_str()) && seen.insert(id.as_str()))
        .count()
}

/// Recall@k = |retrieved@k ∩ relevant| / max(1, |relevant|)
#[must_use]
pub fn recall_at_k(retrieved: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    hits_at_k(retrieved, relevant, k) as f64 / relevant.len().max(1) as f64
}

/// Recall with the denominator capped at `k`, so a query with more relevant
/// ids than retrieved slots can still reach 1.0.
#[must_use]
pub fn capped_recall_at_k(retrieved: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    let denominator = relevant.len().min(k).max(1);
    hits_at_k(retrieved, relevant, k) as f64 / denominator as f64
}

/// Reciprocal rank of the first relevant id over the whole list, 0 if none.
#[must_use]
pub fn reciprocal_rank(retrieved: &[String], relevant: &HashSet<String>) -> f64 {
    retrieved
        .iter()
        .position(|id| relevant.contains(id.as_str()))
        .map(|rank| 1.0 / (rank + 1) as f64)
        .unwrap_or(0.0)
}

/// Binary nDCG@k with discount `1 / log2(rank + 2)`.
#[must_use]
pub fn ndcg_at_k(retrieved: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    let idcg = ideal_dcg_at_k(relevant.len(), k);
    if idcg == 0.0 {
        return 0.0;
    }
    dcg_at_k(retrieved, relevant, k) / idcg
}

fn dcg_at_k(retrieved: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    let mut seen = HashSet::new();
    retrieved
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, id)| relevant.contains(id.as_str()) && seen.insert(id.as_str()))
        .map(|(rank, _)| discount(rank))
        .sum()
}

fn ideal_dcg_at_k(num_relevant: usize, k: usize) -> f64 {
    (0..num_relevant.min(k)).map(discount).sum()
}

fn discount(rank: usize) -> f64 {
    1.0 / (rank as f64 + 2.0).log2()
}

/// Arithmetic mean, `None` for an empty input.
#[must_use]
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn set(values: &[&str]) -> HashSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_worked_example() {
        let retrieved = ids(&["d2", "d3", "d1"]);
        let relevant = set(&["d1", "d2"]);

        assert_eq!(recall_at_k(&retrieved, &relevant, 5), 1.0);
        assert_eq!(reciprocal_rank(&retrieved, &relevant), 1.0);

        let expected = (1.0 + 1.0 / 4f64.log2()) / (1.0 + 1.0 / 3f64.log2());
        assert!((ndcg_at_k(&retrieved, &relevant, 5) - expected).abs() < 1e-12);
        assert!((expected - 0.9197).abs() < 1e-4);
    }

    #[test]
    fn test_mrr_uses_first_relevant_position() {
        let retrieved = ids(&["x", "d1", "d2"]);
        assert_eq!(reciprocal_rank(&retrieved, &set(&["d1", "d2"])), 0.5);
        assert_eq!(reciprocal_rank(&retrieved, &set(&["zz"])), 0.0);
        assert_eq!(reciprocal_rank(&[], &set(&["d1"])), 0.0);
    }

    #[test]
    fn test_empty_relevant_set() {
        let retrieved = ids(&["a", "b"]);
        let relevant = HashSet::new();
        assert_eq!(recall_at_k(&retrieved, &relevant, 5), 0.0);
        assert_eq!(capped_recall_at_k(&retrieved, &relevant, 5), 0.0);
        assert_eq!(ndcg_at_k(&retrieved, &relevant, 5), 0.0);
    }

    #[test]
    fn test_duplicates_count_once() {
        let retrieved = ids(&["a", "a", "a"]);
        let relevant = set(&["a", "b"]);
        assert_eq!(hits_at_k(&retrieved, &relevant, 3), 1);
        assert_eq!(recall_at_k(&retrieved, &relevant, 3), 0.5);
        assert!(ndcg_at_k(&retrieved, &relevant, 3) <= 1.0);
    }

    #[test]
    fn test_capped_recall() {
        let retrieved = ids(&["a", "b", "c"]);
        let relevant = set(&["a", "b", "x", "y", "z"]);
        assert_eq!(recall_at_k(&retrieved, &relevant, 3), 0.4);
        assert!((capped_recall_at_k(&retrieved, &relevant, 3) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_ranking_has_unit_ndcg() {
        let retrieved = ids(&["a", "b", "c", "d"]);
        let relevant = set(&["a", "b"]);
        assert!((ndcg_at_k(&retrieved, &relevant, 3) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(Vec::<f64>::new()), None);
        assert_eq!(mean([1.0, 2.0, 3.0]), Some(2.0));
    }
}
