//! Property-based tests for fusion, metrics and gold labeling

use proptest::prelude::*;
use rag_eval_harness::{
    DocumentRef, GoldRecord,
    eval::metrics::{ndcg_at_k, recall_at_k, reciprocal_rank},
    fuse,
};
use std::collections::HashSet;

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn ranked_ids() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("d[0-9]{1,2}", 0..20).prop_map(dedup)
}

fn docs(ids: &[String]) -> Vec<DocumentRef> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| DocumentRef::new(id.as_str(), 100.0 - i as f64))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_fuse_length_is_bounded(a in ranked_ids(), b in ranked_ids(), k in 0usize..30) {
        let fused = fuse(&docs(&a), &docs(&b), k);
        let union: HashSet<&String> = a.iter().chain(b.iter()).collect();

        prop_assert!(fused.len() <= k);
        prop_assert!(fused.len() <= union.len());

        // Each id appears once
        let ids: HashSet<&str> = fused.iter().map(|d| d.id.as_str()).collect();
        prop_assert_eq!(ids.len(), fused.len());
    }

    #[test]
    fn prop_fuse_with_empty_list_keeps_order(a in ranked_ids()) {
        let fused = fuse(&docs(&a), &[], a.len());

        prop_assert_eq!(fused.len(), a.len());
        for (rank, (doc, id)) in fused.iter().zip(a.iter()).enumerate() {
            prop_assert_eq!(&doc.id, id);
            prop_assert!((doc.score - 1.0 / (60.0 + rank as f64 + 1.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn prop_fuse_self_doubles_scores(a in ranked_ids()) {
        let single = fuse(&docs(&a), &[], a.len());
        let doubled = fuse(&docs(&a), &docs(&a), a.len());

        prop_assert_eq!(single.len(), doubled.len());
        for (s, d) in single.iter().zip(doubled.iter()) {
            prop_assert_eq!(&s.id, &d.id);
            prop_assert!((d.score - 2.0 * s.score).abs() < 1e-12);
        }
    }

    #[test]
    fn prop_fused_scores_are_descending(a in ranked_ids(), b in ranked_ids()) {
        let fused = fuse(&docs(&a), &docs(&b), 40);
        for pair in fused.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn prop_recall_is_monotone_in_k(
        retrieved in ranked_ids(),
        relevant in prop::collection::hash_set("d[0-9]{1,2}", 0..10),
        k in 0usize..20,
    ) {
        let smaller = recall_at_k(&retrieved, &relevant, k);
        let larger = recall_at_k(&retrieved, &relevant, k + 1);
        prop_assert!(smaller <= larger);
        prop_assert!((0.0..=1.0).contains(&larger));
    }

    #[test]
    fn prop_ndcg_is_bounded(
        retrieved in prop::collection::vec("d[0-9]", 0..20),
        relevant in prop::collection::hash_set("d[0-9]", 0..10),
        k in 1usize..20,
    ) {
        let ndcg = ndcg_at_k(&retrieved, &relevant, k);
        prop_assert!((0.0..=1.0 + 1e-12).contains(&ndcg));
    }

    #[test]
    fn prop_relevant_first_gives_unit_ndcg(
        relevant in prop::collection::hash_set("r[0-9]{1,2}", 1..10),
        noise in prop::collection::vec("n[0-9]{1,2}", 0..10),
        k in 1usize..20,
    ) {
        let mut retrieved: Vec<String> = relevant.iter().cloned().collect();
        retrieved.extend(noise);

        let ndcg = ndcg_at_k(&retrieved, &relevant, k);
        prop_assert!((ndcg - 1.0).abs() < 1e-9);
        prop_assert_eq!(reciprocal_rank(&retrieved, &relevant), 1.0);
    }

    #[test]
    fn prop_gold_labels_partition_union(lexical in ranked_ids(), vector in ranked_ids()) {
        let record = GoldRecord::from_agreement("q", &lexical, &vector);

        let relevant: HashSet<&String> = record.relevant_doc_ids.iter().collect();
        let partial: HashSet<&String> = record.partially_relevant_doc_ids.iter().collect();
        prop_assert!(relevant.is_disjoint(&partial));

        let union: HashSet<&String> = lexical.iter().chain(vector.iter()).collect();
        let labeled: HashSet<&String> = relevant.union(&partial).copied().collect();
        prop_assert_eq!(labeled, union);

        let lexical_set: HashSet<&String> = lexical.iter().collect();
        let vector_set: HashSet<&String> = vector.iter().collect();
        let both: HashSet<&String> = lexical_set.intersection(&vector_set).copied().collect();
        prop_assert_eq!(relevant, both);
    }
}

#[test]
fn test_end_to_end_worked_example() {
    let relevant: HashSet<String> = ["d1", "d2"].iter().map(|s| s.to_string()).collect();
    let retrieved: Vec<String> = ["d2", "d3", "d1"].iter().map(|s| s.to_string()).collect();

    let expected_ndcg = (1.0 + 1.0 / 4f64.log2()) / (1.0 + 1.0 / 3f64.log2());
    let ndcg = ndcg_at_k(&retrieved, &relevant, 5);

    assert_eq!(recall_at_k(&retrieved, &relevant, 5), 1.0);
    assert_eq!(reciprocal_rank(&retrieved, &relevant), 1.0);
    assert!((ndcg - expected_ndcg).abs() < 1e-12);
    assert_eq!(format!("{:.4}", ndcg), "0.9197");
}
