//! Reciprocal Rank Fusion of two ranked lists.
//!
//! A document at zero-based rank `i` in a list contributes
//! `1 / (k + i + 1)` to its fused score; contributions from both lists are
//! summed. Only positions matter, so the lexical engine's BM25 scores and the
//! vector engine's cosine similarities never have to be normalized against
//! each other.
//!
//! Ties on the fused score keep the order of first appearance, scanning the
//! first list and then the second.

use crate::document::{DocumentRef, RankedList};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default RRF smoothing constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// A document after fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedDocument {
    /// Document identifier.
    pub id: String,
    /// Sum of RRF contributions.
    pub score: f64,
    /// Title from the first source that supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Text from the first source that supplied it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Zero-based rank in the first list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_a: Option<usize>,
    /// Zero-based rank in the second list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_b: Option<usize>,
}

impl FusedDocument {
    /// Whether both lists contained this document.
    pub fn in_both(&self) -> bool {
        self.rank_a.is_some() && self.rank_b.is_some()
    }
}

impl From<FusedDocument> for DocumentRef {
    fn from(doc: FusedDocument) -> Self {
        DocumentRef {
            id: doc.id,
            score: doc.score,
            title: doc.title,
            text: doc.text,
        }
    }
}

/// Reciprocal Rank Fusion with a configurable smoothing constant.
#[derive(Debug, Clone, Copy)]
pub struct RrfFusion {
    k: f64,
}

impl Default for RrfFusion {
    fn default() -> Self {
        Self { k: DEFAULT_RRF_K }
    }
}

impl RrfFusion {
    /// Create a fusion engine with the given constant.
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    /// The smoothing constant.
    pub fn k(&self) -> f64 {
        self.k
    }

    /// Contribution of a document at zero-based `rank`.
    pub fn contribution(&self, rank: usize) -> f64 {
        1.0 / (self.k + rank as f64 + 1.0)
    }

    /// Fuse two ranked lists and keep the best `limit` documents.
    ///
    /// A repeated id inside one list only counts at its first position.
    pub fn fuse(&self, list_a: &[DocumentRef], list_b: &[DocumentRef], limit: usize) -> Vec<FusedDocument> {
        let mut fused: Vec<FusedDocument> = Vec::with_capacity(list_a.len() + list_b.len());
        let mut positions: HashMap<&str, usize> = HashMap::new();

        for (rank, doc) in list_a.iter().enumerate() {
            if positions.contains_key(doc.id.as_str()) {
                continue;
            }
            positions.insert(doc.id.as_str(), fused.len());
            fused.push(FusedDocument {
                id: doc.id.clone(),
                score: self.contribution(rank),
                title: doc.title.clone(),
                text: doc.text.clone(),
                rank_a: Some(rank),
                rank_b: None,
            });
        }

        for (rank, doc) in list_b.iter().enumerate() {
            match positions.get(doc.id.as_str()) {
                Some(&pos) => {
                    let entry = &mut fused[pos];
                    if entry.rank_b.is_some() {
                        continue;
                    }
                    entry.score += self.contribution(rank);
                    entry.rank_b = Some(rank);
                    if entry.title.is_none() {
                        entry.title = doc.title.clone();
                    }
                    if entry.text.is_none() {
                        entry.text = doc.text.clone();
                    }
                }
                None => {
                    positions.insert(doc.id.as_str(), fused.len());
                    fused.push(FusedDocument {
                        id: doc.id.clone(),
                        score: self.contribution(rank),
                        title: doc.title.clone(),
                        text: doc.text.clone(),
                        rank_a: None,
                        rank_b: Some(rank),
                    });
                }
            }
        }

        // sort_by is stable: equal scores keep first-appearance order
        fused.sort_by(|a, b| b.score.total_cmp(&a.score));
        fused.truncate(limit);
        fused
    }

    /// Fuse two ranked lists into a new ranked list scored by RRF.
    pub fn fuse_lists(&self, list_a: &RankedList, list_b: &RankedList, limit: usize) -> RankedList {
        let documents = self
            .fuse(&list_a.documents, &list_b.documents, limit)
            .into_iter()
            .map(DocumentRef::from)
            .collect();
        RankedList::new(list_a.query.clone(), documents)
    }
}

/// Fuse with the default constant (60.0).
pub fn fuse(list_a: &[DocumentRef], list_b: &[DocumentRef], limit: usize) -> Vec<FusedDocument> {
    RrfFusion::default().fuse(list_a, list_b, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(ids: &[&str]) -> Vec<DocumentRef> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| DocumentRef::new(*id, 10.0 - i as f64))
            .collect()
    }

    #[test]
    fn test_single_list_keeps_order_and_scores() {
        let a = docs(&["d1", "d2", "d3"]);
        let fused = fuse(&a, &[], 10);

        assert_eq!(fused.len(), 3);
        for (rank, doc) in fused.iter().enumerate() {
            assert_eq!(doc.id, a[rank].id);
            assert_eq!(doc.score, 1.0 / (60.0 + rank as f64 + 1.0));
            assert_eq!(doc.rank_a, Some(rank));
            assert!(doc.rank_b.is_none());
        }
    }

    #[test]
    fn test_shared_document_ranks_first() {
        let lexical = docs(&["a", "b", "c"]);
        let vector = docs(&["c", "d", "a"]);
        let fused = fuse(&lexical, &vector, 10);

        assert_eq!(fused.len(), 4);
        // a: 1/61 + 1/63, c: 1/63 + 1/61
        let ids: Vec<&str> = fused.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(&ids[..2], &["a", "c"]);
        assert!(fused[0].in_both());
        assert!((fused[0].score - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-12);
        // b and d tie at 1/62; b appeared first
        assert_eq!(&ids[2..], &["b", "d"]);
    }

    #[test]
    fn test_identical_lists_double_scores() {
        let a = docs(&["x", "y", "z"]);
        let single = fuse(&a, &[], 10);
        let doubled = fuse(&a, &a, 10);

        for (s, d) in single.iter().zip(doubled.iter()) {
            assert_eq!(s.id, d.id);
            assert_eq!(d.score, 2.0 * s.score);
        }
    }

    #[test]
    fn test_metadata_backfill_does_not_overwrite() {
        let lexical = vec![DocumentRef::new("a", 9.0).with_title("Lexical title")];
        let vector = vec![
            DocumentRef::new("a", 0.9)
                .with_title("Vector title")
                .with_text("vector text"),
        ];
        let fused = fuse(&lexical, &vector, 5);

        assert_eq!(fused[0].title.as_deref(), Some("Lexical title"));
        assert_eq!(fused[0].text.as_deref(), Some("vector text"));
    }

    #[test]
    fn test_truncates_to_limit() {
        let fused = fuse(&docs(&["a", "b", "c"]), &docs(&["d", "e"]), 2);
        assert_eq!(fused.len(), 2);
        assert!(fuse(&[], &[], 5).is_empty());
        assert!(fuse(&docs(&["a"]), &[], 0).is_empty());
    }

    #[test]
    fn test_duplicate_within_list_counts_once() {
        let a = docs(&["a", "a", "b"]);
        let fused = fuse(&a, &[], 10);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].score, 1.0 / 61.0);
        assert_eq!(fused[1].rank_a, Some(2));
    }

    #[test]
    fn test_custom_constant() {
        let fusion = RrfFusion::new(1.0);
        let fused = fusion.fuse(&docs(&["a"]), &[], 1);
        assert_eq!(fused[0].score, 0.5);
    }

    #[test]
    fn test_fuse_lists_converts_to_ranked_list() {
        let a = RankedList::new("q", docs(&["a", "b"]));
        let b = RankedList::new("q", docs(&["b"]));
        let merged = RrfFusion::default().fuse_lists(&a, &b, 5);

        assert_eq!(merged.query, "q");
        assert_eq!(merged.ids(), vec!["b", "a"]);
    }
}
