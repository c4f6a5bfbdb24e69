//! Weak gold set built from agreement between the two retrieval backends.
//!
//! For each seed query both backends are asked for their top-K documents.
//! Documents returned by both are labeled relevant; documents returned by
//! only one are labeled partially relevant. Agreement between two
//! independent retrievers is only a proxy for relevance: relevant documents
//! that neither backend ranks in its top-K are never labeled, so downstream
//! recall numbers are measured against this approximation, not human labels.

use crate::error::{EvalError, Result};
use crate::eval::{SkippedQuery, run_ordered};
use crate::retrieval::{Retriever, Target};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// One line of the gold-label collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldRecord {
    /// The query text (unique key).
    pub query: String,
    /// Ids returned by both backends.
    #[serde(default)]
    pub relevant_doc_ids: Vec<String>,
    /// Ids returned by exactly one backend.
    #[serde(default)]
    pub partially_relevant_doc_ids: Vec<String>,
    /// Human-written answer summary, empty when none was written.
    #[serde(default)]
    pub expected_answer_summary: String,
}

impl GoldRecord {
    /// Label a query from the two backends' id lists.
    ///
    /// Relevant ids keep lexical rank order. Partially relevant ids list the
    /// lexical-only ids first, then the vector-only ids, each in rank order.
    pub fn from_agreement(query: impl Into<String>, lexical_ids: &[String], vector_ids: &[String]) -> Self {
        let lexical: HashSet<&str> = lexical_ids.iter().map(String::as_str).collect();
        let vector: HashSet<&str> = vector_ids.iter().map(String::as_str).collect();

        let mut seen = HashSet::new();
        let mut relevant = Vec::new();
        let mut partial = Vec::new();

        for id in lexical_ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            if vector.contains(id.as_str()) {
                relevant.push(id.clone());
            } else {
                partial.push(id.clone());
            }
        }
        for id in vector_ids {
            if !lexical.contains(id.as_str()) && seen.insert(id.as_str()) {
                partial.push(id.clone());
            }
        }

        Self {
            query: query.into(),
            relevant_doc_ids: relevant,
            partially_relevant_doc_ids: partial,
            expected_answer_summary: String::new(),
        }
    }

    /// Relevant ids as a set.
    pub fn relevant_set(&self) -> HashSet<String> {
        self.relevant_doc_ids.iter().cloned().collect()
    }
}

/// Output of a gold set build.
#[derive(Debug, Clone, Default)]
pub struct GoldBuild {
    /// One record per successfully labeled query, in input order.
    pub records: Vec<GoldRecord>,
    /// Queries left unlabeled because a retrieval failed.
    pub skipped: Vec<SkippedQuery>,
}

/// Builds the weak gold set by querying both backends.
pub struct GoldSetBuilder<'a, R> {
    retriever: &'a R,
    top_k: usize,
    concurrency: usize,
}

impl<'a, R: Retriever + Sync> GoldSetBuilder<'a, R> {
    /// Create a builder retrieving `top_k` documents per backend.
    pub fn new(retriever: &'a R, top_k: usize) -> Self {
        Self {
            retriever,
            top_k,
            concurrency: 1,
        }
    }

    /// Label up to `concurrency` queries at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Label one query.
    pub async fn label(&self, query: &str) -> Result<GoldRecord> {
        let lexical = self
            .retriever
            .retrieve(Target::LEXICAL, query, self.top_k)
            .await?;
        let vector = self
            .retriever
            .retrieve(Target::VECTOR, query, self.top_k)
            .await?;

        Ok(GoldRecord::from_agreement(query, &lexical.ids(), &vector.ids()))
    }

    /// Label every query, skipping (with a warning) the ones whose
    /// retrieval fails.
    ///
    /// A repeated query is labeled once, at its first occurrence, so the
    /// result always passes [`check_unique_queries`].
    pub async fn build(&self, queries: &[String]) -> GoldBuild {
        let queries = dedup_queries(queries);
        info!(queries = queries.len(), top_k = self.top_k, "building weak gold set");

        let outcomes: Vec<(String, Result<GoldRecord>)> =
            run_ordered(&queries, self.concurrency, "Labeling queries", |query| async move {
                (query.clone(), self.label(query).await)
            })
            .await;

        let mut build = GoldBuild::default();
        for (query, outcome) in outcomes {
            match outcome {
                Ok(record) => build.records.push(record),
                Err(e) => {
                    warn!("Skipping gold label for '{}': {}", query, e);
                    build.skipped.push(SkippedQuery::new(query, &e));
                }
            }
        }

        info!(
            labeled = build.records.len(),
            skipped = build.skipped.len(),
            "gold set built"
        );
        build
    }
}

fn dedup_queries(queries: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(queries.len());
    for query in queries {
        if seen.insert(query.as_str()) {
            unique.push(query.clone());
        } else {
            warn!("Dropping repeated seed query '{}'", query);
        }
    }
    unique
}

/// Reject gold sets that repeat a query.
pub fn check_unique_queries(records: &[GoldRecord]) -> Result<()> {
    let mut seen = HashSet::new();
    for record in records {
        if !seen.insert(record.query.as_str()) {
            return Err(EvalError::Configuration(format!(
                "Gold set contains duplicate query '{}'",
                record.query
            )));
        }
    }
    Ok(())
}
