//! Ranking-quality evaluator: recall@k, MRR, nDCG@k and latency per query.

use super::metrics::{capped_recall_at_k, hits_at_k, ndcg_at_k, recall_at_k, reciprocal_rank};
use super::report::{EvalReport, MetricRow, SkippedQuery};
use super::run_ordered;
use crate::error::Result;
use crate::gold::GoldRecord;
use crate::retrieval::{Retriever, Target};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

/// Metric values for one gold query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub query: String,
    pub recall: f64,
    pub mrr: f64,
    pub ndcg: f64,
    /// Distinct relevant ids in the top K.
    pub hits: usize,
    pub relevant_count: usize,
    /// Hits over `min(K, relevant_count)`.
    pub capped_recall: f64,
    /// Duration of the retrieval call in seconds.
    pub latency_s: f64,
}

impl MetricRecord {
    /// Score a retrieved id list against a gold record.
    pub fn score(gold: &GoldRecord, retrieved: &[String], k: usize, latency_s: f64) -> Self {
        let relevant = gold.relevant_set();
        Self {
            query: gold.query.clone(),
            recall: recall_at_k(retrieved, &relevant, k),
            mrr: reciprocal_rank(retrieved, &relevant),
            ndcg: ndcg_at_k(retrieved, &relevant, k),
            hits: hits_at_k(retrieved, &relevant, k),
            relevant_count: relevant.len(),
            capped_recall: capped_recall_at_k(retrieved, &relevant, k),
            latency_s,
        }
    }
}

impl MetricRow for MetricRecord {
    fn metric_names() -> &'static [&'static str] {
        &[
            "recall",
            "mrr",
            "ndcg",
            "hits",
            "relevant_count",
            "capped_recall",
            "latency_s",
        ]
    }

    fn metric_values(&self) -> Vec<Option<f64>> {
        vec![
            Some(self.recall),
            Some(self.mrr),
            Some(self.ndcg),
            Some(self.hits as f64),
            Some(self.relevant_count as f64),
            Some(self.capped_recall),
            Some(self.latency_s),
        ]
    }

    fn query(&self) -> &str {
        &self.query
    }
}

/// Runs every gold query against one target and scores the ranking.
pub struct MetricEvaluator<'a, R> {
    retriever: &'a R,
    target: Target,
    k: usize,
    concurrency: usize,
}

impl<'a, R: Retriever + Sync> MetricEvaluator<'a, R> {
    pub fn new(retriever: &'a R, target: Target, k: usize) -> Self {
        Self {
            retriever,
            target,
            k: k.max(1),
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Evaluate one gold record.
    pub async fn evaluate_query(&self, gold: &GoldRecord) -> Result<MetricRecord> {
        let start = Instant::now();
        let list = self
            .retriever
            .retrieve(self.target, &gold.query, self.k)
            .await?;
        let latency_s = start.elapsed().as_secs_f64();

        Ok(MetricRecord::score(gold, &list.ids(), self.k, latency_s))
    }

    /// Evaluate the whole gold set. Failed queries are skipped with a warning.
    pub async fn run(&self, gold: &[GoldRecord]) -> EvalReport<MetricRecord> {
        let start = Instant::now();
        info!(eval_target = %self.target, k = self.k, queries = gold.len(), "ranking evaluation");

        let outcomes = run_ordered(gold, self.concurrency, "Ranking metrics", |record| async move {
            (record, self.evaluate_query(record).await)
        })
        .await;

        let mut report = EvalReport::new("metrics", self.target).with_setting("k", self.k);
        for (gold, outcome) in outcomes {
            match outcome {
                Ok(record) => report.records.push(record),
                Err(e) => {
                    warn!("Skipping '{}': {}", gold.query, e);
                    report.skipped.push(SkippedQuery::new(&gold.query, &e));
                }
            }
        }

        report.total_time_secs = start.elapsed().as_secs_f64();
        report.calculate_summary();
        report
    }
}
