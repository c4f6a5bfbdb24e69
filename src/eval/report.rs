//! Evaluation reports: per-query records, skipped queries and means.

use super::metrics::mean;
use crate::error::EvalError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A per-query record that contributes numeric columns to a report.
pub trait MetricRow {
    /// Names of the numeric columns, in output order.
    fn metric_names() -> &'static [&'static str];

    /// Values for [`MetricRow::metric_names`]; `None` is excluded from means.
    fn metric_values(&self) -> Vec<Option<f64>>;

    /// Names of trailing text columns.
    fn text_names() -> &'static [&'static str] {
        &[]
    }

    /// Values for [`MetricRow::text_names`].
    fn text_values(&self) -> Vec<String> {
        Vec::new()
    }

    /// The query this record belongs to.
    fn query(&self) -> &str;
}

/// A query that produced no record, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedQuery {
    pub query: String,
    /// Error kind, e.g. `backend_timeout`.
    pub reason: String,
    /// Full error message.
    pub detail: String,
}

impl SkippedQuery {
    pub fn new(query: impl Into<String>, error: &EvalError) -> Self {
        Self {
            query: query.into(),
            reason: error.kind().to_string(),
            detail: error.to_string(),
        }
    }
}

/// Output of one evaluator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport<T> {
    /// Evaluator name (`metrics`, `rouge`, `judge`).
    pub evaluator: String,
    /// Retrieval target the queries were sent to.
    pub target: String,
    /// Run parameters such as `k` or the judge scale.
    pub settings: BTreeMap<String, String>,
    /// One record per evaluated query, in gold-set order.
    pub records: Vec<T>,
    /// Queries excluded from the means.
    pub skipped: Vec<SkippedQuery>,
    /// Queries evaluated but flagged for inspection.
    pub flagged: Vec<String>,
    /// Mean of each numeric column over the non-null values.
    pub means: BTreeMap<String, Option<f64>>,
    /// Wall-clock duration of the run.
    pub total_time_secs: f64,
}

impl<T: MetricRow> EvalReport<T> {
    /// Create an empty report.
    pub fn new(evaluator: &str, target: impl ToString) -> Self {
        Self {
            evaluator: evaluator.to_string(),
            target: target.to_string(),
            settings: BTreeMap::new(),
            records: Vec::new(),
            skipped: Vec::new(),
            flagged: Vec::new(),
            means: BTreeMap::new(),
            total_time_secs: 0.0,
        }
    }

    /// Record a run parameter.
    pub fn with_setting(mut self, key: &str, value: impl ToString) -> Self {
        self.settings.insert(key.to_string(), value.to_string());
        self
    }

    /// Mean values in column order.
    pub fn mean_row(&self) -> Vec<Option<f64>> {
        (0..T::metric_names().len())
            .map(|i| mean(self.records.iter().filter_map(|r| r.metric_values()[i])))
            .collect()
    }

    /// Calculate means from the records.
    pub fn calculate_summary(&mut self) {
        let row = self.mean_row();
        self.means = T::metric_names()
            .iter()
            .zip(row)
            .map(|(name, value)| (name.to_string(), value))
            .collect();
    }

    /// Print summary to stdout.
    pub fn print_summary(&self) {
        println!("\n========== {} Report ==========", self.evaluator);
        println!("Target: {}", self.target);
        for (key, value) in &self.settings {
            println!("{}: {}", key, value);
        }
        println!(
            "Evaluated: {}  Skipped: {}",
            self.records.len(),
            self.skipped.len()
        );
        println!("----------------------------------------");
        for name in T::metric_names() {
            match self.means.get(*name).copied().flatten() {
                Some(value) => println!("Mean {:<16} {:.4}", name, value),
                None => println!("Mean {:<16} n/a", name),
            }
        }

        if !self.skipped.is_empty() {
            println!("----------------------------------------");
            println!("Skipped queries (excluded from means):");
            for skipped in &self.skipped {
                println!("  [{}] {}", skipped.reason, skipped.query);
            }
        }

        if !self.flagged.is_empty() {
            println!("----------------------------------------");
            println!("Flagged queries:");
            for query in &self.flagged {
                println!("  {}", query);
            }
        }

        println!("----------------------------------------");
        println!("Total time: {:.1}s", self.total_time_secs);
        println!("========================================\n");
    }
}
