//! ROUGE-L text similarity between retrieved text and the gold corpus text.
//!
//! Tokens are lowercased, split on non-alphanumeric characters and stemmed
//! when longer than three characters. The score is the F-measure of the
//! longest common subsequence of the two token streams.

use super::report::{EvalReport, MetricRow, SkippedQuery};
use super::run_ordered;
use crate::document::Corpus;
use crate::error::{EvalError, Result};
use crate::gold::GoldRecord;
use crate::retrieval::{Retriever, Target};
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Precision, recall and F-measure of one ROUGE-L comparison.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RougeScore {
    pub precision: f64,
    pub recall: f64,
    pub fmeasure: f64,
}

/// Tokenizer and LCS scorer.
pub struct RougeScorer {
    stemmer: Stemmer,
}

impl RougeScorer {
    /// Scorer stemming with the named Snowball language.
    pub fn new(language: &str) -> Result<Self> {
        Ok(Self {
            stemmer: Stemmer::create(stem_algorithm(language)?),
        })
    }

    /// Lowercase, split on non-alphanumerics, stem tokens longer than 3 chars.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| {
                if t.chars().count() > 3 {
                    self.stemmer.stem(t).into_owned()
                } else {
                    t.to_string()
                }
            })
            .collect()
    }

    /// ROUGE-L of `candidate` against `reference`.
    pub fn score(&self, reference: &str, candidate: &str) -> RougeScore {
        let reference = self.tokenize(reference);
        let candidate = self.tokenize(candidate);
        rouge_l(&reference, &candidate)
    }
}

impl Default for RougeScorer {
    fn default() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::English),
        }
    }
}

/// Snowball algorithm for a language name.
pub fn stem_algorithm(language: &str) -> Result<Algorithm> {
    let algorithm = match language.trim().to_lowercase().as_str() {
        "english" | "en" | "porter" => Algorithm::English,
        "spanish" | "es" => Algorithm::Spanish,
        "portuguese" | "pt" => Algorithm::Portuguese,
        "french" | "fr" => Algorithm::French,
        "italian" | "it" => Algorithm::Italian,
        "german" | "de" => Algorithm::German,
        "dutch" | "nl" => Algorithm::Dutch,
        "romanian" | "ro" => Algorithm::Romanian,
        "danish" | "da" => Algorithm::Danish,
        "swedish" | "sv" => Algorithm::Swedish,
        "norwegian" | "no" => Algorithm::Norwegian,
        "finnish" | "fi" => Algorithm::Finnish,
        "russian" | "ru" => Algorithm::Russian,
        other => {
            return Err(EvalError::Configuration(format!(
                "Unsupported stemming language '{}'",
                other
            )));
        }
    };
    Ok(algorithm)
}

/// ROUGE-L over token sequences. Zero when either side is empty.
pub fn rouge_l<T: PartialEq>(reference: &[T], candidate: &[T]) -> RougeScore {
    let lcs = lcs_len(reference, candidate);
    if lcs == 0 {
        return RougeScore::default();
    }

    let precision = lcs as f64 / candidate.len() as f64;
    let recall = lcs as f64 / reference.len() as f64;
    RougeScore {
        precision,
        recall,
        fmeasure: 2.0 * precision * recall / (precision + recall),
    }
}

/// Length of the longest common subsequence, two-row DP.
fn lcs_len<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// ROUGE-L result for one gold query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RougeRecord {
    pub query: String,
    /// ROUGE-L F-measure, 0 when nothing was retrieved with text.
    pub rouge_l_f: f64,
    pub latency_s: f64,
    /// Whether the retrieved documents carried any text.
    pub has_text: bool,
    /// Relevant ids absent from the corpus.
    pub missing_ids: usize,
}

impl MetricRow for RougeRecord {
    fn metric_names() -> &'static [&'static str] {
        &["rouge_l_f", "latency_s"]
    }

    fn metric_values(&self) -> Vec<Option<f64>> {
        vec![Some(self.rouge_l_f), Some(self.latency_s)]
    }

    fn text_names() -> &'static [&'static str] {
        &["has_text", "missing_ids"]
    }

    fn text_values(&self) -> Vec<String> {
        vec![self.has_text.to_string(), self.missing_ids.to_string()]
    }

    fn query(&self) -> &str {
        &self.query
    }
}

/// Compares retrieved text with the corpus text of the gold documents.
pub struct RougeEvaluator<'a, R> {
    retriever: &'a R,
    corpus: &'a Corpus,
    scorer: RougeScorer,
    target: Target,
    top_k: usize,
    with_titles: bool,
    concurrency: usize,
}

impl<'a, R: Retriever + Sync> RougeEvaluator<'a, R> {
    pub fn new(retriever: &'a R, corpus: &'a Corpus, target: Target, top_k: usize) -> Self {
        Self {
            retriever,
            corpus,
            scorer: RougeScorer::default(),
            target,
            top_k: top_k.max(1),
            with_titles: false,
            concurrency: 1,
        }
    }

    pub fn with_scorer(mut self, scorer: RougeScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Prefix each retrieved text with its section title.
    pub fn with_titles(mut self, with_titles: bool) -> Self {
        self.with_titles = with_titles;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Reference text for a gold record and the number of ids missing from
    /// the corpus.
    pub fn reference_text(&self, gold: &GoldRecord) -> (String, usize) {
        let mut parts = Vec::new();
        let mut missing = 0;
        for id in &gold.relevant_doc_ids {
            match self.corpus.text(id) {
                Ok(text) => parts.push(text),
                Err(e) => {
                    debug!("{}", e);
                    missing += 1;
                }
            }
        }
        (parts.join(" "), missing)
    }

    /// Evaluate one gold record.
    pub async fn evaluate_query(&self, gold: &GoldRecord) -> Result<RougeRecord> {
        let (reference, missing_ids) = self.reference_text(gold);

        let start = Instant::now();
        let list = self
            .retriever
            .retrieve(self.target, &gold.query, self.top_k)
            .await?;
        let latency_s = start.elapsed().as_secs_f64();

        let candidate = list.joined_text(self.with_titles);
        let has_text = !candidate.trim().is_empty();
        let rouge_l_f = if has_text {
            self.scorer.score(&reference, &candidate).fmeasure
        } else {
            0.0
        };

        Ok(RougeRecord {
            query: gold.query.clone(),
            rouge_l_f,
            latency_s,
            has_text,
            missing_ids,
        })
    }

    /// Evaluate the whole gold set. Queries whose retrieval returned no text
    /// score 0 and are flagged.
    pub async fn run(&self, gold: &[GoldRecord]) -> EvalReport<RougeRecord> {
        let start = Instant::now();
        info!(eval_target = %self.target, top_k = self.top_k, queries = gold.len(), "ROUGE-L evaluation");

        let outcomes = run_ordered(gold, self.concurrency, "ROUGE-L", |record| async move {
            (record, self.evaluate_query(record).await)
        })
        .await;

        let mut report = EvalReport::new("rouge", self.target)
            .with_setting("top_k", self.top_k)
            .with_setting("with_titles", self.with_titles);
        for (gold, outcome) in outcomes {
            match outcome {
                Ok(record) => {
                    if !record.has_text {
                        warn!("No retrieved text for '{}'", record.query);
                        report.flagged.push(record.query.clone());
                    }
                    report.records.push(record);
                }
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
