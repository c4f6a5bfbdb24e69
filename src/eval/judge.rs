//! LLM-as-judge evaluation of retrieved text.
//!
//! The judge is asked for strict JSON but its replies are read through an
//! ordered chain of strategies, stopping at the first one that yields a
//! score:
//!
//! 1. the whole reply as a JSON object (code fences stripped);
//! 2. the first balanced `{...}` fragment that parses;
//! 3. the first three numbers in the reply, taken positionally;
//! 4. nothing: null scores with the raw reply as the comment.
//!
//! A reply that defeats every strategy is recorded, never raised.

use super::report::{EvalReport, MetricRow, SkippedQuery};
use super::run_ordered;
use crate::error::{EvalError, Result};
use crate::gold::GoldRecord;
use crate::llm::{LlmClient, Prompts};
use crate::retrieval::{Retriever, Target};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Maximum length of a raw reply kept as a comment.
const COMMENT_MAX_CHARS: usize = 200;

/// Anything that answers a judge prompt with free text.
pub trait Judge {
    fn judge(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

impl Judge for LlmClient {
    async fn judge(&self, prompt: &str) -> Result<String> {
        self.complete(Some(Prompts::system_judge()), prompt).await
    }
}

/// Score scale of a judge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgeScale {
    /// 1 to 10, with a comment.
    Ten,
    /// 0 to 5, scores only.
    Five,
}

impl JudgeScale {
    /// Inclusive score bounds.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            JudgeScale::Ten => (1.0, 10.0),
            JudgeScale::Five => (0.0, 5.0),
        }
    }

    /// Characters of retrieved text sent to the judge.
    pub fn char_budget(&self) -> usize {
        match self {
            JudgeScale::Ten => 4000,
            JudgeScale::Five => 3000,
        }
    }

    pub fn template(&self) -> &'static str {
        match self {
            JudgeScale::Ten => Prompts::judge_ten_point(),
            JudgeScale::Five => Prompts::judge_five_point(),
        }
    }

    fn clamp(&self, value: f64) -> Option<f64> {
        let (min, max) = self.bounds();
        value.is_finite().then(|| value.clamp(min, max))
    }
}

impl fmt::Display for JudgeScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JudgeScale::Ten => write!(f, "ten"),
            JudgeScale::Five => write!(f, "five"),
        }
    }
}

impl FromStr for JudgeScale {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ten" | "10" | "1-10" => Ok(JudgeScale::Ten),
            "five" | "5" | "0-5" => Ok(JudgeScale::Five),
            other => Err(EvalError::Configuration(format!(
                "Unknown judge scale '{}'. Use ten or five.",
                other
            ))),
        }
    }
}

/// Which step of the parse chain produced the scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    DirectJson,
    EmbeddedJson,
    NumericTokens,
    Unparsed,
}

impl fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseStrategy::DirectJson => "direct_json",
            ParseStrategy::EmbeddedJson => "embedded_json",
            ParseStrategy::NumericTokens => "numeric_tokens",
            ParseStrategy::Unparsed => "unparsed",
        };
        write!(f, "{}", name)
    }
}

/// Scores read from one judge reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeScores {
    pub relevance: Option<f64>,
    pub coherence: Option<f64>,
    pub fidelity: Option<f64>,
    pub comment: Option<String>,
}

impl JudgeScores {
    fn has_score(&self) -> bool {
        self.relevance.is_some() || self.coherence.is_some() || self.fidelity.is_some()
    }

    /// Null scores carrying a note as the comment.
    pub fn null_with_comment(note: &str) -> Self {
        Self {
            comment: Some(note.trim().chars().take(COMMENT_MAX_CHARS).collect()),
            ..Self::default()
        }
    }
}

#[derive(Deserialize)]
struct RawScores {
    #[serde(default, alias = "relevancia", alias = "Relevance", alias = "Relevancia")]
    relevance: Option<Value>,
    #[serde(default, alias = "coherencia", alias = "Coherence", alias = "Coherencia")]
    coherence: Option<Value>,
    #[serde(default, alias = "fidelidad", alias = "Fidelity", alias = "Fidelidad")]
    fidelity: Option<Value>,
    #[serde(default, alias = "comentario", alias = "Comment", alias = "Comentario")]
    comment: Option<Value>,
}

/// Parse a judge reply, falling back through the strategy chain.
pub fn parse_judge_response(raw: &str, scale: JudgeScale) -> (JudgeScores, ParseStrategy) {
    match try_parse_judge_response(raw, scale) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("{}", e);
            (JudgeScores::null_with_comment(raw), ParseStrategy::Unparsed)
        }
    }
}

/// Run the parse chain, failing with [`EvalError::MalformedJudgeResponse`]
/// when no strategy yields a score.
pub fn try_parse_judge_response(raw: &str, scale: JudgeScale) -> Result<(JudgeScores, ParseStrategy)> {
    let text = strip_code_fences(raw);

    if let Some(scores) = scores_from_json(text, scale) {
        return Ok((scores, ParseStrategy::DirectJson));
    }

    if let Some(scores) = json_fragments(text)
        .into_iter()
        .find_map(|fragment| scores_from_json(fragment, scale))
    {
        return Ok((scores, ParseStrategy::EmbeddedJson));
    }

    if let Some(scores) = scores_from_numbers(text, scale) {
        return Ok((scores, ParseStrategy::NumericTokens));
    }

    Err(EvalError::MalformedJudgeResponse(
        raw.chars().take(COMMENT_MAX_CHARS).collect(),
    ))
}

/// Remove a surrounding Markdown code fence, if any.
fn strip_code_fences(response: &str) -> &str {
    let response = response.trim();
    if !response.starts_with("```") {
        return response;
    }

    let body = match response.find('\n') {
        Some(newline) => &response[newline + 1..],
        None => response.trim_start_matches('`'),
    };
    body.trim_end().trim_end_matches("```").trim()
}

fn scores_from_json(text: &str, scale: JudgeScale) -> Option<JudgeScores> {
    let value: Value = serde_json::from_str(text).ok()?;
    if !value.is_object() {
        return None;
    }
    let raw: RawScores = serde_json::from_value(value).ok()?;

    let scores = JudgeScores {
        relevance: raw.relevance.as_ref().and_then(|v| score_value(v, scale)),
        coherence: raw.coherence.as_ref().and_then(|v| score_value(v, scale)),
        fidelity: raw.fidelity.as_ref().and_then(|v| score_value(v, scale)),
        comment: raw.comment.and_then(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }),
    };
    scores.has_score().then_some(scores)
}

/// A score given as a number or a numeric string.
fn score_value(value: &Value, scale: JudgeScale) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .or_else(|| numbers(s).first().copied())?,
        _ => return None,
    };
    scale.clamp(number)
}

/// Balanced `{...}` fragments in order of their opening brace.
fn json_fragments(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut fragments = Vec::new();

    for (start, _) in text.match_indices('{') {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, &b) in bytes[start..].iter().enumerate() {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        fragments.push(&text[start..=start + offset]);
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    fragments
}

fn scores_from_numbers(text: &str, scale: JudgeScale) -> Option<JudgeScores> {
    let found = numbers(text);
    if found.len() < 3 {
        return None;
    }
    Some(JudgeScores {
        relevance: scale.clamp(found[0]),
        coherence: scale.clamp(found[1]),
        fidelity: scale.clamp(found[2]),
        comment: None,
    })
}

static NUMBER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").ok());

fn numbers(text: &str) -> Vec<f64> {
    let Some(re) = NUMBER.as_ref() else {
        return Vec::new();
    };
    re.find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// Judge result for one gold query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRecord {
    pub query: String,
    pub relevance: Option<f64>,
    pub coherence: Option<f64>,
    pub fidelity: Option<f64>,
    pub comment: Option<String>,
    /// Parse step that produced the scores; `None` when the judge call failed.
    pub strategy: Option<ParseStrategy>,
    /// Duration of the retrieval call in seconds.
    pub latency_s: f64,
    pub has_text: bool,
}

impl JudgeRecord {
    fn is_null(&self) -> bool {
        self.relevance.is_none() && self.coherence.is_none() && self.fidelity.is_none()
    }
}

impl MetricRow for JudgeRecord {
    fn metric_names() -> &'static [&'static str] {
        &["relevance", "coherence", "fidelity", "latency_s"]
    }

    fn metric_values(&self) -> Vec<Option<f64>> {
        vec![
            self.relevance,
            self.coherence,
            self.fidelity,
            Some(self.latency_s),
        ]
    }

    fn text_names() -> &'static [&'static str] {
        &["strategy", "comment"]
    }

    fn text_values(&self) -> Vec<String> {
        vec![
            self.strategy
                .map(|s| s.to_string())
                .unwrap_or_else(|| "judge_error".to_string()),
            self.comment.clone().unwrap_or_default(),
        ]
    }

    fn query(&self) -> &str {
        &self.query
    }
}

/// Retrieves text for each gold query and asks the judge to score it.
pub struct JudgeEvaluator<'a, R, J> {
    retriever: &'a R,
    judge: &'a J,
    target: Target,
    top_k: usize,
    scale: JudgeScale,
    concurrency: usize,
}

impl<'a, R: Retriever + Sync, J: Judge + Sync> JudgeEvaluator<'a, R, J> {
    pub fn new(retriever: &'a R, judge: &'a J, target: Target, top_k: usize, scale: JudgeScale) -> Self {
        Self {
            retriever,
            judge,
            target,
            top_k: top_k.max(1),
            scale,
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Prompt for a query and its retrieved text, truncated to the budget.
    pub fn prompt(&self, query: &str, retrieved_text: &str) -> String {
        let budget: String = retrieved_text.chars().take(self.scale.char_budget()).collect();
        Prompts::render(self.scale.template(), query, &budget)
    }

    /// Evaluate one gold record. Only a retrieval failure is an error.
    pub async fn evaluate_query(&self, gold: &GoldRecord) -> Result<JudgeRecord> {
        let start = Instant::now();
        let list = self
            .retriever
            .retrieve(self.target, &gold.query, self.top_k)
            .await?;
        let latency_s = start.elapsed().as_secs_f64();

        let text = list.joined_text(false);
        let has_text = !text.is_empty();

        let (scores, strategy) = match self.judge.judge(&self.prompt(&gold.query, &text)).await {
            Ok(reply) => {
                let (scores, strategy) = parse_judge_response(&reply, self.scale);
                (scores, Some(strategy))
            }
            Err(e) => {
                warn!("Judge failed for '{}': {}", gold.query, e);
                (JudgeScores::null_with_comment(&e.to_string()), None)
            }
        };

        Ok(JudgeRecord {
            query: gold.query.clone(),
            relevance: scores.relevance,
            coherence: scores.coherence,
            fidelity: scores.fidelity,
            comment: scores.comment,
            strategy,
            latency_s,
            has_text,
        })
    }

    /// Evaluate the whole gold set. Null-scored queries stay in the report
    /// and are flagged; means use non-null values only.
    pub async fn run(&self, gold: &[GoldRecord]) -> EvalReport<JudgeRecord> {
        let start = Instant::now();
        info!(
            eval_target = %self.target,
            scale = %self.scale,
            queries = gold.len(),
            "judge evaluation"
        );

        let outcomes = run_ordered(gold, self.concurrency, "Judging", |record| async move {
            (record, self.evaluate_query(record).await)
        })
        .await;

        let mut report = EvalReport::new("judge", self.target)
            .with_setting("scale", self.scale)
            .with_setting("top_k", self.top_k);
        for (gold, outcome) in outcomes {
            match outcome {
                Ok(record) => {
                    if record.is_null() || !record.has_text {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentRef;
    use crate::eval::testing::FixtureRetriever;

    /// Replies by the first query text found in the prompt.
    struct ScriptedJudge {
        replies: Vec<(&'static str, std::result::Result<&'static str, &'static str>)>,
    }

    impl Judge for ScriptedJudge {
        async fn judge(&self, prompt: &str) -> Result<String> {
            for (needle, reply) in &self.replies {
                if prompt.contains(needle) {
                    return reply
                        .map(str::to_string)
                        .map_err(|e| EvalError::LlmApi(e.to_string()));
                }
            }
            Err(EvalError::LlmApi("no scripted reply".to_string()))
        }
    }

    fn gold(query: &str) -> GoldRecord {
        GoldRecord {
            query: query.to_string(),
            relevant_doc_ids: vec!["d1".to_string()],
            partially_relevant_doc_ids: Vec::new(),
            expected_answer_summary: String::new(),
        }
    }

    #[test]
    fn test_direct_json() {
        let (scores, strategy) = parse_judge_response(
            r#"{"relevance": 8, "coherence": 7, "fidelity": 9, "comment": "ok"}"#,
            JudgeScale::Ten,
        );
        assert_eq!(strategy, ParseStrategy::DirectJson);
        assert_eq!(scores.relevance, Some(8.0));
        assert_eq!(scores.coherence, Some(7.0));
        assert_eq!(scores.fidelity, Some(9.0));
        assert_eq!(scores.comment.as_deref(), Some("ok"));
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let reply = "```json\n{\"relevance\": 4, \"coherence\": 3, \"fidelity\": 5}\n```";
        let (scores, strategy) = parse_judge_response(reply, JudgeScale::Five);
        assert_eq!(strategy, ParseStrategy::DirectJson);
        assert_eq!(scores.fidelity, Some(5.0));
    }

    #[test]
    fn test_noisy_json() {
        let reply = r#"Sure! Here is my evaluation: {"relevance": 8, "coherence": 7, "fidelity": 9} Hope that helps {"#;
        let (scores, strategy) = parse_judge_response(reply, JudgeScale::Ten);
        assert_eq!(strategy, ParseStrategy::EmbeddedJson);
        assert_eq!(
            (scores.relevance, scores.coherence, scores.fidelity),
            (Some(8.0), Some(7.0), Some(9.0))
        );
    }

    #[test]
    fn test_embedded_json_skips_unparseable_fragments() {
        let reply = r#"Note {not json} then {"relevancia": "8", "coherencia": 7, "fidelidad": 9, "comentario": "texto con } llave"}"#;
        let (scores, strategy) = parse_judge_response(reply, JudgeScale::Ten);
        assert_eq!(strategy, ParseStrategy::EmbeddedJson);
        assert_eq!(scores.relevance, Some(8.0));
        assert_eq!(scores.comment.as_deref(), Some("texto con } llave"));
    }

    #[test]
    fn test_numeric_tokens() {
        let (scores, strategy) = parse_judge_response("Score: 8, 7, 9", JudgeScale::Ten);
        assert_eq!(strategy, ParseStrategy::NumericTokens);
        assert_eq!(
            (scores.relevance, scores.coherence, scores.fidelity),
            (Some(8.0), Some(7.0), Some(9.0))
        );
        assert!(scores.comment.is_none());
    }

    #[test]
    fn test_score_strings_with_units() {
        let reply = r#"{"relevance": "8/10", "coherence": "7.5 points", "fidelity": "9"}"#;
        for _ in 0..3 {
            let (scores, strategy) = parse_judge_response(reply, JudgeScale::Ten);
            assert_eq!(strategy, ParseStrategy::DirectJson);
            assert_eq!(
                (scores.relevance, scores.coherence, scores.fidelity),
                (Some(8.0), Some(7.5), Some(9.0))
            );
        }
        assert_eq!(numbers("1, 2.5 and 3"), vec![1.0, 2.5, 3.0]);
    }

    #[test]
    fn test_unparseable_reply_gives_nulls() {
        let (scores, strategy) = parse_judge_response("I cannot answer", JudgeScale::Ten);
        assert_eq!(strategy, ParseStrategy::Unparsed);
        assert!(scores.relevance.is_none());
        assert!(scores.coherence.is_none());
        assert!(scores.fidelity.is_none());
        assert_eq!(scores.comment.as_deref(), Some("I cannot answer"));

        assert!(matches!(
            try_parse_judge_response("I cannot answer", JudgeScale::Ten),
            Err(EvalError::MalformedJudgeResponse(_))
        ));
    }

    #[test]
    fn test_unparsed_comment_is_truncated() {
        let long = "x".repeat(500);
        let (scores, _) = parse_judge_response(&long, JudgeScale::Five);
        assert_eq!(scores.comment.map(|c| c.len()), Some(200));
    }

    #[test]
    fn test_scores_are_clamped_to_scale() {
        let (scores, _) = parse_judge_response(
            r#"{"relevance": 12, "coherence": 0, "fidelity": 5}"#,
            JudgeScale::Ten,
        );
        assert_eq!(scores.relevance, Some(10.0));
        assert_eq!(scores.coherence, Some(1.0));

        let (scores, _) = parse_judge_response("7 8 9", JudgeScale::Five);
        assert_eq!(scores.relevance, Some(5.0));
    }

    #[test]
    fn test_json_without_scores_falls_through() {
        let (_, strategy) = parse_judge_response(r#"{"comment": "no scores here"}"#, JudgeScale::Ten);
        assert_eq!(strategy, ParseStrategy::Unparsed);
    }

    #[test]
    fn test_scale_parsing() {
        assert_eq!("ten".parse::<JudgeScale>().unwrap(), JudgeScale::Ten);
        assert_eq!("5".parse::<JudgeScale>().unwrap(), JudgeScale::Five);
        assert!("seven".parse::<JudgeScale>().is_err());
    }

    #[tokio::test]
    async fn test_prompt_truncates_to_budget() {
        let retriever = FixtureRetriever::new();
        let judge = ScriptedJudge { replies: vec![] };
        let evaluator = JudgeEvaluator::new(&retriever, &judge, Target::LEXICAL, 3, JudgeScale::Five);

        let prompt = evaluator.prompt("q", &"a".repeat(5000));
        assert!(prompt.contains(&"a".repeat(3000)));
        assert!(!prompt.contains(&"a".repeat(3001)));
    }

    #[tokio::test]
    async fn test_run_records_judge_failures_and_skips_retrieval_failures() {
        let doc = |text: &str| vec![DocumentRef::new("d1", 1.0).with_text(text)];
        let retriever = FixtureRetriever::new()
            .with_docs(Target::LEXICAL, "alpha", doc("alpha text"))
            .with_docs(Target::LEXICAL, "beta", doc("beta text"))
            .with_docs(Target::LEXICAL, "gamma", doc("gamma text"))
            .failing(Target::LEXICAL, "delta");
        let judge = ScriptedJudge {
            replies: vec![
                ("alpha", Ok(r#"{"relevance": 4, "coherence": 4, "fidelity": 2}"#)),
                ("beta", Ok("I cannot answer")),
                ("gamma", Err("503 Service Unavailable")),
            ],
        };

        let evaluator = JudgeEvaluator::new(&retriever, &judge, Target::LEXICAL, 3, JudgeScale::Five)
            .with_concurrency(2);
        let report = evaluator
            .run(&[gold("alpha"), gold("beta"), gold("gamma"), gold("delta")])
            .await;

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records[0].strategy, Some(ParseStrategy::DirectJson));
        assert_eq!(report.records[1].strategy, Some(ParseStrategy::Unparsed));
        assert_eq!(report.records[2].strategy, None);
        assert!(report.records[2]
            .comment
            .as_deref()
            .is_some_and(|c| c.contains("503")));

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.flagged, vec!["beta".to_string(), "gamma".to_string()]);
        assert_eq!(report.means["relevance"], Some(4.0));
        assert_eq!(report.means["fidelity"], Some(2.0));
        assert_eq!(report.settings["scale"], "five");
    }
}
