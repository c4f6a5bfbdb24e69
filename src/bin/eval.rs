//! Evaluation CLI binary for the RAG retrieval targets.
//!
//! Usage:
//!   eval gold                      # Build the weak gold set from both backends
//!   eval metrics --target hybrid   # recall@k, MRR, nDCG@k, latency
//!   eval rouge --target lexical    # ROUGE-L against the corpus text
//!   eval judge --scale ten         # LLM-as-judge quality scores
//!
//! Options:
//!   --concurrency <N>              # Queries in flight (default: EVAL_CONCURRENCY)
//!   --max-queries <N>              # Limit number of gold queries
//!   --wait-ready                   # Poll the service health endpoint first
//!   --log-json                     # JSON logs on stderr

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_eval_harness::config::Config;
use rag_eval_harness::eval::{
    EvalReport, JudgeEvaluator, JudgeScale, MetricEvaluator, MetricRow, RougeEvaluator,
    RougeScorer,
};
use rag_eval_harness::gold::{GoldRecord, GoldSetBuilder};
use rag_eval_harness::llm::LlmClient;
use rag_eval_harness::logging;
use rag_eval_harness::persistence::{
    load_corpus, load_gold, load_seed_queries, save_gold, save_report,
};
use rag_eval_harness::retrieval::{RetrievalClient, RetryPolicy, Target};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "eval")]
#[command(about = "Evaluate retrieval quality of the RAG service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Number of queries evaluated concurrently
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Maximum number of queries to evaluate
    #[arg(long, global = true)]
    max_queries: Option<usize>,

    /// Wait for the service health endpoint before starting
    #[arg(long, global = true)]
    wait_ready: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the weak gold set from lexical/vector agreement
    Gold {
        /// Seed queries file (default: SEED_PATH)
        #[arg(long)]
        seed: Option<PathBuf>,

        /// Documents retrieved per backend (default: GOLD_TOPK)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output JSONL file (default: GOLD_PATH)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Ranking metrics against the gold set
    Metrics {
        /// lexical, vector, ask[-lexical|-vector|-both] or hybrid
        #[arg(short, long, default_value = "hybrid")]
        target: Target,

        /// Cutoff K (default: EVAL_K)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Gold set JSONL (default: GOLD_PATH)
        #[arg(long)]
        gold: Option<PathBuf>,

        /// Report file, .csv or .json
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// ROUGE-L between retrieved text and the gold documents' corpus text
    Rouge {
        #[arg(short, long, default_value = "hybrid")]
        target: Target,

        /// Documents whose text is concatenated (default: ROUGE_TOPK)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Prefix each retrieved text with its section title
        #[arg(long)]
        with_titles: bool,

        /// Corpus JSONL file or directory (default: CORPUS_PATH)
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Stemming language (default: STEM_LANGUAGE)
        #[arg(long)]
        language: Option<String>,

        #[arg(long)]
        gold: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// LLM-as-judge scores for the retrieved text
    Judge {
        #[arg(short, long, default_value = "hybrid")]
        target: Target,

        /// Documents whose text is sent to the judge (default: JUDGE_TOPK)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Score scale: ten (1-10) or five (0-5)
        #[arg(long, default_value = "ten")]
        scale: JudgeScale,

        #[arg(long)]
        gold: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    println!("RAG API: {}", config.backend.api_base);

    let client =
        RetrievalClient::new(config.backend.clone()).context("Failed to create retrieval client")?;

    if cli.wait_ready {
        let policy = RetryPolicy::from_settings(&config.eval);
        let attempts = client
            .wait_ready(&policy)
            .await
            .context("Service did not become ready")?;
        println!("Service ready after {} attempt(s)", attempts);
    }

    let concurrency = cli.concurrency.unwrap_or(config.eval.concurrency).max(1);
    let max_queries = cli.max_queries;

    match cli.command {
        Commands::Gold { seed, top_k, output } => {
            let seed = seed.unwrap_or_else(|| config.paths.seed_queries.clone());
            let output = output.unwrap_or_else(|| config.paths.gold.clone());
            let top_k = top_k.unwrap_or(config.eval.gold_top_k);

            let mut queries = load_seed_queries(&seed).context("Failed to load seed queries")?;
            if let Some(max) = max_queries {
                queries.truncate(max);
            }
            println!("Seed queries: {} from {}", queries.len(), seed.display());

            let start = Instant::now();
            let build = GoldSetBuilder::new(&client, top_k)
                .with_concurrency(concurrency)
                .build(&queries)
                .await;

            save_gold(&build.records, &output).context("Failed to save gold set")?;

            println!("\n========== Gold Set ==========");
            println!("Labeled: {}", build.records.len());
            println!("Skipped: {}", build.skipped.len());
            for skipped in &build.skipped {
                println!("  [{}] {}", skipped.reason, skipped.query);
            }
            println!("Total time: {:.1}s", start.elapsed().as_secs_f64());
            println!("Saved to: {}", output.display());
            println!("==============================\n");
        }

        Commands::Metrics {
            target,
            top_k,
            gold,
            output,
        } => {
            let gold = load_gold_set(gold.as_deref(), &config, max_queries)?;
            let k = top_k.unwrap_or(config.eval.eval_k);

            let report = MetricEvaluator::new(&client, target, k)
                .with_concurrency(concurrency)
                .run(&gold)
                .await;

            let output = output.unwrap_or_else(|| default_report_path(&config, "metrics", target));
            finish(&report, &output)?;
        }

        Commands::Rouge {
            target,
            top_k,
            with_titles,
            corpus,
            language,
            gold,
            output,
        } => {
            let gold = load_gold_set(gold.as_deref(), &config, max_queries)?;
            let corpus_path = corpus.unwrap_or_else(|| config.paths.corpus.clone());
            let corpus = load_corpus(&corpus_path).context("Failed to load corpus")?;
            println!("Corpus: {} sections", corpus.len());

            let language = language.unwrap_or_else(|| config.eval.stem_language.clone());
            let scorer = RougeScorer::new(&language).context("Invalid stemming language")?;
            let top_k = top_k.unwrap_or(config.eval.rouge_top_k);

            let report = RougeEvaluator::new(&client, &corpus, target, top_k)
                .with_scorer(scorer)
                .with_titles(with_titles)
                .with_concurrency(concurrency)
                .run(&gold)
                .await;

            let output = output.unwrap_or_else(|| default_report_path(&config, "rouge", target));
            finish(&report, &output)?;
        }

        Commands::Judge {
            target,
            top_k,
            scale,
            gold,
            output,
        } => {
            config
                .validate_judge()
                .context("Invalid judge configuration")?;
            let gold = load_gold_set(gold.as_deref(), &config, max_queries)?;
            let judge = LlmClient::new(config.llm.clone()).context("Failed to create LLM client")?;
            println!("Judge model: {} (scale: {})", judge.model(), scale);

            let top_k = top_k.unwrap_or(config.eval.judge_top_k);
            let report = JudgeEvaluator::new(&client, &judge, target, top_k, scale)
                .with_concurrency(concurrency)
                .run(&gold)
                .await;

            let output = output.unwrap_or_else(|| default_report_path(&config, "judge", target));
            finish(&report, &output)?;
        }
    }

    Ok(())
}

fn load_gold_set(path: Option<&Path>, config: &Config, max_queries: Option<usize>) -> Result<Vec<GoldRecord>> {
    let path = path.unwrap_or(config.paths.gold.as_path());
    let mut gold = load_gold(path).context("Failed to load gold set")?;
    if let Some(max) = max_queries {
        gold.truncate(max);
    }
    println!("Gold set: {} queries from {}", gold.len(), path.display());
    Ok(gold)
}

fn default_report_path(config: &Config, evaluator: &str, target: Target) -> PathBuf {
    config
        .paths
        .reports_dir
        .join(format!("{}_{}.csv", evaluator, target))
}

fn finish<T: MetricRow + Serialize>(report: &EvalReport<T>, output: &Path) -> Result<()> {
    report.print_summary();
    save_report(report, output).context("Failed to save report")?;
    println!("Report saved to {}", output.display());
    Ok(())
}
