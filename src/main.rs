//! RAG Eval Harness CLI
//!
//! Ad-hoc retrieval against the RAG service: single queries, side-by-side
//! backend comparison, offline fusion of saved ranked lists and health checks.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_eval_harness::{
    config::Config,
    document::RankedList,
    fusion::{FusedDocument, RrfFusion},
    llm::LlmClient,
    logging,
    persistence::{load_ranked_list, save_ranked_list},
    retrieval::{Backend, RetrievalClient, Retriever, RetryPolicy, Target},
};
use std::path::PathBuf;
use std::time::Instant;

/// RAG Eval Harness - query, compare and fuse the lexical and vector backends
#[derive(Parser)]
#[command(name = "rag-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one query against a retrieval target
    Query {
        /// The search query
        query: String,

        /// lexical, vector, ask[-lexical|-vector|-both] or hybrid
        #[arg(short, long, default_value = "hybrid")]
        target: Target,

        /// Number of results to return
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,

        /// Save the ranked list to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show lexical, vector and fused rankings side by side
    Compare {
        /// The search query
        query: String,

        /// Number of results per list
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,
    },

    /// Fuse two saved ranked lists with RRF
    Fuse {
        /// First ranked list (JSON)
        first: PathBuf,

        /// Second ranked list (JSON)
        second: PathBuf,

        /// Number of fused results to keep
        #[arg(short = 'k', long, default_value_t = 10)]
        top_k: usize,

        /// RRF smoothing constant
        #[arg(long, default_value_t = 60.0)]
        rrf_k: f64,

        /// Save the fused list to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that the RAG service is up
    Health {
        /// Keep polling until the service answers or retries run out
        #[arg(long)]
        wait: bool,
    },

    /// Test the judge LLM connection
    TestJudge,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    match cli.command {
        Commands::Query {
            query,
            target,
            top_k,
            output,
        } => cmd_query(query, target, top_k, output).await,
        Commands::Compare { query, top_k } => cmd_compare(query, top_k).await,
        Commands::Fuse {
            first,
            second,
            top_k,
            rrf_k,
            output,
        } => cmd_fuse(first, second, top_k, rrf_k, output),
        Commands::Health { wait } => cmd_health(wait).await,
        Commands::TestJudge => cmd_test_judge().await,
    }
}

fn load_client() -> Result<(Config, RetrievalClient)> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    let client =
        RetrievalClient::new(config.backend.clone()).context("Failed to create retrieval client")?;
    Ok((config, client))
}

fn print_ranked(list: &RankedList) {
    if list.is_empty() {
        println!("No results.");
        return;
    }

    for (i, doc) in list.documents.iter().enumerate() {
        println!(
            "{:>2}. {} (score {:.4}){}",
            i + 1,
            doc.id,
            doc.score,
            doc.title
                .as_deref()
                .map(|t| format!(" - {}", t))
                .unwrap_or_default()
        );
        if let Some(text) = &doc.text {
            let preview: String = text.chars().take(160).collect();
            println!("    {}", preview.replace('\n', " "));
            if text.chars().count() > 160 {
                println!("    ...");
            }
        }
    }
}

async fn cmd_query(query: String, target: Target, top_k: usize, output: Option<PathBuf>) -> Result<()> {
    let (_, client) = load_client()?;

    println!("Query:  \"{}\"", query);
    println!("Target: {}", target);
    println!();

    let start = Instant::now();
    let list = client
        .retrieve(target, &query, top_k)
        .await
        .context("Retrieval failed")?;
    let duration = start.elapsed();

    println!("{}", "─".repeat(60));
    print_ranked(&list);
    println!("{}", "─".repeat(60));
    println!("{} results in {:.2?}", list.len(), duration);

    if let Some(path) = output {
        save_ranked_list(&list, &path).context("Failed to save ranked list")?;
        println!("Saved to: {}", path.display());
    }

    Ok(())
}

async fn cmd_compare(query: String, top_k: usize) -> Result<()> {
    let (_, client) = load_client()?;
    let top_k = client.clamp_top_k(top_k);

    let (lexical, vector) = tokio::try_join!(
        client.search(Backend::Lexical, &query, top_k),
        client.search(Backend::Vector, &query, top_k)
    )
    .context("Retrieval failed")?;

    let fused = RrfFusion::default().fuse(&lexical.documents, &vector.documents, top_k);

    println!("Query: \"{}\"\n", query);
    println!("{:>4}  {:<24} {:<24} {:<24}", "rank", "lexical", "vector", "fused (lex/vec rank)");
    println!("{}", "─".repeat(80));
    for i in 0..top_k {
        let cell = |list: &RankedList| {
            list.documents
                .get(i)
                .map(|d| d.id.clone())
                .unwrap_or_default()
        };
        let fused_cell = fused.get(i).map(describe_fused).unwrap_or_default();
        println!(
            "{:>4}  {:<24} {:<24} {:<24}",
            i + 1,
            cell(&lexical),
            cell(&vector),
            fused_cell
        );
    }
    println!("{}", "─".repeat(80));

    let overlap = fused.iter().filter(|d| d.in_both()).count();
    println!("Documents in both lists: {}", overlap);

    Ok(())
}

fn describe_fused(doc: &FusedDocument) -> String {
    let rank = |r: Option<usize>| r.map(|r| (r + 1).to_string()).unwrap_or_else(|| "-".to_string());
    format!("{} ({}/{})", doc.id, rank(doc.rank_a), rank(doc.rank_b))
}

fn cmd_fuse(first: PathBuf, second: PathBuf, top_k: usize, rrf_k: f64, output: Option<PathBuf>) -> Result<()> {
    let list_a = load_ranked_list(&first)
        .with_context(|| format!("Failed to load '{}'", first.display()))?;
    let list_b = load_ranked_list(&second)
        .with_context(|| format!("Failed to load '{}'", second.display()))?;

    let fused = RrfFusion::new(rrf_k).fuse_lists(&list_a, &list_b, top_k);

    println!("Fused {} + {} documents (k = {})", list_a.len(), list_b.len(), rrf_k);
    println!("{}", "─".repeat(60));
    print_ranked(&fused);
    println!("{}", "─".repeat(60));

    if let Some(path) = output {
        save_ranked_list(&fused, &path).context("Failed to save fused list")?;
        println!("Saved to: {}", path.display());
    }

    Ok(())
}

async fn cmd_health(wait: bool) -> Result<()> {
    let (config, client) = load_client()?;
    println!("Checking {} ...", config.backend.api_base);

    if wait {
        let policy = RetryPolicy::from_settings(&config.eval);
        let attempts = client
            .wait_ready(&policy)
            .await
            .context("Service did not become ready")?;
        println!("Service ready after {} attempt(s).", attempts);
    } else {
        client.health().await.context("Health check failed")?;
        println!("Service is up.");
    }

    Ok(())
}

async fn cmd_test_judge() -> Result<()> {
    println!("Testing judge LLM connection...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    println!(
        "  API Key:   {}...",
        config.llm.api_key.chars().take(8).collect::<String>()
    );
    println!();

    config.validate_judge().context("Invalid judge configuration")?;

    let client = LlmClient::new(config.llm).context("Failed to create LLM client")?;

    println!("Sending test request...");
    client
        .test_connection()
        .await
        .context("Connection failed")?;
    println!("Connection successful!");

    Ok(())
}
