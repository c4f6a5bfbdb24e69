//! RAG Eval Harness - rank fusion and retrieval-quality evaluation for a
//! lexical + vector RAG service.
//!
//! # Overview
//!
//! The service behind this harness answers every query with two independent
//! ranked lists, one from a lexical engine and one from a vector engine. This
//! crate:
//! 1. Queries each backend (or the service's fused endpoint) over HTTP
//! 2. Fuses two ranked lists with Reciprocal Rank Fusion
//! 3. Builds a weak gold set from the agreement between both backends
//! 4. Scores retrieval against the gold set with recall@k, MRR, nDCG@k,
//!    ROUGE-L and an LLM judge
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_eval_harness::{
//!     config::Config,
//!     eval::MetricEvaluator,
//!     persistence::{load_gold, save_report},
//!     retrieval::{RetrievalClient, Target},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     // One client for the whole run
//!     let client = RetrievalClient::new(config.backend.clone())?;
//!
//!     // Score the locally fused ranking against the gold set
//!     let gold = load_gold(&config.paths.gold)?;
//!     let report = MetricEvaluator::new(&client, Target::Hybrid, config.eval.eval_k)
//!         .run(&gold)
//!         .await;
//!
//!     report.print_summary();
//!     save_report(&report, &config.paths.reports_dir.join("metrics_hybrid.csv"))?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **RetrievalClient**: HTTP client for the lexical, vector and fused endpoints
//! - **RrfFusion**: Reciprocal Rank Fusion of two ranked lists
//! - **GoldSetBuilder**: Weak relevance labels from backend agreement
//! - **MetricEvaluator / RougeEvaluator / JudgeEvaluator**: Per-query scoring
//! - **EvalReport**: Per-query records, skipped queries and means

pub mod config;
pub mod document;
pub mod error;
pub mod eval;
pub mod fusion;
pub mod gold;
pub mod llm;
pub mod logging;
pub mod persistence;
pub mod retrieval;

// Re-export commonly used types
pub use config::Config;
pub use document::{Corpus, DocumentRef, RankedList};
pub use error::{EvalError, Result};
pub use fusion::{FusedDocument, RrfFusion, fuse};
pub use gold::{GoldRecord, GoldSetBuilder};
pub use llm::LlmClient;
pub use retrieval::{Retriever, RetrievalClient, Target};
