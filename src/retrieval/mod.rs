//! Retrieval integration module.
//!
//! Provides the HTTP client for the RAG service's lexical, vector and fused
//! endpoints, the [`Target`] selector used by the evaluators, and the
//! bounded retry policy used for readiness probes.

mod client;
mod retry;

pub use client::{RetrievalClient, parse_search_body};
pub use retry::{Backoff, RetryPolicy};

use crate::document::RankedList;
use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;

/// One of the two independent retrieval engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Lexical,
    Vector,
}

impl Backend {
    /// Name used by the RAG service's `/ask` endpoint.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Backend::Lexical => "solr",
            Backend::Vector => "milvus",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Lexical => write!(f, "lexical"),
            Backend::Vector => write!(f, "vector"),
        }
    }
}

/// Backend selection for the fused `/ask` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AskMode {
    Lexical,
    Vector,
    Both,
}

impl AskMode {
    /// Name used on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            AskMode::Lexical => Backend::Lexical.wire_name(),
            AskMode::Vector => Backend::Vector.wire_name(),
            AskMode::Both => "both",
        }
    }
}

/// Where an evaluator sends its queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// A single backend endpoint.
    Backend(Backend),
    /// The service's `/ask` endpoint.
    Ask(AskMode),
    /// Both backends queried by this client and fused locally with RRF.
    Hybrid,
}

impl Target {
    pub const LEXICAL: Target = Target::Backend(Backend::Lexical);
    pub const VECTOR: Target = Target::Backend(Backend::Vector);
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Backend(b) => write!(f, "{}", b),
            Target::Ask(AskMode::Lexical) => write!(f, "ask-lexical"),
            Target::Ask(AskMode::Vector) => write!(f, "ask-vector"),
            Target::Ask(AskMode::Both) => write!(f, "ask-both"),
            Target::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for Target {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(':', "-");
        match normalized.as_str() {
            "lexical" | "solr" => Ok(Target::LEXICAL),
            "vector" | "milvus" => Ok(Target::VECTOR),
            "ask" | "ask-both" => Ok(Target::Ask(AskMode::Both)),
            "ask-lexical" | "ask-solr" => Ok(Target::Ask(AskMode::Lexical)),
            "ask-vector" | "ask-milvus" => Ok(Target::Ask(AskMode::Vector)),
            "hybrid" | "rrf" => Ok(Target::Hybrid),
            other => Err(EvalError::Configuration(format!(
                "Unknown retrieval target '{}'. Use lexical, vector, ask[-lexical|-vector|-both] or hybrid.",
                other
            ))),
        }
    }
}

/// Anything that can answer a query with a ranked list.
///
/// Implemented by [`RetrievalClient`]; evaluators are generic over it so they
/// can run against in-memory fixtures.
pub trait Retriever {
    /// Retrieve at most `top_k` documents for `query` from `target`.
    fn retrieve(
        &self,
        target: Target,
        query: &str,
        top_k: usize,
    ) -> impl Future<Output = Result<RankedList>> + Send;
}
