//! HTTP client for the RAG service's search endpoints.
//!
//! The service exposes one endpoint per backend plus a fused `/ask`
//! endpoint. All of them accept `{"query", "top_k"}` and answer with
//! `{"results": [{"id", "score", "section_title", "text_raw"}, ...]}`.

use super::{AskMode, Backend, Retriever, RetryPolicy, Target};
use crate::config::BackendConfig;
use crate::document::{DocumentRef, MultiText, RankedList, flatten_text};
use crate::error::{EvalError, Result};
use crate::fusion::RrfFusion;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Request body for the per-backend endpoints.
#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    top_k: usize,
}

/// Request body for the fused endpoint.
#[derive(Debug, Serialize)]
struct AskRequest<'a> {
    query: &'a str,
    top_k: usize,
    backend: &'static str,
}

/// Response from any search endpoint.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(default)]
    id: Option<MultiText>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    rrf_score: Option<f64>,
    #[serde(default)]
    section_title: Option<MultiText>,
    #[serde(default)]
    text_raw: Option<MultiText>,
}

impl RawHit {
    fn into_document(self) -> Option<DocumentRef> {
        let id = flatten_text(self.id)?;
        Some(DocumentRef {
            id,
            score: self.rrf_score.or(self.score).unwrap_or(0.0),
            title: flatten_text(self.section_title),
            text: flatten_text(self.text_raw),
        })
    }
}

/// Parse a search endpoint body into a ranked list, keeping the service's order.
///
/// Hits without an id are dropped.
pub fn parse_search_body(query: &str, body: &str) -> Result<RankedList> {
    let response: SearchResponse = serde_json::from_str(body)?;
    let total = response.results.len();
    let documents: Vec<DocumentRef> = response
        .results
        .into_iter()
        .filter_map(RawHit::into_document)
        .collect();

    if documents.len() < total {
        debug!(
            dropped = total - documents.len(),
            "search hits without an id were ignored"
        );
    }

    Ok(RankedList::new(query, documents))
}

/// Client for the RAG service.
///
/// Owns one connection pool; clone it to share between tasks.
#[derive(Clone)]
pub struct RetrievalClient {
    client: Client,
    config: BackendConfig,
    fusion: RrfFusion,
}

impl RetrievalClient {
    /// Create a new client with the given configuration.
    pub fn new(config: BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EvalError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            fusion: RrfFusion::default(),
        })
    }

    /// Use a different fusion engine for the hybrid target.
    pub fn with_fusion(mut self, fusion: RrfFusion) -> Self {
        self.fusion = fusion;
        self
    }

    /// The backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Build the URL of an endpoint path. Absolute URLs are used as-is.
    fn endpoint(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/{}", base, path.trim_start_matches('/'))
    }

    /// Clamp a requested top_k to `[1, topk_max]`.
    pub fn clamp_top_k(&self, top_k: usize) -> usize {
        top_k.clamp(1, self.config.topk_max.max(1))
    }

    fn prepare_query(query: &str) -> Result<&str> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EvalError::InvalidQuery("query is empty".to_string()));
        }
        Ok(query)
    }

    /// Query one backend.
    pub async fn search(&self, backend: Backend, query: &str, top_k: usize) -> Result<RankedList> {
        let query = Self::prepare_query(query)?;
        let top_k = self.clamp_top_k(top_k);
        let path = match backend {
            Backend::Lexical => &self.config.lexical_path,
            Backend::Vector => &self.config.vector_path,
        };

        let mut list = self.post(path, &QueryRequest { query, top_k }, query).await?;
        list.truncate(top_k);
        Ok(list)
    }

    /// Query the service's fused endpoint.
    pub async fn ask(&self, mode: AskMode, query: &str, top_k: usize) -> Result<RankedList> {
        let query = Self::prepare_query(query)?;
        let top_k = self.clamp_top_k(top_k);
        let request = AskRequest {
            query,
            top_k,
            backend: mode.wire_name(),
        };

        let mut list = self.post(&self.config.ask_path, &request, query).await?;
        list.truncate(top_k);
        Ok(list)
    }

    /// Query both backends and fuse the lists locally.
    pub async fn hybrid(&self, query: &str, top_k: usize) -> Result<RankedList> {
        let top_k = self.clamp_top_k(top_k);
        let (lexical, vector) = futures::try_join!(
            self.search(Backend::Lexical, query, top_k),
            self.search(Backend::Vector, query, top_k)
        )?;
        Ok(self.fusion.fuse_lists(&lexical, &vector, top_k))
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B, query: &str) -> Result<RankedList> {
        let url = self.endpoint(path);
        let timeout = self.config.timeout();
        debug!(url = %url, "search request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| EvalError::transport(&url, timeout, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EvalError::transport(&url, timeout, e))?;

        if !status.is_success() {
            return Err(EvalError::BackendUnavailable {
                endpoint: url,
                reason: format!("status {}: {}", status, snippet(&text, 200)),
            });
        }

        parse_search_body(query, &text).map_err(|e| {
            EvalError::Serialization(format!("Unexpected response from '{}': {}", url, e))
        })
    }

    /// Check the service's health endpoint once.
    pub async fn health(&self) -> Result<()> {
        let url = self.endpoint("health");
        let timeout = self.config.timeout();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EvalError::transport(&url, timeout, e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(EvalError::BackendUnavailable {
                endpoint: url,
                reason: format!("status {}", response.status()),
            })
        }
    }

    /// Poll the health endpoint until it answers or the policy gives up.
    ///
    /// Returns the number of attempts used.
    pub async fn wait_ready(&self, policy: &RetryPolicy) -> Result<u32> {
        let label = self.endpoint("health");
        let ((), attempts) = policy.run(&label, || self.health()).await?;
        Ok(attempts)
    }
}

impl Retriever for RetrievalClient {
    async fn retrieve(&self, target: Target, query: &str, top_k: usize) -> Result<RankedList> {
        match target {
            Target::Backend(backend) => self.search(backend, query, top_k).await,
            Target::Ask(mode) => self.ask(mode, query, top_k).await,
            Target::Hybrid => self.hybrid(query, top_k).await,
        }
    }
}

/// First `max_chars` characters of `text`.
fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
