//! Configuration for the evaluation harness.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Retrieval service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the RAG API (e.g., "http://localhost:8000")
    pub api_base: String,

    /// Path of the lexical search endpoint
    pub lexical_path: String,

    /// Path of the vector search endpoint
    pub vector_path: String,

    /// Path of the fused "ask" endpoint
    pub ask_path: String,

    /// Per-call deadline in seconds
    pub timeout_secs: u64,

    /// Upper bound applied to every requested top_k
    pub topk_max: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".to_string(),
            lexical_path: "query_solr".to_string(),
            vector_path: "query_milvus".to_string(),
            ask_path: "ask".to_string(),
            timeout_secs: 30,
            topk_max: 20,
        }
    }
}

impl BackendConfig {
    /// Per-call deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Evaluation run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalSettings {
    /// top_k used against each backend when building the gold set
    pub gold_top_k: usize,

    /// K for recall@K and nDCG@K
    pub eval_k: usize,

    /// Documents handed to the LLM judge
    pub judge_top_k: usize,

    /// Documents concatenated for ROUGE-L
    pub rouge_top_k: usize,

    /// Queries evaluated at once (output order is unaffected)
    pub concurrency: usize,

    /// Readiness probe attempts before giving up
    pub ready_retries: u32,

    /// Delay between readiness probe attempts in milliseconds
    pub ready_sleep_ms: u64,

    /// Snowball stemmer language for ROUGE-L tokenization
    pub stem_language: String,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            gold_top_k: 10,
            eval_k: 5,
            judge_top_k: 3,
            rouge_top_k: 3,
            concurrency: 1,
            ready_retries: 20,
            ready_sleep_ms: 1500,
            stem_language: "english".to_string(),
        }
    }
}

/// Input and output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Seed queries, one per line
    pub seed_queries: PathBuf,

    /// Weak gold set (JSON lines)
    pub gold: PathBuf,

    /// Corpus JSONL file or directory of JSONL files
    pub corpus: PathBuf,

    /// Directory that receives metric reports
    pub reports_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            seed_queries: PathBuf::from("data/queries_seed.txt"),
            gold: PathBuf::from("data/gold_weak.jsonl"),
            corpus: PathBuf::from("data/corpus"),
            reports_dir: PathBuf::from("reports"),
        }
    }
}

/// LLM judge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o-mini", "gemini-2.5-flash-lite")
    pub model: String,

    /// Maximum tokens for response (optional)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation (optional)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-call deadline in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.0
}

fn default_llm_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gemini-2.5-flash-lite".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Retrieval service
    pub backend: BackendConfig,
    /// Evaluation settings
    pub eval: EvalSettings,
    /// Input/output files
    pub paths: PathsConfig,
    /// Judge settings
    pub llm: LlmConfig,
}

/// Set `target` from environment variable `key` when present and parseable.
fn env_override<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(value) = env::var(key) {
        if let Ok(parsed) = value.trim().parse() {
            *target = parsed;
        }
    }
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (RAG_API, EVAL_K, LLM_API_BASE, ...)
    /// 2. Config file (~/.config/rag-eval-harness/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Apply environment variable overrides on top of the current values.
    pub fn apply_env(&mut self) {
        let backend = &mut self.backend;
        env_override("RAG_API", &mut backend.api_base);
        env_override("RAG_LEXICAL_PATH", &mut backend.lexical_path);
        env_override("RAG_VECTOR_PATH", &mut backend.vector_path);
        env_override("RAG_ASK_PATH", &mut backend.ask_path);
        env_override("RAG_TIMEOUT_SECS", &mut backend.timeout_secs);
        env_override("TOPK_MAX", &mut backend.topk_max);

        let eval = &mut self.eval;
        env_override("GOLD_TOPK", &mut eval.gold_top_k);
        env_override("EVAL_K", &mut eval.eval_k);
        env_override("JUDGE_TOPK", &mut eval.judge_top_k);
        env_override("ROUGE_TOPK", &mut eval.rouge_top_k);
        env_override("EVAL_CONCURRENCY", &mut eval.concurrency);
        env_override("READY_RETRIES", &mut eval.ready_retries);
        env_override("READY_SLEEP_MS", &mut eval.ready_sleep_ms);
        env_override("STEM_LANGUAGE", &mut eval.stem_language);

        let paths = &mut self.paths;
        env_override("SEED_PATH", &mut paths.seed_queries);
        env_override("GOLD_PATH", &mut paths.gold);
        env_override("CORPUS_PATH", &mut paths.corpus);
        env_override("REPORTS_DIR", &mut paths.reports_dir);

        let llm = &mut self.llm;
        env_override("LLM_API_BASE", &mut llm.api_base);
        env_override("LLM_API_KEY", &mut llm.api_key);
        env_override("LLM_MODEL", &mut llm.model);
        env_override("LLM_MAX_TOKENS", &mut llm.max_tokens);
        env_override("LLM_TEMPERATURE", &mut llm.temperature);
        env_override("LLM_TIMEOUT_SECS", &mut llm.timeout_secs);
    }

    /// Load configuration from a specific file path.
    ///
    /// Sections and fields missing from the file keep their defaults.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;

        serde_yaml::from_str(&content).map_err(|e| {
            EvalError::Configuration(format!("Failed to parse config file: {}", e))
        })
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-eval-harness")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate retrieval and evaluation settings.
    pub fn validate(&self) -> Result<()> {
        if self.backend.api_base.is_empty() {
            return Err(EvalError::Configuration(
                "RAG API base URL is required. Set RAG_API environment variable or add to config file.".to_string(),
            ));
        }

        if self.backend.topk_max == 0 {
            return Err(EvalError::Configuration(
                "TOPK_MAX must be at least 1.".to_string(),
            ));
        }

        if self.backend.timeout_secs == 0 {
            return Err(EvalError::Configuration(
                "RAG_TIMEOUT_SECS must be at least 1.".to_string(),
            ));
        }

        if self.eval.gold_top_k == 0 || self.eval.eval_k == 0 {
            return Err(EvalError::Configuration(
                "GOLD_TOPK and EVAL_K must be at least 1.".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate that judge configuration is present.
    pub fn validate_judge(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(EvalError::Configuration(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(EvalError::Configuration(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(EvalError::Configuration(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        Ok(())
    }
}
