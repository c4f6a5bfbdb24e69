//! Error types for the evaluation harness.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur while retrieving, fusing or evaluating.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A retrieval or judge endpoint could not be reached or answered
    /// with a non-success status.
    #[error("Backend unavailable at '{endpoint}': {reason}")]
    BackendUnavailable { endpoint: String, reason: String },

    /// A retrieval or judge call exceeded its deadline.
    #[error("Backend at '{endpoint}' timed out after {timeout:?}")]
    BackendTimeout { endpoint: String, timeout: Duration },

    /// The judge reply could not be read as structured scores.
    #[error("Malformed judge response: {0}")]
    MalformedJudgeResponse(String),

    /// A relevant document id has no entry in the corpus lookup table.
    #[error("Document '{0}' not found in corpus")]
    MissingCorpusEntry(String),

    /// Required configuration or input file is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The query is empty after trimming.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),
}

impl EvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify a transport error from `reqwest` as a timeout or an
    /// unavailable backend.
    pub fn transport(endpoint: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::BackendTimeout {
                endpoint: endpoint.to_string(),
                timeout,
            }
        } else {
            Self::BackendUnavailable {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Short label used when reporting skipped queries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Serialization(_) => "serialization",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::BackendTimeout { .. } => "backend_timeout",
            Self::MalformedJudgeResponse(_) => "malformed_judge_response",
            Self::MissingCorpusEntry(_) => "missing_corpus_entry",
            Self::Configuration(_) => "configuration",
            Self::InvalidQuery(_) => "invalid_query",
            Self::LlmApi(_) => "llm_api",
        }
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        let err = EvalError::BackendUnavailable {
            endpoint: "http://localhost:8000/query_solr".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(err.kind(), "backend_unavailable");

        let fatal = EvalError::Configuration("gold set missing".to_string());
        assert_eq!(fatal.kind(), "configuration");
    }

    #[test]
    fn test_timeout_message() {
        let err = EvalError::BackendTimeout {
            endpoint: "http://x/ask".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("timed out after 30s"));
    }
}
