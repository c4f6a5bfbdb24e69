//! Chat-completions client for the judge model.
//!
//! Talks to any OpenAI-compatible `/v1/chat/completions` endpoint. Only the
//! first choice's text is used; failures are reported with the same
//! `BackendUnavailable`/`BackendTimeout` split as the retrieval client.

use crate::config::LlmConfig;
use crate::error::{EvalError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u32,
}

/// Error body returned by OpenAI-compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Judge model client. Cheap to clone.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EvalError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Model name sent with every request.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.config.api_base.trim_end_matches('/'))
    }

    /// Send one user prompt, optionally preceded by a system prompt, and
    /// return the reply text. A reply with null content comes back empty.
    pub async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(content) = system {
            messages.push(ChatMessage { role: "system", content });
        }
        messages.push(ChatMessage { role: "user", content: user });

        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let url = self.endpoint();
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EvalError::transport(&url, timeout, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EvalError::transport(&url, timeout, e))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(EvalError::BackendUnavailable {
                endpoint: url,
                reason: format!("status {}: {}", status, detail),
            });
        }

        let reply: ChatReply = serde_json::from_str(&body).map_err(|e| {
            EvalError::MalformedJudgeResponse(format!("Unreadable reply from '{}': {}", url, e))
        })?;

        if let Some(usage) = &reply.usage {
            debug!(total_tokens = usage.total_tokens, "judge call");
        }

        let choice = reply.choices.into_iter().next().ok_or_else(|| {
            EvalError::MalformedJudgeResponse(format!("No choices in reply from '{}'", url))
        })?;
        Ok(choice.message.content.unwrap_or_default())
    }

    /// Check that the judge answers a trivial prompt.
    pub async fn test_connection(&self) -> Result<()> {
        let reply = self
            .complete(None, "Say 'hello' and nothing else.")
            .await?;

        if reply.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(EvalError::LlmApi(format!("Unexpected response: {}", reply)))
        }
    }
}
