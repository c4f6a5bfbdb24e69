//! LLM integration module.
//!
//! Provides an OpenAI-compatible client for the generative-text judge and
//! the prompts used to request structured quality scores.

mod client;
mod prompts;

pub use client::LlmClient;
pub use prompts::Prompts;
