//! LLM integration: the generation seam, the Ollama client and
//! response parsing.

mod client;
pub mod parse;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{LlmClient, LlmConfig};
pub use parse::parse_json_object;

/// One generate call.
#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: String,
    pub system: Option<&'a str>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Errors from a single generate call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("server returned HTTP {status}: {body}")]
    Server { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    Decode(String),
}

/// Anything that can turn a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run one generation; never retried by implementations.
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, LlmError>;

    /// Whether the backend is reachable. Swallows every error.
    async fn health(&self) -> bool;
}
