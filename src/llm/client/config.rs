//! LLM client configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the Ollama client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether LLM annotation is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Ollama API endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model for classification, keywords and labels
    #[serde(default = "default_model_small")]
    pub model_small: String,
    /// Model for paragraph comments
    #[serde(default = "default_model_large")]
    pub model_large: String,
    /// Deadline for one generate call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum tokens in response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model_small() -> String {
    "qwen3:0.6b".to_string()
}

fn default_model_large() -> String {
    "qwen3:4b".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    10000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl LlmConfig {
    /// Base default without env overrides.
    pub fn base_default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            model_small: default_model_small(),
            model_large: default_model_large(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }

    /// Check if the config equals the default (for skip_serializing_if).
    pub fn is_default(&self) -> bool {
        *self == Self::base_default()
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `LLM_ENABLED`: "true"/"1" or anything else for false
    /// - `LLM_ENDPOINT` (or `OLLAMA_HOST`): API endpoint
    /// - `LLM_MODEL_SMALL`, `LLM_MODEL_LARGE`: model names
    /// - `LLM_TIMEOUT`: per-call deadline in seconds
    /// - `LLM_MAX_TOKENS`: maximum tokens in response
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("LLM_ENABLED") {
            self.enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }
        if let Ok(val) = std::env::var("LLM_ENDPOINT").or_else(|_| std::env::var("OLLAMA_HOST")) {
            if !val.is_empty() {
                self.endpoint = val;
            }
        }
        if let Ok(val) = std::env::var("LLM_MODEL_SMALL") {
            if !val.is_empty() {
                self.model_small = val;
            }
        }
        if let Ok(val) = std::env::var("LLM_MODEL_LARGE") {
            if !val.is_empty() {
                self.model_large = val;
            }
        }
        if let Some(secs) = std::env::var("LLM_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.timeout_secs = secs;
        }
        if let Some(tokens) = std::env::var("LLM_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.max_tokens = tokens;
        }
        self
    }

    /// Endpoint without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}
