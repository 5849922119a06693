//! papertrail - extraction and LLM annotation of arXiv papers.
//!
//! Parses ar5iv HTML renderings into structured documents, then classifies,
//! tags and comments on them with a local Ollama model. Results are cached
//! as JSON per paper and annotation kind.

pub mod annotate;
pub mod cache;
pub mod cli;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
