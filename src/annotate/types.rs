//! Failure type and field coercion for model output.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm::LlmError;

/// Why one annotation produced no result. Logged and counted, never raised.
#[derive(Debug, Error)]
pub enum AnnotationFailure {
    #[error("generate failed: {0}")]
    Generate(#[from] LlmError),
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("no JSON object in response: {excerpt}")]
    Parse { excerpt: String },
    #[error("no text to annotate")]
    NoInput,
}

/// Confidence used when the model gives none.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Confidence in `[0, 1]`; numeric strings are accepted.
pub fn confidence(obj: &Map<String, Value>) -> f64 {
    let raw = match obj.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

/// Trimmed, non-empty strings from an array or a comma-separated string,
/// capped at `cap` entries.
pub fn string_list(obj: &Map<String, Value>, key: &str, cap: usize) -> Vec<String> {
    let items: Vec<String> = match obj.get(key) {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(|p| p.trim().to_string()).collect(),
        _ => Vec::new(),
    };
    items.into_iter().filter(|s| !s.is_empty()).take(cap).collect()
}

/// Trimmed string field; empty when absent or not a string.
pub fn string_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

pub fn optional_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    Some(string_field(obj, key)).filter(|s| !s.is_empty())
}

/// Normalise a model-supplied category id (`"Computer Vision"` -> `computer_vision`).
pub fn category_id(obj: &Map<String, Value>) -> String {
    string_field(obj, "category")
        .to_lowercase()
        .replace([' ', '-'], "_")
}
