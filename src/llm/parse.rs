//! Tolerant JSON object recovery from free-form model output.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

type JsonObject = Map<String, Value>;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)\s*```").unwrap());

/// Candidate extractors, tried in order.
const CANDIDATES: &[fn(&str) -> Vec<&str>] = &[whole, fenced, balanced_spans, outer_braces];

/// Pull the first JSON object out of `text`.
///
/// Tries, in order: the whole string, fenced code blocks, each balanced
/// top-level `{...}` span, and finally first `{` to last `}`. Anything that is
/// not a JSON object counts as a miss. Never fails; returns `None` instead.
pub fn parse_json_object(text: &str) -> Option<JsonObject> {
    CANDIDATES
        .iter()
        .flat_map(|candidate| candidate(text))
        .find_map(as_object)
}

fn as_object(candidate: &str) -> Option<JsonObject> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn whole(text: &str) -> Vec<&str> {
    vec![text]
}

fn fenced(text: &str) -> Vec<&str> {
    FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Every top-level `{...}` span, ignoring braces inside strings.
fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    spans
}

fn outer_braces(text: &str) -> Vec<&str> {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => vec![&text[start..=end]],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parsed(text: &str) -> Option<Value> {
        parse_json_object(text).map(Value::Object)
    }

    #[test]
    fn test_plain_object() {
        assert_eq!(parsed(r#"{"a":1}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn test_fenced_block() {
        assert_eq!(parsed("```json\n{\"a\":1}\n```"), Some(json!({"a": 1})));
        assert_eq!(
            parsed("Here you go:\n```\n{\"a\": [1, 2]}\n```\nDone."),
            Some(json!({"a": [1, 2]}))
        );
    }

    #[test]
    fn test_embedded_object() {
        assert_eq!(
            parsed(r#"Sure! {"category": "robotics", "note": "uses {braces}"} Hope that helps {"#),
            Some(json!({"category": "robotics", "note": "uses {braces}"}))
        );
    }

    #[test]
    fn test_think_block_before_answer() {
        let text = "<think>\nthe user wants {json}\n</think>\n{\"keywords\": [\"moe\"]}";
        assert_eq!(parsed(text), Some(json!({"keywords": ["moe"]})));
    }

    #[test]
    fn test_garbage_and_non_objects() {
        assert_eq!(parsed("garbage text"), None);
        assert_eq!(parsed(""), None);
        assert_eq!(parsed("[1, 2, 3]"), None);
        assert_eq!(parsed("{not json}"), None);
        assert_eq!(parsed("} backwards {"), None);
    }
}
