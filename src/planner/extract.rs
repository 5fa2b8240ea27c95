//! JSON recovery from free-form model text.
//!
//! Each strategy is a pure function returning the first JSON object it can
//! parse. [`extract_json_object`] runs them in order and stops at the first
//! hit.
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// One extraction strategy.
pub type Strategy = fn(&str) -> Option<Value>;

/// Strategies in the order they are tried.
pub const STRATEGIES: [(&str, Strategy); 3] = [
    ("whole_object", parse_whole_object),
    ("fenced_block", parse_fenced_block),
    ("brace_span", parse_first_brace_span),
];

fn fenced_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("static regex"))
}

fn brace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex"))
}

fn as_object(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// The trimmed text is itself a single `{...}` object.
pub fn parse_whole_object(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        as_object(trimmed)
    } else {
        None
    }
}

/// First fenced code block (```json or bare ```) whose body is an object.
pub fn parse_fenced_block(raw: &str) -> Option<Value> {
    fenced_re()
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .find_map(|body| as_object(body.as_str()))
}

/// Span from the first `{` to the last `}`.
pub fn parse_first_brace_span(raw: &str) -> Option<Value> {
    brace_re().find(raw).and_then(|m| as_object(m.as_str()))
}

pub fn extract_json_object(raw: &str) -> Option<Value> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let value = strategy(raw)?;
        tracing::trace!(strategy = name, "json extracted from model output");
        Some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whole_object_only_matches_bare_json() {
        assert_eq!(parse_whole_object("  {\"a\": 1}\n"), Some(json!({"a": 1})));
        assert_eq!(parse_whole_object("here: {\"a\": 1}"), None);
        assert_eq!(parse_whole_object("[1, 2]"), None);
    }

    #[test]
    fn fenced_block_skips_non_object_blocks() {
        let raw = "```\nnot json\n```\nthen\n```json\n{\"b\": true}\n```";
        assert_eq!(parse_fenced_block(raw), Some(json!({"b": true})));
    }

    #[test]
    fn brace_span_recovers_embedded_object() {
        let raw = "Plan follows {\"sequence_name\": \"x\", \"actions\": []} hope it helps";
        assert_eq!(
            parse_first_brace_span(raw),
            Some(json!({"sequence_name": "x", "actions": []}))
        );
    }

    #[test]
    fn first_successful_strategy_wins() {
        // The fenced block parses, so the surrounding brace span is never used.
        let raw = "{ broken\n```json\n{\"from\": \"fence\"}\n```\n}";
        assert_eq!(extract_json_object(raw), Some(json!({"from": "fence"})));
    }

    #[test]
    fn garbage_yields_none() {
        assert_eq!(extract_json_object("I would click the button."), None);
        assert_eq!(extract_json_object(""), None);
    }
}
