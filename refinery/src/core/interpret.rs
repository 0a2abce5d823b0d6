//! Structured-value recovery from free-form oracle text.
//!
//! Interpretation runs three stages in order:
//!
//! 1. fenced code blocks tagged `json` (or untagged), first one that parses;
//! 2. the first balanced `{...}` or `[...]` span that parses;
//! 3. a sentinel object `{"raw_response": <raw text>}`.
//!
//! Only objects and arrays count as structured values. Nothing here panics or
//! returns an error; failure is always expressed as the sentinel.

use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use regex::Regex;
use serde_json::{Value, json};
use tracing::debug;

use crate::core::types::Decision;

const DECISION_SCHEMA: &str = include_str!("../../schemas/decision.schema.json");

/// Key carried by the stage-3 sentinel.
pub const RAW_RESPONSE_KEY: &str = "raw_response";

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[^\n]*\n(.*?)```").expect("fence regex should compile")
});

static DECISION_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(DECISION_SCHEMA).expect("decision schema should be valid json");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("decision schema should compile")
});

/// Which stage produced a structured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fenced,
    Embedded,
}

/// Run stages 1 and 2. `None` means the sentinel applies.
pub fn try_interpret(raw: &str) -> Option<(Value, Stage)> {
    if let Some(value) = from_fences(raw) {
        return Some((value, Stage::Fenced));
    }
    from_embedded(raw).map(|value| (value, Stage::Embedded))
}

/// Interpret `raw`, falling back to the sentinel object.
pub fn interpret(raw: &str) -> Value {
    match try_interpret(raw) {
        Some((value, stage)) => {
            debug!(?stage, "interpreted structured response");
            value
        }
        None => {
            debug!(len = raw.len(), "response held no structured value");
            json!({ RAW_RESPONSE_KEY: raw })
        }
    }
}

/// Whether `value` is the stage-3 sentinel.
pub fn is_sentinel(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.len() == 1 && map.get(RAW_RESPONSE_KEY).is_some_and(Value::is_string))
}

/// Interpret a decision reply, degrading to [`Decision::sentinel`] when the
/// reply holds no value of the decision shape.
pub fn interpret_decision(raw: &str) -> Decision {
    let Some((value, _)) = try_interpret(raw) else {
        debug!("decision reply unparseable");
        return Decision::sentinel();
    };
    if !DECISION_VALIDATOR.is_valid(&value) {
        debug!("decision reply failed schema");
        return Decision::sentinel();
    }
    match serde_json::from_value::<Decision>(value) {
        Ok(mut decision) => {
            decision.action = decision.action.trim().to_string();
            decision
        }
        Err(err) => {
            debug!(err = %err, "decision reply failed to deserialize");
            Decision::sentinel()
        }
    }
}

fn from_fences(raw: &str) -> Option<Value> {
    FENCE_RE
        .captures_iter(raw)
        .filter(|caps| {
            let tag = caps.get(1).map_or("", |m| m.as_str());
            tag.is_empty() || tag.eq_ignore_ascii_case("json")
        })
        .filter_map(|caps| caps.get(2))
        .find_map(|body| parse_structured(body.as_str().trim()))
}

fn from_embedded(raw: &str) -> Option<Value> {
    let mut spans = balanced_spans(raw.as_bytes());
    spans.sort_unstable_by_key(|&(start, _)| start);
    spans
        .into_iter()
        .find_map(|(start, end)| parse_structured(&raw[start..end]))
}

/// Every balanced `{...}` or `[...]` span as `(start, end)`, found in one pass.
///
/// Quotes open JSON strings only inside an open bracket, and brackets inside
/// strings are ignored. A mismatched closer abandons every open span.
fn balanced_spans(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut open: Vec<(usize, u8)> = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (index, &byte) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push((index, b'}')),
            b'[' => open.push((index, b']')),
            b'}' | b']' => match open.pop() {
                Some((start, closer)) if closer == byte => spans.push((start, index + 1)),
                Some(_) => open.clear(),
                None => {}
            },
            _ => {}
        }
    }
    spans
}

fn parse_structured(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}
