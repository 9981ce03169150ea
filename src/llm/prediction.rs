//! Extracts the reasoning block and the action payload from raw model text.
//!
//! The model answers with
//!
//! ```text
//! <thinking>...</thinking>
//! <tool_call>{"name": "mobile_use", "arguments": {"action": "click", ...}}</tool_call>
//! ```
//!
//! Parsing is purely syntactic: the payload is returned as JSON and checked
//! against the action schema by the caller.
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

const SNIPPET_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionParseError {
    #[error("no <tool_call> block in model output")]
    NoActionFound,

    #[error("malformed action block ({reason}): {snippet}")]
    MalformedAction { snippet: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub reasoning: Option<String>,
    /// The action object, with any `{"name", "arguments"}` envelope removed.
    pub payload: Value,
}

fn thinking_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<think(?:ing)?>(.*?)</think(?:ing)?>")
            .expect("thinking regex must compile")
    })
}

fn tool_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<tool_call>(.*?)(?:</tool_call>|$)")
            .expect("tool_call regex must compile")
    })
}

pub fn parse_prediction(raw: &str) -> Result<Prediction, PredictionParseError> {
    let block = tool_call_re()
        .captures(raw)
        .and_then(|c| c.get(0).zip(c.get(1)))
        .ok_or(PredictionParseError::NoActionFound)?;
    let (whole, inner) = block;

    let reasoning = thinking_re()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .or_else(|| {
            // Untagged text ahead of the action block is the model's reasoning.
            let lead = raw[..whole.start()].trim();
            (!lead.is_empty()).then(|| lead.to_string())
        })
        .filter(|s| !s.is_empty());

    let body = strip_code_fence(inner.as_str().trim());
    if body.is_empty() {
        return Err(malformed(body, "empty block"));
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| malformed(body, &e.to_string()))?;
    let payload = unwrap_envelope(value).map_err(|reason| malformed(body, &reason))?;

    Ok(Prediction {
        reasoning,
        payload,
    })
}

/// `{"name": "mobile_use", "arguments": {...}}` -> the arguments object.
/// `arguments` may itself be a JSON-encoded string.
fn unwrap_envelope(value: Value) -> Result<Value, String> {
    let Value::Object(mut obj) = value else {
        return Ok(value);
    };
    if obj.contains_key("action") || !obj.contains_key("arguments") {
        return Ok(Value::Object(obj));
    }
    match obj.remove("arguments") {
        Some(Value::String(s)) => {
            serde_json::from_str(&s).map_err(|e| format!("arguments string is not JSON: {e}"))
        }
        Some(args) => Ok(args),
        None => Ok(Value::Object(obj)),
    }
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn malformed(body: &str, reason: &str) -> PredictionParseError {
    let snippet = if body.chars().count() > SNIPPET_LIMIT {
        let cut: String = body.chars().take(SNIPPET_LIMIT).collect();
        format!("{cut}...")
    } else {
        body.to_string()
    };
    PredictionParseError::MalformedAction {
        snippet,
        reason: reason.to_string(),
    }
}
