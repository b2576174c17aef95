//! Turns loosely formatted generator output into structured JSON.
//!
//! Parsing failure is never an error: the text is handed back unchanged and
//! callers decide what an unstructured result means for them.

use serde_json::Value;
use sidequest_schema::RawResult;

/// Strip one surrounding Markdown code fence (```` ``` ```` or ```` ```json ````).
/// Text without a fence is returned trimmed, so the operation is idempotent.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json", "JSON", ...) up to the first newline
    let body = match rest.find('\n') {
        Some(idx) if !rest[..idx].trim_start().starts_with(['{', '[']) => &rest[idx + 1..],
        _ => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parse `text` as a JSON object or array, tolerating code fences and prose
/// around a single embedded object.
pub fn parse_json_lenient(text: &str) -> Option<Value> {
    let stripped = strip_code_fences(text);
    if let Some(value) = parse_container(stripped) {
        return Some(value);
    }

    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_container(&stripped[start..=end])
}

pub fn normalize(raw: RawResult) -> RawResult {
    match raw {
        RawResult::Text(text) => match parse_json_lenient(&text) {
            Some(value) => RawResult::Structured(value),
            None => {
                tracing::debug!(len = text.len(), "generator output is not JSON; passing text through");
                RawResult::Text(text)
            }
        },
        structured => structured,
    }
}

fn parse_container(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}
