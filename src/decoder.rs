//! JSON extraction from free-form model output.
//!
//! Models wrap JSON in markdown fences or surround it with prose despite
//! instructions. The decoder locates the payload, parses it, and reports a
//! typed [`DocsightError::InvalidResponse`] when nothing parseable is found.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::clients::traits::CallResult;
use crate::error::{DocsightError, Result};

/// Characters of the original content attached to a decode error
const SNIPPET_CHARS: usize = 200;

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").unwrap());

/// Decode a completion into `T`.
pub fn parse_json<T: DeserializeOwned>(result: &CallResult) -> Result<T> {
    parse_json_str(&result.content)
}

pub fn parse_json_str<T: DeserializeOwned>(content: &str) -> Result<T> {
    let value = extract_value(content).map_err(|message| invalid(message, content))?;
    serde_json::from_value(value).map_err(|e| invalid(e.to_string(), content))
}

fn extract_value(content: &str) -> std::result::Result<Value, String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err("empty response".to_string());
    }

    if let Some(inner) = fenced_interior(trimmed) {
        let inner = inner.trim();
        if let Ok(v) = serde_json::from_str(inner) {
            return Ok(v);
        }
        if let Some(slice) = bracket_slice(inner)
            && let Ok(v) = serde_json::from_str(slice)
        {
            return Ok(v);
        }
    }

    let candidate = bracket_slice(trimmed).unwrap_or(trimmed);
    serde_json::from_str(candidate).map_err(|e| e.to_string())
}

fn fenced_interior(text: &str) -> Option<&str> {
    FENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Slice from the first `{` or `[` (whichever comes first) to the last
/// matching closer.
pub fn bracket_slice(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

fn invalid(message: String, content: &str) -> DocsightError {
    let mut snippet: String = content.chars().take(SNIPPET_CHARS).collect();
    if content.chars().count() > SNIPPET_CHARS {
        snippet.push_str("...");
    }
    DocsightError::InvalidResponse { message, snippet }
}
