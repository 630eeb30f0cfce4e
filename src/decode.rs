use serde::de::Error as _;
use tracing::{debug, error};

use crate::out_models::{DigestResult, PARSE_FAILURE_SUMMARY};

/// How much of an undecodable reply is kept on the digest for inspection.
pub const RAW_RESPONSE_KEEP_CHARS: usize = 2000;
const RAW_RESPONSE_LOG_CHARS: usize = 500;

fn prefix_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Remove a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(text: &str) -> &str {
    let cleaned = text.trim();
    if !cleaned.starts_with("```") {
        return cleaned;
    }
    // drop the opening fence line, including any language tag
    let mut inner = match cleaned.split_once('\n') {
        Some((_, rest)) => rest,
        None => "",
    };
    if let Some(stripped) = inner.strip_suffix("```") {
        inner = stripped;
    }
    inner.trim()
}

fn parse_digest(text: &str) -> Result<DigestResult, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(serde_json::Error::custom(format!(
            "expected a JSON object, found {}",
            match value {
                serde_json::Value::Null => "null",
                serde_json::Value::Bool(_) => "a boolean",
                serde_json::Value::Number(_) => "a number",
                serde_json::Value::String(_) => "a string",
                serde_json::Value::Array(_) => "an array",
                serde_json::Value::Object(_) => "an object",
            }
        )));
    }
    serde_json::from_value(value)
}

/// Turn a model reply into a digest. Never fails: anything that is not a
/// digest-shaped JSON object comes back as a flagged failure digest.
pub fn decode_digest(raw: &str) -> DigestResult {
    let cleaned = strip_code_fence(raw);

    match parse_digest(cleaned) {
        Ok(digest) => {
            debug!(
                "Digest decoded - categories={}, sources={}, specter_items={}",
                digest.categories.len(),
                digest.per_source.len(),
                digest.specter_relevant.len()
            );
            digest
        }
        Err(e) => {
            error!("Failed to parse LLM JSON response: {}", e);
            debug!("Raw response: {}", prefix_chars(raw, RAW_RESPONSE_LOG_CHARS));
            DigestResult {
                executive_summary: PARSE_FAILURE_SUMMARY.to_string(),
                parse_error: Some(e.to_string()),
                raw_response: Some(prefix_chars(raw, RAW_RESPONSE_KEEP_CHARS).to_string()),
                ..Default::default()
            }
        }
    }
}
