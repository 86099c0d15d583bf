//! Pulling a JSON object out of a model reply.
//!
//! Even in JSON mode, replies sometimes arrive fenced in Markdown or with a
//! sentence of preamble.

use leadforge_shared::{LeadForgeError, Result};
use serde::de::DeserializeOwned;

/// The outermost JSON object or array in `reply`, with code fences removed.
pub fn extract_json_payload(reply: &str) -> Option<&str> {
    let trimmed = reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let start = trimmed.find(['{', '['])?;
    let close = if trimmed[start..].starts_with('{') { '}' } else { ']' };
    let end = trimmed.rfind(close)?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Deserialize the JSON payload of a model reply.
pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let payload = extract_json_payload(reply)
        .ok_or_else(|| LeadForgeError::parse("model reply contained no JSON object"))?;
    serde_json::from_str(payload).map_err(|e| LeadForgeError::parse(format!("model reply is not valid JSON: {e}")))
}
