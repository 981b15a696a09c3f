//! Lenient parsing of model replies into per-chunk scores.

use serde_json::Value;
use tracing::warn;

use crate::error::{ScorerError, ScorerResult};

/// Score given to chunks the model did not rate.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(open) = text.find("```") else {
        return text;
    };
    let after_open = &text[open + 3..];
    let body_start = after_open
        .strip_prefix("json")
        .or_else(|| after_open.strip_prefix("JSON"))
        .unwrap_or(after_open);
    match body_start.find("```") {
        Some(close) => body_start[..close].trim(),
        None => text,
    }
}

/// Parse scores for `len` chunks whose global indices start at `start_index`.
///
/// The reply may be a bare array or an object wrapping one (`{"scores": [...]}`).
/// Each entry carries `index` and `score`; scores are clamped to `[0, 1]` and
/// chunks without an entry get [`NEUTRAL_SCORE`].
pub fn parse_scores(text: &str, start_index: usize, len: usize) -> ScorerResult<Vec<f64>> {
    let body = strip_code_fence(text);
    let parsed: Value = serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        ScorerError::parse(format!("{} in {:?}", e, preview))
    })?;

    let entries = match &parsed {
        Value::Array(items) => items,
        Value::Object(map) => map
            .values()
            .find_map(|v| v.as_array())
            .ok_or_else(|| ScorerError::parse("reply does not contain a scores array"))?,
        _ => return Err(ScorerError::parse("reply is neither an array nor an object")),
    };

    let mut scores = vec![NEUTRAL_SCORE; len];
    for entry in entries {
        let Some(index) = entry.get("index").and_then(as_index) else {
            continue;
        };
        let Some(slot) = index
            .checked_sub(start_index)
            .and_then(|local| scores.get_mut(local))
        else {
            continue;
        };
        match entry.get("score").and_then(as_number) {
            Some(score) if score.is_finite() => *slot = score.clamp(0.0, 1.0),
            _ => warn!("Ignoring unusable score for segment {}", index),
        }
    }
    Ok(scores)
}

fn as_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
