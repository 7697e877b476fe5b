//! Scenario structuring: hand the extracted text to the generation service
//! and parse the response into typed [`ScenarioRecord`]s.
//!
//! This module is intentionally thin on prompt engineering — all template
//! text lives in [`crate::prompts`] so it can be changed without touching
//! retry or validation logic here.
//!
//! ## Retry Strategy
//!
//! Only malformed *output* is retried: the model occasionally emits truncated
//! or fenced-and-mangled JSON, and a clean re-ask usually fixes it. The retry
//! budget is `max_attempts` total attempts with a fixed `retry_delay` between
//! them. Transport failures from the generation service itself are never
//! retried — they fail the document immediately.
//!
//! ## Trust boundary
//!
//! The service returns schema-less JSON. [`parse_scenarios`] is the explicit
//! parse-and-validate step that turns it into typed records or a precise
//! reason string; nothing downstream ever touches raw `serde_json::Value`s.

use crate::config::IngestConfig;
use crate::error::DocumentError;
use crate::generate::TextGenerator;
use crate::model::{ChildQuestion, ImageHint, ScenarioRecord};
use crate::prompts::{structuring_prompt, STRUCTURING_SYSTEM_PROMPT};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Structure one document's text into ordered scenario records.
///
/// `image_count` is forwarded to the prompt so the model knows how many
/// extracted images exist when declaring `imagePosition` ordinals.
pub async fn structure(
    generator: &Arc<dyn TextGenerator>,
    text: &str,
    image_count: usize,
    config: &IngestConfig,
) -> Result<Vec<ScenarioRecord>, DocumentError> {
    let user_prompt = structuring_prompt(text, image_count);
    let mut last_raw = String::new();

    for attempt in 1..=config.max_attempts {
        if attempt > 1 {
            warn!(
                "structuring retry {}/{} after {:?}",
                attempt, config.max_attempts, config.retry_delay
            );
            sleep(config.retry_delay).await;
        }

        let raw = generator
            .generate(STRUCTURING_SYSTEM_PROMPT, &user_prompt, config.temperature)
            .await
            .map_err(|e| DocumentError::GenerationFailed {
                detail: e.to_string(),
            })?;

        match parse_scenarios(&raw) {
            Ok(scenarios) => {
                debug!("structured {} scenarios on attempt {attempt}", scenarios.len());
                return Ok(scenarios);
            }
            Err(reason) => {
                warn!("attempt {attempt}: invalid scenario JSON: {reason}");
                last_raw = raw;
            }
        }
    }

    Err(DocumentError::StructuringFailed {
        attempts: config.max_attempts,
        raw_output: last_raw,
    })
}

// ── Parse and validate ───────────────────────────────────────────────────

static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*(.*?)\s*```\s*$").unwrap());

/// Strip a surrounding markdown fence, if the model added one despite the
/// prompt.
fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    match RE_FENCED.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

/// Parse one generation response into validated scenario records.
///
/// Accepted shapes: an array of scenario objects, a single scenario object,
/// or a mapping of arbitrary scenario ids to scenario objects. The error
/// `String` is a human-readable reason used for retry logging.
pub fn parse_scenarios(raw: &str) -> Result<Vec<ScenarioRecord>, String> {
    let cleaned = strip_fences(raw);
    let value: Value =
        serde_json::from_str(&cleaned).map_err(|e| format!("JSON parse error: {e}"))?;

    scenario_objects(value)?
        .iter()
        .enumerate()
        .map(|(ordinal, v)| scenario_from_value(ordinal, v))
        .collect()
}

/// Normalise the accepted response shapes into an ordered object list.
///
/// For the mapping shape the JSON key type guarantees no order, and
/// serde_json does not preserve response order either, so entries are sorted
/// by the numeric value of their key (all-numeric keys) or by the key string
/// otherwise. This keeps "1", "2", ..., "10" in numeric order where a plain
/// string sort would put "10" second.
fn scenario_objects(value: Value) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(map) => {
            if map.contains_key("parentQuestion") {
                return Ok(vec![Value::Object(map)]);
            }
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            let all_numeric = entries
                .iter()
                .all(|(k, _)| k.trim().parse::<i64>().is_ok());
            if all_numeric {
                entries.sort_by_key(|(k, _)| k.trim().parse::<i64>().unwrap_or(i64::MAX));
            } else {
                entries.sort_by(|a, b| a.0.cmp(&b.0));
            }
            Ok(entries.into_iter().map(|(_, v)| v).collect())
        }
        other => Err(format!(
            "expected an array or object of scenarios, got {}",
            json_kind(&other)
        )),
    }
}

fn scenario_from_value(ordinal: usize, v: &Value) -> Result<ScenarioRecord, String> {
    let obj = v
        .as_object()
        .ok_or_else(|| format!("scenario {ordinal}: expected an object, got {}", json_kind(v)))?;

    let parent_question = required_string(obj, "parentQuestion", ordinal)?;
    let module_id = coerce_integer(obj.get("moduleId"), "moduleId", ordinal)?;

    let children: Vec<ChildQuestion> = match obj.get("childQuestions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(j, c)| child_from_value(ordinal, j, c))
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(format!("scenario {ordinal}: childQuestions must be an array")),
    };

    let has_image = obj.get("hasImage").and_then(Value::as_bool).unwrap_or(false);
    let image_hint = if has_image {
        let position = match obj.get("imagePosition") {
            // The scenario's own ordinal is the fallback anchor.
            None | Some(Value::Null) => ordinal,
            some => coerce_integer(some, "imagePosition", ordinal)?.max(0) as usize,
        };
        Some(ImageHint { position })
    } else {
        None
    };

    Ok(ScenarioRecord {
        parent_question,
        module_id,
        children,
        image_hint,
        image_url: None,
    })
}

fn child_from_value(ordinal: usize, index: usize, v: &Value) -> Result<ChildQuestion, String> {
    let obj = v.as_object().ok_or_else(|| {
        format!("scenario {ordinal} child {index}: expected an object, got {}", json_kind(v))
    })?;
    Ok(ChildQuestion {
        question_lead: required_string(obj, "questionLead", ordinal)?,
        ideal_answer: required_string(obj, "idealAnswer", ordinal)?,
        key_concept: required_string(obj, "keyConcept", ordinal)?,
    })
}

fn required_string(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    ordinal: usize,
) -> Result<String, String> {
    let s = obj
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .ok_or_else(|| format!("scenario {ordinal}: missing or non-string '{key}'"))?;
    if s.is_empty() {
        return Err(format!("scenario {ordinal}: '{key}' is empty"));
    }
    Ok(s.to_string())
}

/// Integer coercion for ids: JSON number, numeric string, or whole float.
fn coerce_integer(value: Option<&Value>, key: &str, ordinal: usize) -> Result<i64, String> {
    let err = || format!("scenario {ordinal}: '{key}' is not an integer");
    match value {
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    Ok(f as i64)
                } else {
                    Err(err())
                }
            } else {
                Err(err())
            }
        }
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| err()),
        _ => Err(err()),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
