//! Model output normalization
//!
//! Models often wrap their JSON in a markdown code fence. The text is
//! unfenced, parsed, and its `missing_fields` list reconciled with the
//! field values before anything else sees it.

use serde_json::{Map, Value};

use super::provider::ExtractionError;

const JSON_FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// Remove a leading "```json" and a trailing "```" marker, when present.
///
/// Surrounding whitespace is trimmed before the markers are matched, so a
/// fenced answer followed by a newline is still unfenced. Matching only the
/// exact first and last characters would leave such an answer fenced and
/// unparseable.
pub fn strip_fences(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix(JSON_FENCE_OPEN) {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix(FENCE_CLOSE) {
        text = rest;
    }
    text
}

/// Unfence, parse, and reconcile raw model text into an extraction object
pub fn parse_model_output(text: &str) -> Result<Map<String, Value>, ExtractionError> {
    let value: Value = serde_json::from_str(strip_fences(text))
        .map_err(|e| ExtractionError::MalformedOutput(e.to_string()))?;

    let mut object = match value {
        Value::Object(object) => object,
        other => {
            return Err(ExtractionError::MalformedOutput(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            )))
        }
    };

    if !object.contains_key("fields") {
        return Err(ExtractionError::MalformedOutput(
            "response has no \"fields\" mapping".to_string(),
        ));
    }

    reconcile_missing_fields(&mut object)?;
    Ok(object)
}

/// Ensure every field with a null, absent, or empty value is listed in
/// `missing_fields`.
///
/// Existing entries are kept in order and never duplicated; new names are
/// appended in field order. Objects without `fields` are left untouched.
pub fn reconcile_missing_fields(object: &mut Map<String, Value>) -> Result<(), ExtractionError> {
    let Some(fields) = object.get("fields") else {
        return Ok(());
    };

    let Value::Object(fields) = fields else {
        return Err(ExtractionError::MalformedOutput(format!(
            "\"fields\" must be an object, got {}",
            json_kind(fields)
        )));
    };

    let mut blank = Vec::new();
    for (name, entry) in fields {
        let Value::Object(entry) = entry else {
            return Err(ExtractionError::MalformedOutput(format!(
                "field \"{}\" must be an object, got {}",
                name,
                json_kind(entry)
            )));
        };

        let is_blank = match entry.get("value") {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if is_blank {
            blank.push(name.clone());
        }
    }

    let missing = match object
        .entry("missing_fields")
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(missing) => missing,
        other => {
            return Err(ExtractionError::MalformedOutput(format!(
                "\"missing_fields\" must be an array, got {}",
                json_kind(other)
            )))
        }
    };

    for name in blank {
        if !missing.iter().any(|m| m.as_str() == Some(name.as_str())) {
            missing.push(Value::String(name));
        }
    }

    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
