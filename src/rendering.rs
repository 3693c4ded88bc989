//! Template Renderer (C1). Substitutes `{{name}}` placeholders in strings
//! and nested JSON structures from a variable mapping. Never errors; an
//! unbound name is left in the output verbatim (spec.md §4.1/§9).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());

/// Render every `{{name}}` occurrence in `value` against `variables`,
/// recursing through objects and arrays. Non-string leaves pass through
/// unchanged.
pub fn render_value(value: &Value, variables: &Map<String, Value>) -> Value {
    match value {
        Value::String(s) => render_str(s, variables),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render_value(v, variables));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| render_value(item, variables)).collect())
        }
        other => other.clone(),
    }
}

/// Render a single string. If the entire (trimmed) content is one
/// `{{name}}` token bound to a value, the substitution keeps that value's
/// original type. Otherwise each occurrence is replaced by its canonical
/// textual form; unbound names are left literally as `{{name}}`.
pub fn render_str(s: &str, variables: &Map<String, Value>) -> Value {
    let trimmed = s.trim();
    if let Some(caps) = PLACEHOLDER.captures(trimmed) {
        if caps.get(0).map(|m| m.as_str()) == Some(trimmed) {
            let name = &caps[1];
            if let Some(bound) = variables.get(name) {
                return bound.clone();
            }
        }
    }

    let rendered = PLACEHOLDER.replace_all(s, |caps: &regex::Captures| {
        let name = &caps[1];
        match variables.get(name) {
            Some(value) => to_canonical_text(value),
            None => caps[0].to_string(),
        }
    });
    Value::String(rendered.into_owned())
}

/// Coerce a JSON value to the textual form used when it is interpolated
/// inside a larger string (spec.md §4.1).
pub fn to_canonical_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
