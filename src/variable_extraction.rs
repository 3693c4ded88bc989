//! Variable Extractor (C4). Pulls values out of an execute result — response
//! headers, JSON body, cookies, regex match, status code, or the running
//! session map — according to each `ExtractRule`, and records what it found
//! (spec.md §4.4).

use std::fmt;

use regex::Regex;
use serde_json::{Map, Value};

use crate::execution::ExecutionResult;
use crate::models::{ExtractRule, ExtractSourceType};

/// A rule marked `required` produced nothing. Mirrors the original's
/// `ExtractRequiredError`.
#[derive(Debug, Clone)]
pub struct ExtractRequiredError {
    pub var_name: String,
    pub source_type: String,
    pub source_expr: Option<String>,
}

impl fmt::Display for ExtractRequiredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "变量提取失败: {} ({}:{})",
            self.var_name,
            self.source_type,
            self.source_expr.as_deref().unwrap_or("")
        )
    }
}

impl std::error::Error for ExtractRequiredError {}

/// One successful extraction, ready to persist as a `RunVariable`.
#[derive(Debug, Clone)]
pub struct ExtractRecord {
    pub var_name: String,
    pub var_value: Value,
    pub value_type: String,
    pub source_type: String,
    pub source_expr: Option<String>,
    pub scope: String,
    pub is_secret: bool,
}

fn normalize_headers(headers: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    if let Some(map) = headers.as_object() {
        for (key, value) in map {
            out.insert(key.to_ascii_lowercase(), value.clone());
        }
    }
    out
}

/// Navigate a JSON value by a lightweight path expression: an optional
/// leading `$.` or `$`, `.`-separated segments, and `[n]` numeric indices.
pub(crate) fn extract_json_by_expr(data: &Value, expr: Option<&str>) -> (bool, Value) {
    let expr = match expr {
        None => return (true, data.clone()),
        Some(e) if e.trim().is_empty() => return (true, data.clone()),
        Some(e) => e.trim(),
    };

    let path = expr
        .strip_prefix("$.")
        .or_else(|| expr.strip_prefix('$'))
        .unwrap_or(expr);

    enum Token {
        Key(String),
        Index(usize),
    }

    let mut tokens = Vec::new();
    for chunk in path.split('.') {
        if chunk.is_empty() {
            continue;
        }
        let bytes = chunk.as_bytes();
        let mut pos = 0usize;
        loop {
            match chunk[pos..].find('[') {
                None => {
                    tokens.push(Token::Key(chunk[pos..].to_string()));
                    break;
                }
                Some(rel) => {
                    let left = pos + rel;
                    if left > pos {
                        tokens.push(Token::Key(chunk[pos..left].to_string()));
                    }
                    let Some(rel_right) = chunk[left + 1..].find(']') else {
                        return (false, Value::Null);
                    };
                    let right = left + 1 + rel_right;
                    let index_text = chunk[left + 1..right].trim();
                    let Ok(index) = index_text.parse::<usize>() else {
                        return (false, Value::Null);
                    };
                    if index_text.is_empty() || !index_text.bytes().all(|b| b.is_ascii_digit()) {
                        return (false, Value::Null);
                    }
                    tokens.push(Token::Index(index));
                    pos = right + 1;
                    if pos >= bytes.len() {
                        break;
                    }
                }
            }
        }
    }

    let mut current = data;
    for token in &tokens {
        match token {
            Token::Index(i) => match current.as_array().and_then(|a| a.get(*i)) {
                Some(next) => current = next,
                None => return (false, Value::Null),
            },
            Token::Key(k) => match current.as_object().and_then(|m| m.get(k)) {
                Some(next) => current = next,
                None => return (false, Value::Null),
            },
        }
    }
    (true, current.clone())
}

/// Parse a `Set-Cookie` header (string or folded array of strings) and
/// return the named cookie's value, the way `http.cookies.SimpleCookie`
/// does for the original implementation.
fn extract_response_cookie(headers: &Map<String, Value>, expr: Option<&str>) -> (bool, Value) {
    let Some(expr) = expr else { return (false, Value::Null) };
    let cookie_name = expr.trim();
    if cookie_name.is_empty() {
        return (false, Value::Null);
    }

    let raw_values: Vec<String> = match headers.get("set-cookie") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => return (false, Value::Null),
    };
    if raw_values.is_empty() {
        return (false, Value::Null);
    }

    for raw in &raw_values {
        for pair in raw.split(';') {
            let pair = pair.trim();
            let Some((name, value)) = pair.split_once('=') else { continue };
            if name.trim() == cookie_name {
                return (true, Value::String(value.trim().to_string()));
            }
        }
    }
    (false, Value::Null)
}

fn extract_from_response_json(response_body: Option<&str>, expr: Option<&str>) -> (bool, Value) {
    let Some(body) = response_body else { return (false, Value::Null) };
    match serde_json::from_str::<Value>(body) {
        Ok(payload) => extract_json_by_expr(&payload, expr),
        Err(_) => (false, Value::Null),
    }
}

fn extract_from_response_regex(response_body: Option<&str>, expr: Option<&str>) -> (bool, Value) {
    let (Some(body), Some(expr)) = (response_body, expr) else {
        return (false, Value::Null);
    };
    if expr.is_empty() {
        return (false, Value::Null);
    }
    let Ok(pattern) = Regex::new(expr) else { return (false, Value::Null) };
    let Some(caps) = pattern.captures(body) else { return (false, Value::Null) };

    if let Some(group) = caps.get(1) {
        (true, Value::String(group.as_str().to_string()))
    } else if let Some(whole) = caps.get(0) {
        (true, Value::String(whole.as_str().to_string()))
    } else {
        (false, Value::Null)
    }
}

fn extract_rule_value(
    rule: &ExtractRule,
    execute_result: &ExecutionResult,
    runtime_variables: &Map<String, Value>,
) -> (bool, Value) {
    let source_expr = rule.source_expr.as_deref();
    let response_headers = normalize_headers(&execute_result.response_headers);
    let response_body = execute_result.response_body.as_deref();
    let response_status = execute_result.response_status_code;

    match ExtractSourceType::parse(&rule.source_type) {
        Some(ExtractSourceType::ResponseHeader) => {
            let Some(key) = source_expr.map(|s| s.trim().to_ascii_lowercase()) else {
                return (false, Value::Null);
            };
            match response_headers.get(&key) {
                Some(value) => (true, value.clone()),
                None => (false, Value::Null),
            }
        }
        Some(ExtractSourceType::ResponseJson) => extract_from_response_json(response_body, source_expr),
        Some(ExtractSourceType::ResponseCookie) => extract_response_cookie(&response_headers, source_expr),
        Some(ExtractSourceType::ResponseTextRegex) => extract_from_response_regex(response_body, source_expr),
        Some(ExtractSourceType::ResponseStatus) => match response_status {
            Some(code) => (true, Value::from(code)),
            None => (false, Value::Null),
        },
        Some(ExtractSourceType::Session) => {
            let key = source_expr
                .filter(|s| !s.trim().is_empty())
                .or(Some(rule.var_name.as_str()))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            if key.is_empty() {
                return (false, Value::Null);
            }
            match runtime_variables.get(&key) {
                Some(value) => (true, value.clone()),
                None => (false, Value::Null),
            }
        }
        None => (false, Value::Null),
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Apply every enabled rule in order, returning the extracted name/value
/// map plus one `ExtractRecord` per success. Bails out with
/// `ExtractRequiredError` the first time a `required` rule finds nothing,
/// leaving earlier successes in the returned partial maps up to the caller
/// to decide whether to keep (spec.md §4.4/§4.7: a required miss aborts the
/// whole step).
pub fn apply_extract_rules(
    rules: &[ExtractRule],
    execute_result: &ExecutionResult,
    runtime_variables: &Map<String, Value>,
) -> Result<(Map<String, Value>, Vec<ExtractRecord>), ExtractRequiredError> {
    let mut extracted = Map::new();
    let mut records = Vec::new();

    for rule in rules {
        let (mut found, mut value) = extract_rule_value(rule, execute_result, runtime_variables);
        if !found {
            if let Some(default_value) = &rule.default_value {
                found = true;
                value = default_value.clone();
            }
        }

        if !found {
            if rule.required {
                return Err(ExtractRequiredError {
                    var_name: rule.var_name.clone(),
                    source_type: rule.source_type.clone(),
                    source_expr: rule.source_expr.clone(),
                });
            }
            continue;
        }

        extracted.insert(rule.var_name.clone(), value.clone());
        records.push(ExtractRecord {
            var_name: rule.var_name.clone(),
            value_type: value_type_name(&value).to_string(),
            var_value: value,
            source_type: rule.source_type.clone(),
            source_expr: rule.source_expr.clone(),
            scope: rule.scope.clone(),
            is_secret: rule.is_secret,
        });
    }

    Ok((extracted, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_rule() -> ExtractRule {
        ExtractRule {
            id: 1,
            request_id: 1,
            dataset_id: None,
            var_name: "v".into(),
            source_type: "response_json".into(),
            source_expr: None,
            required: false,
            default_value: None,
            scope: "scenario".into(),
            is_secret: false,
            is_enabled: true,
            sort: 0,
            is_deleted: 0,
        }
    }

    fn result_with(status: Option<i32>, headers: Value, body: Option<&str>) -> ExecutionResult {
        ExecutionResult {
            dataset_snapshot: Value::Null,
            request_snapshot: Value::Null,
            response_status_code: status,
            response_headers: headers,
            response_body: body.map(|s| s.to_string()),
            response_time_ms: 10,
            is_success: status.map(|s| (200..300).contains(&s)).unwrap_or(false),
            error_message: None,
        }
    }

    #[test]
    fn response_header_lookup_is_case_insensitive() {
        let result = result_with(Some(200), json!({"Content-Type": "application/json"}), None);
        let mut rule = base_rule();
        rule.source_type = "response_header".into();
        rule.source_expr = Some("content-type".into());
        let (extracted, records) = apply_extract_rules(&[rule], &result, &Map::new()).unwrap();
        assert_eq!(extracted["v"], json!("application/json"));
        assert_eq!(records[0].value_type, "str");
    }

    #[test]
    fn response_json_navigates_nested_path_with_index() {
        let body = json!({"data": {"items": [{"id": 7}]}}).to_string();
        let result = result_with(Some(200), json!({}), Some(&body));
        let mut rule = base_rule();
        rule.source_expr = Some("$.data.items[0].id".into());
        let (extracted, _) = apply_extract_rules(&[rule], &result, &Map::new()).unwrap();
        assert_eq!(extracted["v"], json!(7));
    }

    #[test]
    fn response_cookie_reads_named_value_from_set_cookie() {
        let result = result_with(Some(200), json!({"set-cookie": "session=abc123; Path=/"}), None);
        let mut rule = base_rule();
        rule.source_type = "response_cookie".into();
        rule.source_expr = Some("session".into());
        let (extracted, _) = apply_extract_rules(&[rule], &result, &Map::new()).unwrap();
        assert_eq!(extracted["v"], json!("abc123"));
    }

    #[test]
    fn response_text_regex_returns_first_group_when_present() {
        let result = result_with(Some(200), json!({}), Some("token=deadbeef;"));
        let mut rule = base_rule();
        rule.source_type = "response_text_regex".into();
        rule.source_expr = Some("token=([a-f0-9]+)".into());
        let (extracted, _) = apply_extract_rules(&[rule], &result, &Map::new()).unwrap();
        assert_eq!(extracted["v"], json!("deadbeef"));
    }

    #[test]
    fn response_status_is_extracted_directly() {
        let result = result_with(Some(204), json!({}), None);
        let mut rule = base_rule();
        rule.source_type = "response_status".into();
        let (extracted, _) = apply_extract_rules(&[rule], &result, &Map::new()).unwrap();
        assert_eq!(extracted["v"], json!(204));
    }

    #[test]
    fn session_source_reads_from_runtime_variables_by_var_name() {
        let result = result_with(Some(200), json!({}), None);
        let mut rule = base_rule();
        rule.source_type = "session".into();
        rule.var_name = "token".into();
        let mut runtime = Map::new();
        runtime.insert("token".into(), json!("carried-over"));
        let (extracted, _) = apply_extract_rules(&[rule], &result, &runtime).unwrap();
        assert_eq!(extracted["v"], json!("carried-over"));
    }

    #[test]
    fn missing_value_falls_back_to_default() {
        let result = result_with(Some(200), json!({}), Some("{}"));
        let mut rule = base_rule();
        rule.source_expr = Some("$.missing".into());
        rule.default_value = Some(json!("fallback"));
        let (extracted, records) = apply_extract_rules(&[rule], &result, &Map::new()).unwrap();
        assert_eq!(extracted["v"], json!("fallback"));
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_required_value_errors() {
        let result = result_with(Some(200), json!({}), Some("{}"));
        let mut rule = base_rule();
        rule.source_expr = Some("$.missing".into());
        rule.required = true;
        let err = apply_extract_rules(&[rule], &result, &Map::new()).unwrap_err();
        assert!(err.to_string().contains("变量提取失败"));
    }

    #[test]
    fn missing_optional_value_is_silently_skipped() {
        let result = result_with(Some(200), json!({}), Some("{}"));
        let mut rule = base_rule();
        rule.source_expr = Some("$.missing".into());
        let (extracted, records) = apply_extract_rules(&[rule], &result, &Map::new()).unwrap();
        assert!(extracted.is_empty());
        assert!(records.is_empty());
    }
}
