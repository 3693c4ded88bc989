//! Assertion Evaluator (C5). Checks each enabled `AssertRule` against an
//! execute result and reports pass/fail with a human-readable detail per
//! rule, plus an overall pass flag (spec.md §4.5).

use serde_json::Value;

use crate::execution::ExecutionResult;
use crate::models::{AssertType, Comparator};
use crate::variable_extraction::extract_json_by_expr;

#[derive(Debug, Clone)]
pub struct AssertRecord {
    pub assert_type: String,
    pub comparator: String,
    pub expected_value: Option<Value>,
    pub actual_value: Value,
    pub passed: bool,
    pub detail: String,
}

/// `source_expr` is only consulted for `json_path` rules. A `status_code`
/// rule always reads `execute_result.response_status_code` regardless of
/// what `source_expr` holds, matching the Python fixture's behavior — a
/// `source_expr` set on a `status_code` rule is persisted but has no effect.
fn actual_value(rule_type: AssertType, source_expr: Option<&str>, execute_result: &ExecutionResult) -> (bool, Value) {
    match rule_type {
        AssertType::StatusCode => match execute_result.response_status_code {
            Some(code) => (true, Value::from(code)),
            None => (false, Value::Null),
        },
        AssertType::JsonPath => {
            let Some(body) = execute_result.response_body.as_deref() else {
                return (false, Value::Null);
            };
            match serde_json::from_str::<Value>(body) {
                Ok(payload) => extract_json_by_expr(&payload, source_expr),
                Err(_) => (false, Value::Null),
            }
        }
        AssertType::TextContains => match execute_result.response_body.as_deref() {
            Some(body) => (true, Value::String(body.to_string())),
            None => (false, Value::Null),
        },
    }
}

/// `eq`/`ne` compare loosely when one side is a number and the other a
/// numeric string, so `expected_value: 200` matches an actual value read
/// back as `"200"` (and vice versa) — the shapes JSON round-trips through
/// a text response body tend to produce.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    let as_number_text = |v: &Value| match v {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if s.parse::<f64>().is_ok() => Some(s.clone()),
        _ => None,
    };
    match (as_number_text(a), as_number_text(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Substring test on strings, membership test on sequences (spec.md §4.5).
fn contains(actual: &Value, expected: Option<&Value>) -> bool {
    let Some(expected) = expected else { return false };
    match actual {
        Value::String(haystack) => expected.as_str().map(|needle| haystack.contains(needle)).unwrap_or(false),
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, expected)),
        _ => false,
    }
}

fn compare(comparator: Comparator, actual: &Value, expected: Option<&Value>) -> bool {
    match comparator {
        Comparator::Eq => expected.map(|e| loosely_equal(actual, e)).unwrap_or(false),
        Comparator::Ne => expected.map(|e| !loosely_equal(actual, e)).unwrap_or(true),
        Comparator::Contains => contains(actual, expected),
        Comparator::NotContains => match expected {
            Some(_) => !contains(actual, expected),
            None => true,
        },
    }
}

/// Evaluate every rule, returning `(overall_passed, records)` where
/// `overall_passed` is true only if every record passed (an empty rule set
/// passes vacuously).
pub fn evaluate_assert_rules(
    rules: &[crate::models::AssertRule],
    execute_result: &ExecutionResult,
) -> (bool, Vec<AssertRecord>) {
    let mut overall = true;
    let mut records = Vec::with_capacity(rules.len());

    for rule in rules {
        let Some(assert_type) = AssertType::parse(&rule.assert_type) else {
            overall = false;
            records.push(AssertRecord {
                assert_type: rule.assert_type.clone(),
                comparator: rule.comparator.clone(),
                expected_value: rule.expected_value.clone(),
                actual_value: Value::Null,
                passed: false,
                detail: format!("断言失败: 未知断言类型 {}", rule.assert_type),
            });
            continue;
        };
        let comparator = Comparator::parse(&rule.comparator);
        let (found, actual) = actual_value(assert_type, rule.source_expr.as_deref(), execute_result);
        let passed = found && compare(comparator, &actual, rule.expected_value.as_ref());

        let detail = if passed {
            "断言通过".to_string()
        } else if let Some(message) = &rule.message {
            format!("断言失败: {message}")
        } else {
            format!(
                "断言失败: 期望 {} {} {}，实际为 {}",
                rule.assert_type,
                rule.comparator,
                rule.expected_value.as_ref().unwrap_or(&Value::Null),
                actual
            )
        };

        if !passed {
            overall = false;
        }
        records.push(AssertRecord {
            assert_type: rule.assert_type.clone(),
            comparator: rule.comparator.clone(),
            expected_value: rule.expected_value.clone(),
            actual_value: actual,
            passed,
            detail,
        });
    }

    (overall, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_rule() -> crate::models::AssertRule {
        crate::models::AssertRule {
            id: 100,
            request_id: 1,
            dataset_id: None,
            assert_type: "status_code".into(),
            source_expr: None,
            comparator: "eq".into(),
            expected_value: Some(json!(200)),
            message: None,
            is_enabled: true,
            sort: 0,
            is_deleted: 0,
        }
    }

    fn result_with(status: Option<i32>, body: Option<&str>) -> ExecutionResult {
        ExecutionResult {
            dataset_snapshot: Value::Null,
            request_snapshot: Value::Null,
            response_status_code: status,
            response_headers: json!({}),
            response_body: body.map(|s| s.to_string()),
            response_time_ms: 5,
            is_success: status.map(|s| (200..300).contains(&s)).unwrap_or(false),
            error_message: None,
        }
    }

    #[test]
    fn status_code_assert_pass() {
        let rule = base_rule();
        let result = result_with(Some(200), None);
        let (passed, records) = evaluate_assert_rules(&[rule], &result);
        assert!(passed);
        assert_eq!(records.len(), 1);
        assert!(records[0].passed);
    }

    #[test]
    fn json_path_assert_fail() {
        let mut rule = base_rule();
        rule.assert_type = "json_path".into();
        rule.source_expr = Some("$.data.ok".into());
        rule.expected_value = Some(json!(true));
        let result = result_with(None, Some(r#"{"data":{"ok":false}}"#));

        let (passed, records) = evaluate_assert_rules(&[rule], &result);
        assert!(!passed);
        assert_eq!(records.len(), 1);
        assert!(!records[0].passed);
        assert!(records[0].detail.contains("断言失败"));
    }

    #[test]
    fn text_contains_assert_pass() {
        let mut rule = base_rule();
        rule.assert_type = "text_contains".into();
        rule.comparator = "contains".into();
        rule.expected_value = Some(json!("hello"));
        let result = result_with(None, Some("hello world"));

        let (passed, records) = evaluate_assert_rules(&[rule], &result);
        assert!(passed);
        assert!(records[0].passed);
    }

    #[test]
    fn not_contains_comparator_passes_when_absent() {
        let mut rule = base_rule();
        rule.assert_type = "text_contains".into();
        rule.comparator = "not_contains".into();
        rule.expected_value = Some(json!("error"));
        let result = result_with(None, Some("all good"));

        let (passed, _) = evaluate_assert_rules(&[rule], &result);
        assert!(passed);
    }

    #[test]
    fn ne_comparator_on_status_code() {
        let mut rule = base_rule();
        rule.comparator = "ne".into();
        rule.expected_value = Some(json!(500));
        let result = result_with(Some(200), None);

        let (passed, _) = evaluate_assert_rules(&[rule], &result);
        assert!(passed);
    }

    #[test]
    fn eq_coerces_number_against_numeric_string() {
        let mut rule = base_rule();
        rule.assert_type = "json_path".into();
        rule.source_expr = Some("$.code".into());
        rule.expected_value = Some(json!(200));
        let result = result_with(None, Some(r#"{"code":"200"}"#));

        let (passed, _) = evaluate_assert_rules(&[rule], &result);
        assert!(passed);
    }

    #[test]
    fn empty_rule_set_passes_vacuously() {
        let result = result_with(Some(200), None);
        let (passed, records) = evaluate_assert_rules(&[], &result);
        assert!(passed);
        assert!(records.is_empty());
    }

    #[test]
    fn contains_tests_membership_on_sequences() {
        let mut rule = base_rule();
        rule.assert_type = "json_path".into();
        rule.comparator = "contains".into();
        rule.source_expr = Some("$.tags".into());
        rule.expected_value = Some(json!("admin"));
        let result = result_with(None, Some(r#"{"tags":["user","admin"]}"#));

        let (passed, _) = evaluate_assert_rules(&[rule], &result);
        assert!(passed);
    }

    #[test]
    fn missing_status_code_fails_closed() {
        let rule = base_rule();
        let result = result_with(None, None);
        let (passed, records) = evaluate_assert_rules(&[rule], &result);
        assert!(!passed);
        assert!(!records[0].passed);
    }
}
