//! Request Execution Engine (C3). Materializes a concrete HTTP request by
//! composing a template, a dataset, an environment, and the running
//! variable context, issues the call, and captures the outcome
//! (spec.md §4.3).

use std::time::Instant;

use reqwest::redirect::Policy;
use serde_json::{Map, Value};

use crate::merge::merge_optional;
use crate::models::{Dataset, Environment, RequestTemplate};
use crate::rendering::render_value;

/// Response bodies are truncated to this many characters (spec.md §4.3 step 8).
pub const MAX_RESPONSE_BODY_LEN: usize = 200_000;

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub dataset_snapshot: Value,
    pub request_snapshot: Value,
    pub response_status_code: Option<i32>,
    pub response_headers: Value,
    pub response_body: Option<String>,
    pub response_time_ms: i32,
    pub is_success: bool,
    pub error_message: Option<String>,
}

fn as_object(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn build_dataset_snapshot(dataset: Option<&Dataset>) -> Value {
    let Some(dataset) = dataset else {
        return Value::Object(Map::new());
    };
    let mut snapshot = Map::new();
    snapshot.insert("id".into(), Value::from(dataset.id));
    snapshot.insert("request_id".into(), Value::from(dataset.request_id));
    snapshot.insert("name".into(), Value::String(dataset.name.clone()));
    snapshot.insert("variables".into(), dataset.variables.clone());
    snapshot.insert("query_params".into(), dataset.query_params.clone());
    snapshot.insert("headers".into(), dataset.headers.clone());
    snapshot.insert("cookies".into(), dataset.cookies.clone());
    snapshot.insert(
        "body_type".into(),
        dataset
            .body_type
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    snapshot.insert("body_data".into(), dataset.body_data.clone());
    snapshot.insert(
        "body_raw".into(),
        dataset
            .body_raw
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    Value::Object(snapshot)
}

/// Build the post-render `request_snapshot`, per spec.md §4.3 steps 1-4.
pub fn build_request_snapshot(
    request: &RequestTemplate,
    dataset: Option<&Dataset>,
    environment: Option<&Environment>,
    runtime_variables: &Map<String, Value>,
) -> Value {
    let env_variables = environment.map(|e| &e.variables);
    let dataset_variables = dataset.map(|d| &d.variables);
    let runtime_value = Value::Object(runtime_variables.clone());

    let variables_value = merge_optional(
        Some(&merge_optional(env_variables, dataset_variables)),
        Some(&runtime_value),
    );
    let variables = as_object(&variables_value);

    let query_params = merge_optional(Some(&request.base_query_params), dataset.map(|d| &d.query_params));
    let headers = merge_optional(Some(&request.base_headers), dataset.map(|d| &d.headers));
    let cookies = merge_optional(Some(&request.base_cookies), dataset.map(|d| &d.cookies));
    let body_data = merge_optional(Some(&request.base_body_data), dataset.map(|d| &d.body_data));

    let body_type = dataset
        .and_then(|d| d.body_type.clone())
        .unwrap_or_else(|| request.body_type.clone());

    let body_raw = dataset
        .and_then(|d| d.body_raw.clone())
        .or_else(|| request.base_body_raw.clone());

    let method = crate::models::HttpMethod::parse_or_default(&request.method)
        .as_str()
        .to_string();

    let mut snapshot = Map::new();
    snapshot.insert("request_id".into(), Value::from(request.id));
    snapshot.insert(
        "env_id".into(),
        environment
            .map(|e| Value::from(e.id))
            .or_else(|| request.env_id.map(Value::from))
            .unwrap_or(Value::Null),
    );
    snapshot.insert(
        "dataset_id".into(),
        dataset.map(|d| Value::from(d.id)).unwrap_or(Value::Null),
    );
    snapshot.insert("method".into(), Value::String(method));
    snapshot.insert("url".into(), Value::String(request.url.clone()));
    snapshot.insert("query_params".into(), query_params);
    snapshot.insert("headers".into(), headers);
    snapshot.insert("cookies".into(), cookies);
    snapshot.insert("body_type".into(), Value::String(body_type));
    snapshot.insert("body_data".into(), body_data);
    snapshot.insert(
        "body_raw".into(),
        body_raw.clone().map(Value::String).unwrap_or(Value::Null),
    );
    snapshot.insert("timeout_ms".into(), Value::from(request.timeout_ms));
    snapshot.insert("follow_redirects".into(), Value::from(request.follow_redirects));
    snapshot.insert("verify_ssl".into(), Value::from(request.verify_ssl));
    snapshot.insert(
        "proxy_url".into(),
        request.proxy_url.clone().map(Value::String).unwrap_or(Value::Null),
    );
    snapshot.insert("variables".into(), Value::Object(variables.clone()));

    for key in ["url", "query_params", "headers", "cookies", "body_data", "body_raw", "proxy_url"] {
        if let Some(value) = snapshot.get(key).cloned() {
            snapshot.insert(key.to_string(), render_value(&value, &variables));
        }
    }

    Value::Object(snapshot)
}

fn build_client(snapshot: &Value) -> reqwest::Result<reqwest::Client> {
    let timeout_ms = snapshot.get("timeout_ms").and_then(Value::as_i64).unwrap_or(30_000);
    let timeout_secs = (timeout_ms as f64 / 1000.0).max(0.001);
    let follow_redirects = snapshot
        .get("follow_redirects")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let verify_ssl = snapshot.get("verify_ssl").and_then(Value::as_bool).unwrap_or(true);

    let mut builder = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs_f64(timeout_secs))
        .danger_accept_invalid_certs(!verify_ssl)
        .redirect(if follow_redirects {
            Policy::default()
        } else {
            Policy::none()
        });

    if let Some(proxy_url) = snapshot.get("proxy_url").and_then(Value::as_str) {
        if let Ok(proxy) = reqwest::Proxy::all(proxy_url) {
            builder = builder.proxy(proxy);
        }
    }

    builder.build()
}

fn value_map_to_string_map(value: &Value) -> Vec<(String, String)> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), crate::rendering::to_canonical_text(v)))
                .collect()
        })
        .unwrap_or_default()
}

fn fold_headers(headers: &reqwest::header::HeaderMap) -> Value {
    let mut out = Map::new();
    for name in headers.keys() {
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let entry = if values.len() <= 1 {
            values
                .first()
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null)
        } else {
            Value::Array(values.into_iter().map(|v| Value::String(v.to_string())).collect())
        };
        out.insert(name.as_str().to_string(), entry);
    }
    Value::Object(out)
}

async fn execute_http_request(snapshot: &Value) -> ExecutionResult {
    let start = Instant::now();
    let method_str = snapshot.get("method").and_then(Value::as_str).unwrap_or("GET");
    let method = reqwest::Method::from_bytes(method_str.as_bytes()).unwrap_or(reqwest::Method::GET);
    let url = snapshot.get("url").and_then(Value::as_str).unwrap_or_default();

    let client = match build_client(snapshot) {
        Ok(client) => client,
        Err(err) => {
            let elapsed_ms = start.elapsed().as_millis() as i32;
            return ExecutionResult {
                dataset_snapshot: Value::Null,
                request_snapshot: Value::Null,
                response_status_code: None,
                response_headers: Value::Object(Map::new()),
                response_body: None,
                response_time_ms: elapsed_ms,
                is_success: false,
                error_message: Some(err.to_string()),
            };
        }
    };

    let mut builder = client.request(method, url);

    let query_params = value_map_to_string_map(snapshot.get("query_params").unwrap_or(&Value::Null));
    if !query_params.is_empty() {
        builder = builder.query(&query_params);
    }

    let headers = value_map_to_string_map(snapshot.get("headers").unwrap_or(&Value::Null));
    for (name, value) in headers {
        builder = builder.header(name, value);
    }

    let cookies = value_map_to_string_map(snapshot.get("cookies").unwrap_or(&Value::Null));
    if !cookies.is_empty() {
        let cookie_header = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        builder = builder.header(reqwest::header::COOKIE, cookie_header);
    }

    let body_type = snapshot.get("body_type").and_then(Value::as_str).unwrap_or("none");
    let body_data = snapshot.get("body_data").cloned().unwrap_or(Value::Null);
    let body_raw = snapshot.get("body_raw").cloned().unwrap_or(Value::Null);

    builder = match body_type {
        "json" => builder.json(&body_data),
        "form-urlencoded" | "form-data" => {
            let form = value_map_to_string_map(&body_data);
            builder.form(&form)
        }
        "raw" => {
            let content = if body_raw.is_null() && body_data.as_object().map(|m| !m.is_empty()).unwrap_or(false) {
                serde_json::to_string(&body_data).unwrap_or_default()
            } else {
                body_raw.as_str().map(|s| s.to_string()).unwrap_or_default()
            };
            builder.body(content)
        }
        "binary" => {
            let bytes: Vec<u8> = match &body_raw {
                Value::String(s) => s.clone().into_bytes(),
                Value::Null => Vec::new(),
                other => other.to_string().into_bytes(),
            };
            builder.body(bytes)
        }
        _ => builder,
    };

    match builder.send().await {
        Ok(response) => {
            let status = response.status();
            let headers = fold_headers(response.headers());
            let elapsed_ms_pre = start.elapsed().as_millis() as i32;
            let body_text = response.text().await.unwrap_or_default();
            let truncated: String = body_text.chars().take(MAX_RESPONSE_BODY_LEN).collect();
            let elapsed_ms = start.elapsed().as_millis().max(elapsed_ms_pre as u128) as i32;
            ExecutionResult {
                dataset_snapshot: Value::Null,
                request_snapshot: Value::Null,
                response_status_code: Some(status.as_u16() as i32),
                response_headers: headers,
                response_body: Some(truncated),
                response_time_ms: elapsed_ms,
                is_success: status.is_success(),
                error_message: None,
            }
        }
        Err(err) => {
            let elapsed_ms = start.elapsed().as_millis() as i32;
            ExecutionResult {
                dataset_snapshot: Value::Null,
                request_snapshot: Value::Null,
                response_status_code: None,
                response_headers: Value::Object(Map::new()),
                response_body: None,
                response_time_ms: elapsed_ms,
                is_success: false,
                error_message: Some(err.to_string()),
            }
        }
    }
}

/// Execute one (template, dataset) pair against the given environment and
/// runtime variables. Never returns `Err`: transport failures are captured
/// on the result (spec.md §4.3 step 7 / §7 transport-failure).
pub async fn execute_api_request(
    request: &RequestTemplate,
    dataset: Option<&Dataset>,
    environment: Option<&Environment>,
    runtime_variables: &Map<String, Value>,
) -> ExecutionResult {
    let request_snapshot = build_request_snapshot(request, dataset, environment, runtime_variables);
    let mut result = execute_http_request(&request_snapshot).await;
    result.request_snapshot = request_snapshot;
    result.dataset_snapshot = build_dataset_snapshot(dataset);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dataset, Environment, RequestTemplate};
    use httpmock::prelude::*;
    use serde_json::json;

    fn base_request(url: String) -> RequestTemplate {
        RequestTemplate {
            id: 1,
            env_id: None,
            name: "t".into(),
            method: "GET".into(),
            url,
            base_query_params: json!({}),
            base_headers: json!({}),
            base_cookies: json!({}),
            body_type: "none".into(),
            base_body_data: json!({}),
            base_body_raw: None,
            timeout_ms: 5000,
            follow_redirects: true,
            verify_ssl: true,
            proxy_url: None,
            dataset_run_mode: "all".into(),
            default_dataset_id: None,
            execute_count: 0,
            is_deleted: 0,
            create_time: chrono::Utc::now(),
            update_time: chrono::Utc::now(),
        }
    }

    #[test]
    fn snapshot_renders_dataset_and_template_query_params() {
        let mut request = base_request("http://h/echo".into());
        request.base_query_params = json!({"from": "base", "uid": "{{uid}}"});
        let dataset = Dataset {
            id: 10,
            request_id: 1,
            name: "d".into(),
            variables: json!({"uid": "u100", "tag": "ok"}),
            query_params: json!({"from": "dataset", "tag": "{{tag}}"}),
            headers: json!({}),
            cookies: json!({}),
            body_type: None,
            body_data: json!({}),
            body_raw: None,
            is_default: true,
            is_enabled: true,
            sort: 0,
            is_deleted: 0,
        };
        let snapshot = build_request_snapshot(&request, Some(&dataset), None, &Map::new());
        assert_eq!(
            snapshot["query_params"],
            json!({"from": "dataset", "uid": "u100", "tag": "ok"})
        );
    }

    #[tokio::test]
    async fn simple_get_is_recorded_as_success() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/echo").query_param("u", "u1");
            then.status(200).body(r#"{"ok":true}"#);
        });

        let mut request = base_request(format!("{}/echo", server.base_url()));
        request.base_query_params = json!({"u": "{{uid}}"});
        let mut runtime = Map::new();
        runtime.insert("uid".into(), json!("u1"));

        let result = execute_api_request(&request, None, None, &runtime).await;
        mock.assert();
        assert!(result.is_success);
        assert_eq!(result.response_status_code, Some(200));
        assert_eq!(result.request_snapshot["url"], json!(format!("{}/echo", server.base_url())));
    }

    #[tokio::test]
    async fn non_2xx_is_failure_without_error_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/boom");
            then.status(500).body("oops");
        });
        let request = base_request(format!("{}/boom", server.base_url()));
        let result = execute_api_request(&request, None, None, &Map::new()).await;
        assert!(!result.is_success);
        assert_eq!(result.response_status_code, Some(500));
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn transport_failure_is_captured_not_raised() {
        let request = base_request("http://127.0.0.1:1/unreachable".into());
        let result = execute_api_request(&request, None, None, &Map::new()).await;
        assert!(!result.is_success);
        assert!(result.response_status_code.is_none());
        assert!(result.error_message.is_some());
    }
}
