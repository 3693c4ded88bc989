//! Thin CRUD around `RequestTemplate`/`Dataset`/`ExtractRule`/`AssertRule`,
//! plus the standalone "run single case" endpoint
//! (`POST /api/case/run`, spec.md §4.6/§6) which is the one handler here
//! that actually drives C1-C5 rather than just persisting a row.

use axum::{extract::Path, Extension, Json};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::assertion::evaluate_assert_rules;
use crate::dataset_resolver::resolve_default_dataset;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::execution::execute_api_request;
use crate::extractor::AuthUser;
use crate::models::Dataset;
use crate::response;
use crate::variable_extraction::apply_extract_rules;

#[derive(Deserialize)]
pub struct CreateRequestTemplate {
    pub env_id: Option<i64>,
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub base_query_params: Value,
    #[serde(default)]
    pub base_headers: Value,
    #[serde(default)]
    pub base_cookies: Value,
    #[serde(default = "default_body_type")]
    pub body_type: String,
    #[serde(default)]
    pub base_body_data: Value,
    pub base_body_raw: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i32,
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    pub proxy_url: Option<String>,
    #[serde(default = "default_dataset_run_mode")]
    pub dataset_run_mode: String,
    pub default_dataset_id: Option<i64>,
}

fn default_method() -> String {
    "GET".into()
}
fn default_body_type() -> String {
    "none".into()
}
fn default_timeout_ms() -> i32 {
    30_000
}
fn default_true() -> bool {
    true
}
fn default_dataset_run_mode() -> String {
    "all".into()
}

pub async fn create_request(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Json(payload): Json<CreateRequestTemplate>,
) -> AppResult<impl axum::response::IntoResponse> {
    if crate::models::HttpMethod::parse_or_default(&payload.method).as_str() != payload.method.to_ascii_uppercase() {
        return Err(AppError::BadRequestShape(format!("unsupported method {}", payload.method)));
    }
    let request = db::requests::insert(
        &pool,
        db::requests::NewRequestTemplate {
            env_id: payload.env_id,
            name: &payload.name,
            method: &payload.method.to_ascii_uppercase(),
            url: &payload.url,
            base_query_params: &payload.base_query_params,
            base_headers: &payload.base_headers,
            base_cookies: &payload.base_cookies,
            body_type: &payload.body_type,
            base_body_data: &payload.base_body_data,
            base_body_raw: payload.base_body_raw.as_deref(),
            timeout_ms: payload.timeout_ms,
            follow_redirects: payload.follow_redirects,
            verify_ssl: payload.verify_ssl,
            proxy_url: payload.proxy_url.as_deref(),
            dataset_run_mode: &payload.dataset_run_mode,
            default_dataset_id: payload.default_dataset_id,
        },
    )
    .await?;
    Ok(response::created(request))
}

pub async fn list_requests(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
) -> AppResult<impl axum::response::IntoResponse> {
    Ok(response::ok(db::requests::list(&pool).await?))
}

pub async fn get_request(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl axum::response::IntoResponse> {
    let request = db::requests::get(&pool, id).await?.ok_or(AppError::NotFoundEntity)?;
    Ok(response::ok(request))
}

#[derive(Deserialize)]
pub struct CreateDatasetRequest {
    pub name: String,
    #[serde(default)]
    pub variables: Value,
    #[serde(default)]
    pub query_params: Value,
    #[serde(default)]
    pub headers: Value,
    #[serde(default)]
    pub cookies: Value,
    pub body_type: Option<String>,
    #[serde(default)]
    pub body_data: Value,
    pub body_raw: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default)]
    pub sort: i32,
}

pub async fn create_dataset(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(request_id): Path<i64>,
    Json(payload): Json<CreateDatasetRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    db::requests::get(&pool, request_id).await?.ok_or(AppError::NotFoundEntity)?;
    let dataset = db::datasets::insert(
        &pool,
        db::datasets::NewDataset {
            request_id,
            name: &payload.name,
            variables: &payload.variables,
            query_params: &payload.query_params,
            headers: &payload.headers,
            cookies: &payload.cookies,
            body_type: payload.body_type.as_deref(),
            body_data: &payload.body_data,
            body_raw: payload.body_raw.as_deref(),
            is_default: payload.is_default,
            is_enabled: payload.is_enabled,
            sort: payload.sort,
        },
    )
    .await?;
    Ok(response::created(dataset))
}

pub async fn list_datasets(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(request_id): Path<i64>,
) -> AppResult<impl axum::response::IntoResponse> {
    Ok(response::ok(db::datasets::list_enabled_for_request(&pool, request_id).await?))
}

#[derive(Deserialize)]
pub struct CreateExtractRuleRequest {
    pub dataset_id: Option<i64>,
    pub var_name: String,
    pub source_type: String,
    pub source_expr: Option<String>,
    #[serde(default)]
    pub required: bool,
    pub default_value: Option<Value>,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default)]
    pub is_secret: bool,
    #[serde(default)]
    pub sort: i32,
}

fn default_scope() -> String {
    "scenario".into()
}

pub async fn create_extract_rule(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(request_id): Path<i64>,
    Json(payload): Json<CreateExtractRuleRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    if crate::models::ExtractSourceType::parse(&payload.source_type).is_none() {
        return Err(AppError::BadRequestShape(format!("unknown source_type {}", payload.source_type)));
    }
    let rule = db::extract_rules::insert(
        &pool,
        db::extract_rules::NewExtractRule {
            request_id,
            dataset_id: payload.dataset_id,
            var_name: &payload.var_name,
            source_type: &payload.source_type,
            source_expr: payload.source_expr.as_deref(),
            required: payload.required,
            default_value: payload.default_value.as_ref(),
            scope: &payload.scope,
            is_secret: payload.is_secret,
            sort: payload.sort,
        },
    )
    .await?;
    Ok(response::created(rule))
}

pub async fn list_extract_rules(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(request_id): Path<i64>,
) -> AppResult<impl axum::response::IntoResponse> {
    Ok(response::ok(db::extract_rules::list_enabled_for_request(&pool, request_id).await?))
}

#[derive(Deserialize)]
pub struct CreateAssertRuleRequest {
    pub dataset_id: Option<i64>,
    pub assert_type: String,
    pub source_expr: Option<String>,
    #[serde(default = "default_comparator")]
    pub comparator: String,
    pub expected_value: Option<Value>,
    pub message: Option<String>,
    #[serde(default)]
    pub sort: i32,
}

fn default_comparator() -> String {
    "eq".into()
}

pub async fn create_assert_rule(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(request_id): Path<i64>,
    Json(payload): Json<CreateAssertRuleRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    if crate::models::AssertType::parse(&payload.assert_type).is_none() {
        return Err(AppError::BadRequestShape(format!("unknown assert_type {}", payload.assert_type)));
    }
    let rule = db::assert_rules::insert(
        &pool,
        db::assert_rules::NewAssertRule {
            request_id,
            dataset_id: payload.dataset_id,
            assert_type: &payload.assert_type,
            source_expr: payload.source_expr.as_deref(),
            comparator: &payload.comparator,
            expected_value: payload.expected_value.as_ref(),
            message: payload.message.as_deref(),
            sort: payload.sort,
        },
    )
    .await?;
    Ok(response::created(rule))
}

pub async fn list_assert_rules(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(request_id): Path<i64>,
) -> AppResult<impl axum::response::IntoResponse> {
    Ok(response::ok(db::assert_rules::list_enabled_for_request(&pool, request_id).await?))
}

#[derive(Deserialize)]
pub struct RunCaseRequest {
    pub request_id: i64,
    pub dataset_id: Option<i64>,
    pub env_id: Option<i64>,
}

/// `POST /api/case/run` (spec.md §6). Resolves a single dataset per §4.6's
/// standalone-run policy, executes C3, evaluates C5, applies C4, persists a
/// `RequestRun` with no `scenario_run_id`, and reports the outcome inline —
/// there is no queue hop for this path.
pub async fn run_case(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Json(payload): Json<RunCaseRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    let request = db::requests::get(&pool, payload.request_id)
        .await?
        .ok_or(AppError::NotFoundEntity)?;

    let dataset: Option<Dataset> = match payload.dataset_id {
        Some(dataset_id) => {
            let dataset = db::datasets::get(&pool, dataset_id).await?.ok_or(AppError::NotFoundEntity)?;
            if dataset.request_id != request.id {
                return Err(AppError::InvalidState("数据集与测试用例不匹配".into()));
            }
            if !dataset.is_enabled {
                return Err(AppError::InvalidState("数据集已禁用".into()));
            }
            Some(dataset)
        }
        None => {
            resolve_default_dataset(&request, |id| async {
                db::datasets::get(&pool, id).await.map_err(AppError::from)
            })
            .await?
            .into_iter()
            .next()
            .flatten()
        }
    };

    let environment = match payload.env_id.or(request.env_id) {
        Some(env_id) => db::environments::get(&pool, env_id).await?,
        None => None,
    };

    let execute_result =
        execute_api_request(&request, dataset.as_ref(), environment.as_ref(), &Map::new()).await;
    db::requests::increment_execute_count(&pool, request.id).await?;

    let request_run = db::request_runs::insert(
        &pool,
        db::request_runs::NewRequestRun {
            request_id: request.id,
            scenario_run_id: None,
            scenario_id: None,
            scenario_case_id: None,
            dataset_id: dataset.as_ref().map(|d| d.id),
            dataset_snapshot: &execute_result.dataset_snapshot,
            request_snapshot: &execute_result.request_snapshot,
            response_status_code: execute_result.response_status_code,
            response_headers: &execute_result.response_headers,
            response_body: execute_result.response_body.as_deref(),
            response_time_ms: Some(execute_result.response_time_ms),
            is_success: execute_result.is_success,
            error_message: execute_result.error_message.as_deref(),
        },
    )
    .await?;

    let assert_rules = db::assert_rules::applicable_for_dataset(
        db::assert_rules::list_enabled_for_request(&pool, request.id).await?,
        dataset.as_ref().map(|d| d.id),
    );
    let (assertions_passed, assert_records) = evaluate_assert_rules(&assert_rules, &execute_result);

    let extract_rules = db::extract_rules::applicable_for_dataset(
        db::extract_rules::list_enabled_for_request(&pool, request.id).await?,
        dataset.as_ref().map(|d| d.id),
    );
    let (extracted, required_error) = match apply_extract_rules(&extract_rules, &execute_result, &Map::new()) {
        Ok((extracted, records)) => {
            for record in &records {
                db::run_variables::insert(
                    &pool,
                    db::run_variables::NewRunVariable {
                        scenario_run_id: None,
                        request_run_id: request_run.id,
                        scenario_case_id: None,
                        request_id: request.id,
                        dataset_id: dataset.as_ref().map(|d| d.id),
                        record,
                    },
                )
                .await?;
            }
            (Value::Object(extracted), None)
        }
        Err(err) => (Value::Object(Map::new()), Some(err.to_string())),
    };

    let is_success = execute_result.is_success && assertions_passed && required_error.is_none();
    if is_success != execute_result.is_success {
        db::request_runs::update_success_and_error(&pool, request_run.id, is_success, execute_result.error_message.as_deref()).await?;
    }

    Ok(response::created(serde_json::json!({
        "run_id": request_run.id,
        "is_success": is_success,
        "response_status_code": execute_result.response_status_code,
        "response_time_ms": execute_result.response_time_ms,
        "error_message": required_error.or(execute_result.error_message),
        "extracted_variables": extracted,
        "assertions_total": assert_records.len(),
        "assertions_passed": assert_records.iter().filter(|r| r.passed).count(),
    })))
}
