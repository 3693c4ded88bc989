//! Scenario + ScenarioStep CRUD, step reorder, and the core run/report/cancel
//! endpoints (spec.md §4.7/§4.8/§6). The run/report/cancel handlers are the
//! only ones in this module that talk to anything beyond `db`: `run_scenario`
//! hands off to C8 via the queue, `get_report` calls C9.

use axum::{extract::Path, Extension, Json};
use serde::Deserialize;
use sqlx::PgPool;
use tokio::sync::mpsc::Sender;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;
use crate::job_queue::{self, Job};
use crate::models::RunStatus;
use crate::report;
use crate::response;

#[derive(Deserialize)]
pub struct CreateScenarioRequest {
    pub name: String,
    pub env_id: Option<i64>,
    #[serde(default = "default_run_mode")]
    pub run_mode: String,
    #[serde(default)]
    pub stop_on_fail: bool,
    #[serde(default)]
    pub sort: i32,
}

fn default_run_mode() -> String {
    "sequence".into()
}

pub async fn create_scenario(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Json(payload): Json<CreateScenarioRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    let scenario = db::scenarios::insert(
        &pool,
        db::scenarios::NewScenario {
            name: &payload.name,
            env_id: payload.env_id,
            run_mode: &payload.run_mode,
            stop_on_fail: payload.stop_on_fail,
            sort: payload.sort,
        },
    )
    .await?;
    Ok(response::created(scenario))
}

pub async fn list_scenarios(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
) -> AppResult<impl axum::response::IntoResponse> {
    Ok(response::ok(db::scenarios::list(&pool).await?))
}

pub async fn get_scenario(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl axum::response::IntoResponse> {
    let scenario = db::scenarios::get(&pool, id).await?.ok_or(AppError::NotFoundEntity)?;
    Ok(response::ok(scenario))
}

#[derive(Deserialize)]
pub struct CreateScenarioStepRequest {
    pub request_id: i64,
    #[serde(default)]
    pub step_no: i32,
    pub dataset_id: Option<i64>,
    #[serde(default = "default_dataset_run_mode")]
    pub dataset_run_mode: String,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default)]
    pub stop_on_fail: bool,
}

fn default_dataset_run_mode() -> String {
    "request_default".into()
}

fn default_true() -> bool {
    true
}

pub async fn create_scenario_step(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(scenario_id): Path<i64>,
    Json(payload): Json<CreateScenarioStepRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    db::scenarios::get(&pool, scenario_id).await?.ok_or(AppError::NotFoundEntity)?;
    db::requests::get(&pool, payload.request_id).await?.ok_or(AppError::NotFoundEntity)?;

    let step_no = if payload.step_no > 0 {
        payload.step_no
    } else {
        db::scenario_steps::list_for_scenario(&pool, scenario_id).await?.len() as i32 + 1
    };

    let step = db::scenario_steps::insert(
        &pool,
        db::scenario_steps::NewScenarioStep {
            scenario_id,
            request_id: payload.request_id,
            step_no,
            dataset_id: payload.dataset_id,
            dataset_run_mode: &payload.dataset_run_mode,
            is_enabled: payload.is_enabled,
            stop_on_fail: payload.stop_on_fail,
        },
    )
    .await?;
    Ok(response::created(step))
}

pub async fn list_scenario_steps(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(scenario_id): Path<i64>,
) -> AppResult<impl axum::response::IntoResponse> {
    Ok(response::ok(db::scenario_steps::list_for_scenario(&pool, scenario_id).await?))
}

#[derive(Deserialize)]
pub struct ReorderStepsRequest {
    pub step_ids: Vec<i64>,
}

pub async fn reorder_scenario_steps(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(scenario_id): Path<i64>,
    Json(payload): Json<ReorderStepsRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    db::scenarios::get(&pool, scenario_id).await?.ok_or(AppError::NotFoundEntity)?;
    db::scenario_steps::reorder(&pool, scenario_id, &payload.step_ids).await?;
    db::scenario_steps::normalize_step_numbers(&pool, scenario_id).await?;
    Ok(response::ok(db::scenario_steps::list_for_scenario(&pool, scenario_id).await?))
}

#[derive(Deserialize)]
pub struct RunScenarioRequest {
    pub scenario_id: i64,
    pub env_id: Option<i64>,
    #[serde(default = "default_trigger_type")]
    pub trigger_type: String,
    #[serde(default = "default_initial_variables")]
    pub initial_variables: serde_json::Value,
}

fn default_trigger_type() -> String {
    "manual".into()
}

fn default_initial_variables() -> serde_json::Value {
    serde_json::json!({})
}

/// `POST /api/scenario/run` (spec.md §4.7/§6). Creates a queued
/// `ScenarioRun` and hands it to C8; the HTTP response never waits on
/// execution.
pub async fn run_scenario(
    Extension(pool): Extension<PgPool>,
    Extension(tx): Extension<Sender<Job>>,
    _user: AuthUser,
    Json(payload): Json<RunScenarioRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    db::scenarios::get(&pool, payload.scenario_id).await?.ok_or(AppError::NotFoundEntity)?;

    let scenario_run = db::scenario_runs::insert_queued(
        &pool,
        payload.scenario_id,
        payload.env_id,
        &payload.trigger_type,
        &payload.initial_variables,
    )
    .await?;
    job_queue::enqueue(&pool, &tx, scenario_run.id).await;

    Ok(response::accepted(serde_json::json!({
        "scenario_run_id": scenario_run.id,
        "run_status": scenario_run.run_status,
    })))
}

pub async fn get_scenario_run(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl axum::response::IntoResponse> {
    let scenario_run = db::scenario_runs::get(&pool, id).await?.ok_or(AppError::NotFoundEntity)?;
    Ok(response::ok(scenario_run))
}

pub async fn get_scenario_run_report(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl axum::response::IntoResponse> {
    let report = report::build(&pool, id).await?.ok_or(AppError::NotFoundEntity)?;
    Ok(response::ok(report))
}

#[derive(Deserialize)]
pub struct CancelScenarioRunRequest {
    pub scenario_run_id: i64,
}

/// `POST /api/scenario/run/cancel` (spec.md §4.8/§6). Sets
/// `cancel_requested`; the actual stop happens cooperatively, either before
/// C8 ever claims the run or between orchestrator steps. A run already in a
/// terminal state answers with business code 10005 rather than a hard error.
pub async fn cancel_scenario_run(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Json(payload): Json<CancelScenarioRunRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    let scenario_run = db::scenario_runs::get(&pool, payload.scenario_run_id)
        .await?
        .ok_or(AppError::NotFoundEntity)?;

    if RunStatus::parse(&scenario_run.run_status).is_terminal() {
        return Err(AppError::InvalidState("运行已结束，无法取消".into()));
    }

    db::scenario_runs::request_cancel(&pool, payload.scenario_run_id).await?;
    Ok(response::created(serde_json::json!({ "scenario_run_id": payload.scenario_run_id, "cancel_requested": true })))
}
