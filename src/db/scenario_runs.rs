use chrono::Utc;
use serde_json::Value;
use sqlx::{postgres::PgRow, Executor, PgPool, Postgres, Row};

use crate::models::ScenarioRun;

pub async fn insert_queued<'c, E>(
    executor: E,
    scenario_id: i64,
    env_id: Option<i64>,
    trigger_type: &str,
    initial_variables: &Value,
) -> Result<ScenarioRun, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let now = Utc::now();
    let row = sqlx::query(
        r#"
        INSERT INTO exile_test_scenario_runs (
            scenario_id, env_id, trigger_type, run_status, cancel_requested,
            total_request_runs, success_request_runs, failed_request_runs,
            is_success, runtime_variables, error_message, is_deleted, create_time, update_time
        )
        VALUES ($1,$2,$3,'queued',FALSE,0,0,0,FALSE,$4,NULL,0,$5,$5)
        RETURNING *
        "#,
    )
    .bind(scenario_id)
    .bind(env_id)
    .bind(trigger_type)
    .bind(initial_variables)
    .bind(now)
    .fetch_one(executor)
    .await?;
    Ok(map_row(&row))
}

pub async fn get<'c, E>(executor: E, id: i64) -> Result<Option<ScenarioRun>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query("SELECT * FROM exile_test_scenario_runs WHERE id = $1 AND is_deleted = 0")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|r| map_row(&r)))
}

/// Atomically claim a queued run for execution. Returns `true` only if this
/// call performed the `queued -> running` transition (spec.md §4.8 step 5 /
/// §5 at-most-one-worker semantics).
pub async fn try_claim(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE exile_test_scenario_runs
        SET run_status = 'running', update_time = $2
        WHERE id = $1 AND run_status = 'queued'
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Request cancellation. Returns `true` if the run was in a cancelable
/// (non-terminal) state, `false` if it had already reached success/failed
/// /canceled (spec.md §6: cancel on a terminal run answers with code 10005).
pub async fn request_cancel(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE exile_test_scenario_runs
        SET cancel_requested = TRUE, update_time = $2
        WHERE id = $1 AND run_status NOT IN ('success', 'failed', 'canceled')
        "#,
    )
    .bind(id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Transition a queued run straight to canceled, e.g. when C8 finds
/// `cancel_requested` already set before it ever claimed the run
/// (spec.md §4.8 step 4).
pub async fn cancel_before_claim(pool: &PgPool, id: i64, message: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE exile_test_scenario_runs
        SET run_status = 'canceled', error_message = $2, update_time = $3
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(message)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(pool: &PgPool, id: i64, message: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE exile_test_scenario_runs
        SET run_status = 'failed', is_success = FALSE, error_message = $2, update_time = $3
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(message)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub struct FinalizeScenarioRun<'a> {
    pub run_status: &'a str,
    pub is_success: bool,
    pub total_request_runs: i32,
    pub success_request_runs: i32,
    pub failed_request_runs: i32,
    pub runtime_variables: &'a Value,
    pub error_message: Option<&'a str>,
}

pub async fn finalize(pool: &PgPool, id: i64, input: FinalizeScenarioRun<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE exile_test_scenario_runs
        SET run_status = $2, is_success = $3, total_request_runs = $4,
            success_request_runs = $5, failed_request_runs = $6,
            runtime_variables = $7, error_message = $8, update_time = $9
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(input.run_status)
    .bind(input.is_success)
    .bind(input.total_request_runs)
    .bind(input.success_request_runs)
    .bind(input.failed_request_runs)
    .bind(input.runtime_variables)
    .bind(input.error_message)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

fn map_row(row: &PgRow) -> ScenarioRun {
    ScenarioRun {
        id: row.get("id"),
        scenario_id: row.get("scenario_id"),
        env_id: row.try_get("env_id").ok().flatten(),
        trigger_type: row.get("trigger_type"),
        run_status: row.get("run_status"),
        cancel_requested: row.get("cancel_requested"),
        total_request_runs: row.get("total_request_runs"),
        success_request_runs: row.get("success_request_runs"),
        failed_request_runs: row.get("failed_request_runs"),
        is_success: row.get("is_success"),
        runtime_variables: row.get("runtime_variables"),
        error_message: row.try_get("error_message").ok().flatten(),
        is_deleted: row.get("is_deleted"),
        create_time: row.get("create_time"),
        update_time: row.get("update_time"),
    }
}
