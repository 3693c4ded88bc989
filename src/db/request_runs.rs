use serde_json::Value;
use sqlx::{postgres::PgRow, Executor, PgPool, Postgres, Row};

use crate::models::RequestRun;

pub struct NewRequestRun<'a> {
    pub request_id: i64,
    pub scenario_run_id: Option<i64>,
    pub scenario_id: Option<i64>,
    pub scenario_case_id: Option<i64>,
    pub dataset_id: Option<i64>,
    pub dataset_snapshot: &'a Value,
    pub request_snapshot: &'a Value,
    pub response_status_code: Option<i32>,
    pub response_headers: &'a Value,
    pub response_body: Option<&'a str>,
    pub response_time_ms: Option<i32>,
    pub is_success: bool,
    pub error_message: Option<&'a str>,
}

pub async fn insert<'c, E>(executor: E, input: NewRequestRun<'_>) -> Result<RequestRun, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO exile_api_request_runs (
            request_id, scenario_run_id, scenario_id, scenario_case_id, dataset_id,
            dataset_snapshot, request_snapshot, response_status_code, response_headers,
            response_body, response_time_ms, is_success, error_message
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
        RETURNING *
        "#,
    )
    .bind(input.request_id)
    .bind(input.scenario_run_id)
    .bind(input.scenario_id)
    .bind(input.scenario_case_id)
    .bind(input.dataset_id)
    .bind(input.dataset_snapshot)
    .bind(input.request_snapshot)
    .bind(input.response_status_code)
    .bind(input.response_headers)
    .bind(input.response_body)
    .bind(input.response_time_ms)
    .bind(input.is_success)
    .bind(input.error_message)
    .fetch_one(executor)
    .await?;
    Ok(map_row(&row))
}

pub async fn update_success_and_error(
    pool: &PgPool,
    id: i64,
    is_success: bool,
    error_message: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE exile_api_request_runs SET is_success = $2, error_message = $3 WHERE id = $1")
        .bind(id)
        .bind(is_success)
        .bind(error_message)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list_for_scenario_run<'c, E>(executor: E, scenario_run_id: i64) -> Result<Vec<RequestRun>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query(
        r#"
        SELECT * FROM exile_api_request_runs
        WHERE scenario_run_id = $1
        ORDER BY id
        "#,
    )
    .bind(scenario_run_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.iter().map(map_row).collect())
}

fn map_row(row: &PgRow) -> RequestRun {
    RequestRun {
        id: row.get("id"),
        request_id: row.get("request_id"),
        scenario_run_id: row.try_get("scenario_run_id").ok().flatten(),
        scenario_id: row.try_get("scenario_id").ok().flatten(),
        scenario_case_id: row.try_get("scenario_case_id").ok().flatten(),
        dataset_id: row.try_get("dataset_id").ok().flatten(),
        dataset_snapshot: row.get("dataset_snapshot"),
        request_snapshot: row.get("request_snapshot"),
        response_status_code: row.try_get("response_status_code").ok().flatten(),
        response_headers: row.get("response_headers"),
        response_body: row.try_get("response_body").ok().flatten(),
        response_time_ms: row.try_get("response_time_ms").ok().flatten(),
        is_success: row.get("is_success"),
        error_message: row.try_get("error_message").ok().flatten(),
    }
}
