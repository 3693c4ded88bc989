use sqlx::{postgres::PgRow, Executor, PgPool, Postgres, Row};

use crate::models::ScenarioStep;

pub struct NewScenarioStep<'a> {
    pub scenario_id: i64,
    pub request_id: i64,
    pub step_no: i32,
    pub dataset_id: Option<i64>,
    pub dataset_run_mode: &'a str,
    pub is_enabled: bool,
    pub stop_on_fail: bool,
}

pub async fn insert<'c, E>(executor: E, input: NewScenarioStep<'_>) -> Result<ScenarioStep, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO exile_test_scenario_cases (
            scenario_id, request_id, step_no, dataset_id, dataset_run_mode,
            is_enabled, stop_on_fail, is_deleted
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,0)
        RETURNING *
        "#,
    )
    .bind(input.scenario_id)
    .bind(input.request_id)
    .bind(input.step_no)
    .bind(input.dataset_id)
    .bind(input.dataset_run_mode)
    .bind(input.is_enabled)
    .bind(input.stop_on_fail)
    .fetch_one(executor)
    .await?;
    Ok(map_row(&row))
}

pub async fn get<'c, E>(executor: E, id: i64) -> Result<Option<ScenarioStep>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query("SELECT * FROM exile_test_scenario_cases WHERE id = $1 AND is_deleted = 0")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|r| map_row(&r)))
}

/// Enabled, live steps for a scenario run, ordered `step_no, id` — the
/// iteration order the orchestrator executes in (spec.md §4.7).
pub async fn list_active_for_scenario<'c, E>(executor: E, scenario_id: i64) -> Result<Vec<ScenarioStep>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query(
        r#"
        SELECT * FROM exile_test_scenario_cases
        WHERE scenario_id = $1 AND is_deleted = 0 AND is_enabled = TRUE
        ORDER BY step_no, id
        "#,
    )
    .bind(scenario_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.iter().map(map_row).collect())
}

/// Every live step of a scenario, enabled or not, for the CRUD listing view
/// (the orchestrator only ever sees `list_active_for_scenario`).
pub async fn list_for_scenario<'c, E>(executor: E, scenario_id: i64) -> Result<Vec<ScenarioStep>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query(
        r#"
        SELECT * FROM exile_test_scenario_cases
        WHERE scenario_id = $1 AND is_deleted = 0
        ORDER BY step_no, id
        "#,
    )
    .bind(scenario_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.iter().map(map_row).collect())
}

/// Apply a client-supplied step order: `ordered_ids[i]` becomes step `i+1`.
/// Ids outside this scenario are ignored by the `WHERE scenario_id = ...`
/// guard rather than rejected, matching `normalize_step_numbers`'s leniency.
pub async fn reorder(pool: &PgPool, scenario_id: i64, ordered_ids: &[i64]) -> Result<(), sqlx::Error> {
    for (index, id) in ordered_ids.iter().enumerate() {
        sqlx::query("UPDATE exile_test_scenario_cases SET step_no = $3 WHERE id = $1 AND scenario_id = $2")
            .bind(id)
            .bind(scenario_id)
            .bind(index as i32 + 1)
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Renumber every live step of a scenario to contiguous `1..N` in their
/// current `step_no, id` order, preserving the invariant from spec.md §3
/// that `step_no` has no gaps or duplicates after a reorder/delete.
pub async fn normalize_step_numbers(pool: &PgPool, scenario_id: i64) -> Result<(), sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id FROM exile_test_scenario_cases
        WHERE scenario_id = $1 AND is_deleted = 0
        ORDER BY step_no, id
        "#,
    )
    .bind(scenario_id)
    .fetch_all(pool)
    .await?;

    for (index, row) in rows.iter().enumerate() {
        let id: i64 = row.get("id");
        sqlx::query("UPDATE exile_test_scenario_cases SET step_no = $2 WHERE id = $1")
            .bind(id)
            .bind(index as i32 + 1)
            .execute(pool)
            .await?;
    }
    Ok(())
}

fn map_row(row: &PgRow) -> ScenarioStep {
    ScenarioStep {
        id: row.get("id"),
        scenario_id: row.get("scenario_id"),
        request_id: row.get("request_id"),
        step_no: row.get("step_no"),
        dataset_id: row.try_get("dataset_id").ok().flatten(),
        dataset_run_mode: row.get("dataset_run_mode"),
        is_enabled: row.get("is_enabled"),
        stop_on_fail: row.get("stop_on_fail"),
        is_deleted: row.get("is_deleted"),
    }
}
