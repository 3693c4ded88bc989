use sqlx::{postgres::PgRow, Executor, Postgres, Row};

use crate::models::Scenario;

pub struct NewScenario<'a> {
    pub name: &'a str,
    pub env_id: Option<i64>,
    pub run_mode: &'a str,
    pub stop_on_fail: bool,
    pub sort: i32,
}

pub async fn insert<'c, E>(executor: E, input: NewScenario<'_>) -> Result<Scenario, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO exile_test_scenarios (name, env_id, run_mode, stop_on_fail, sort, is_deleted)
        VALUES ($1,$2,$3,$4,$5,0)
        RETURNING *
        "#,
    )
    .bind(input.name)
    .bind(input.env_id)
    .bind(input.run_mode)
    .bind(input.stop_on_fail)
    .bind(input.sort)
    .fetch_one(executor)
    .await?;
    Ok(map_row(&row))
}

pub async fn get<'c, E>(executor: E, id: i64) -> Result<Option<Scenario>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query("SELECT * FROM exile_test_scenarios WHERE id = $1 AND is_deleted = 0")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|r| map_row(&r)))
}

pub async fn list<'c, E>(executor: E) -> Result<Vec<Scenario>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query("SELECT * FROM exile_test_scenarios WHERE is_deleted = 0 ORDER BY sort, id")
        .fetch_all(executor)
        .await?;
    Ok(rows.iter().map(map_row).collect())
}

fn map_row(row: &PgRow) -> Scenario {
    Scenario {
        id: row.get("id"),
        name: row.get("name"),
        env_id: row.try_get("env_id").ok().flatten(),
        run_mode: row.get("run_mode"),
        stop_on_fail: row.get("stop_on_fail"),
        sort: row.get("sort"),
        is_deleted: row.get("is_deleted"),
    }
}
