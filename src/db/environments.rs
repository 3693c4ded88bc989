use chrono::Utc;
use serde_json::Value;
use sqlx::{postgres::PgRow, Executor, Postgres, Row};

use crate::models::Environment;

pub struct NewEnvironment<'a> {
    pub name: &'a str,
    pub variables: &'a Value,
    pub is_default: bool,
}

pub async fn insert<'c, E>(executor: E, input: NewEnvironment<'_>) -> Result<Environment, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO exile_api_environments (name, variables, is_default, is_deleted, create_time, update_time)
        VALUES ($1, $2, $3, 0, $4, $4)
        RETURNING id, name, variables, is_default, is_deleted, create_time, update_time
        "#,
    )
    .bind(input.name)
    .bind(input.variables)
    .bind(input.is_default)
    .bind(Utc::now())
    .fetch_one(executor)
    .await?;
    Ok(map_row(&row))
}

pub async fn get<'c, E>(executor: E, id: i64) -> Result<Option<Environment>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        SELECT id, name, variables, is_default, is_deleted, create_time, update_time
        FROM exile_api_environments
        WHERE id = $1 AND is_deleted = 0
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|r| map_row(&r)))
}

pub async fn list<'c, E>(executor: E) -> Result<Vec<Environment>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query(
        r#"
        SELECT id, name, variables, is_default, is_deleted, create_time, update_time
        FROM exile_api_environments
        WHERE is_deleted = 0
        ORDER BY id
        "#,
    )
    .fetch_all(executor)
    .await?;
    Ok(rows.iter().map(map_row).collect())
}

fn map_row(row: &PgRow) -> Environment {
    Environment {
        id: row.get("id"),
        name: row.get("name"),
        variables: row.get("variables"),
        is_default: row.get("is_default"),
        is_deleted: row.get("is_deleted"),
        create_time: row.get("create_time"),
        update_time: row.get("update_time"),
    }
}
