use serde_json::Value;
use sqlx::{postgres::PgRow, Executor, Postgres, Row};

use crate::models::Dataset;

pub struct NewDataset<'a> {
    pub request_id: i64,
    pub name: &'a str,
    pub variables: &'a Value,
    pub query_params: &'a Value,
    pub headers: &'a Value,
    pub cookies: &'a Value,
    pub body_type: Option<&'a str>,
    pub body_data: &'a Value,
    pub body_raw: Option<&'a str>,
    pub is_default: bool,
    pub is_enabled: bool,
    pub sort: i32,
}

pub async fn insert<'c, E>(executor: E, input: NewDataset<'_>) -> Result<Dataset, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO exile_api_request_datasets (
            request_id, name, variables, query_params, headers, cookies,
            body_type, body_data, body_raw, is_default, is_enabled, sort, is_deleted
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,0)
        RETURNING *
        "#,
    )
    .bind(input.request_id)
    .bind(input.name)
    .bind(input.variables)
    .bind(input.query_params)
    .bind(input.headers)
    .bind(input.cookies)
    .bind(input.body_type)
    .bind(input.body_data)
    .bind(input.body_raw)
    .bind(input.is_default)
    .bind(input.is_enabled)
    .bind(input.sort)
    .fetch_one(executor)
    .await?;
    Ok(map_row(&row))
}

pub async fn get<'c, E>(executor: E, id: i64) -> Result<Option<Dataset>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query("SELECT * FROM exile_api_request_datasets WHERE id = $1 AND is_deleted = 0")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|r| map_row(&r)))
}

/// Every enabled dataset for a template, ordered the way
/// `dataset_run_mode = "all"` needs them (spec.md §4.6).
pub async fn list_enabled_for_request<'c, E>(executor: E, request_id: i64) -> Result<Vec<Dataset>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query(
        r#"
        SELECT * FROM exile_api_request_datasets
        WHERE request_id = $1 AND is_deleted = 0 AND is_enabled = TRUE
        ORDER BY sort, id
        "#,
    )
    .bind(request_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.iter().map(map_row).collect())
}

fn map_row(row: &PgRow) -> Dataset {
    Dataset {
        id: row.get("id"),
        request_id: row.get("request_id"),
        name: row.get("name"),
        variables: row.get("variables"),
        query_params: row.get("query_params"),
        headers: row.get("headers"),
        cookies: row.get("cookies"),
        body_type: row.try_get("body_type").ok().flatten(),
        body_data: row.get("body_data"),
        body_raw: row.try_get("body_raw").ok().flatten(),
        is_default: row.get("is_default"),
        is_enabled: row.get("is_enabled"),
        sort: row.get("sort"),
        is_deleted: row.get("is_deleted"),
    }
}
