use chrono::Utc;
use serde_json::Value;
use sqlx::{postgres::PgRow, Executor, Postgres, Row};

use crate::models::RequestTemplate;

pub struct NewRequestTemplate<'a> {
    pub env_id: Option<i64>,
    pub name: &'a str,
    pub method: &'a str,
    pub url: &'a str,
    pub base_query_params: &'a Value,
    pub base_headers: &'a Value,
    pub base_cookies: &'a Value,
    pub body_type: &'a str,
    pub base_body_data: &'a Value,
    pub base_body_raw: Option<&'a str>,
    pub timeout_ms: i32,
    pub follow_redirects: bool,
    pub verify_ssl: bool,
    pub proxy_url: Option<&'a str>,
    pub dataset_run_mode: &'a str,
    pub default_dataset_id: Option<i64>,
}

pub async fn insert<'c, E>(executor: E, input: NewRequestTemplate<'_>) -> Result<RequestTemplate, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let now = Utc::now();
    let row = sqlx::query(
        r#"
        INSERT INTO exile_api_requests (
            env_id, name, method, url, base_query_params, base_headers, base_cookies,
            body_type, base_body_data, base_body_raw, timeout_ms, follow_redirects, verify_ssl,
            proxy_url, dataset_run_mode, default_dataset_id, execute_count, is_deleted,
            create_time, update_time
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,0,0,$17,$17)
        RETURNING *
        "#,
    )
    .bind(input.env_id)
    .bind(input.name)
    .bind(input.method)
    .bind(input.url)
    .bind(input.base_query_params)
    .bind(input.base_headers)
    .bind(input.base_cookies)
    .bind(input.body_type)
    .bind(input.base_body_data)
    .bind(input.base_body_raw)
    .bind(input.timeout_ms)
    .bind(input.follow_redirects)
    .bind(input.verify_ssl)
    .bind(input.proxy_url)
    .bind(input.dataset_run_mode)
    .bind(input.default_dataset_id)
    .bind(now)
    .fetch_one(executor)
    .await?;
    Ok(map_row(&row))
}

pub async fn get<'c, E>(executor: E, id: i64) -> Result<Option<RequestTemplate>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query("SELECT * FROM exile_api_requests WHERE id = $1 AND is_deleted = 0")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|r| map_row(&r)))
}

pub async fn list<'c, E>(executor: E) -> Result<Vec<RequestTemplate>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query("SELECT * FROM exile_api_requests WHERE is_deleted = 0 ORDER BY sort, id")
        .fetch_all(executor)
        .await?;
    Ok(rows.iter().map(map_row).collect())
}

pub async fn increment_execute_count<'c, E>(executor: E, id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "UPDATE exile_api_requests SET execute_count = execute_count + 1, update_time = $2 WHERE id = $1",
    )
    .bind(id)
    .bind(Utc::now())
    .execute(executor)
    .await?;
    Ok(())
}

fn map_row(row: &PgRow) -> RequestTemplate {
    RequestTemplate {
        id: row.get("id"),
        env_id: row.try_get("env_id").ok().flatten(),
        name: row.get("name"),
        method: row.get("method"),
        url: row.get("url"),
        base_query_params: row.get("base_query_params"),
        base_headers: row.get("base_headers"),
        base_cookies: row.get("base_cookies"),
        body_type: row.get("body_type"),
        base_body_data: row.get("base_body_data"),
        base_body_raw: row.try_get("base_body_raw").ok().flatten(),
        timeout_ms: row.get("timeout_ms"),
        follow_redirects: row.get("follow_redirects"),
        verify_ssl: row.get("verify_ssl"),
        proxy_url: row.try_get("proxy_url").ok().flatten(),
        dataset_run_mode: row.get("dataset_run_mode"),
        default_dataset_id: row.try_get("default_dataset_id").ok().flatten(),
        execute_count: row.get("execute_count"),
        is_deleted: row.get("is_deleted"),
        create_time: row.get("create_time"),
        update_time: row.get("update_time"),
    }
}
