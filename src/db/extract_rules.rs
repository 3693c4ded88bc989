use serde_json::Value;
use sqlx::{postgres::PgRow, Executor, Postgres, Row};

use crate::models::ExtractRule;

pub struct NewExtractRule<'a> {
    pub request_id: i64,
    pub dataset_id: Option<i64>,
    pub var_name: &'a str,
    pub source_type: &'a str,
    pub source_expr: Option<&'a str>,
    pub required: bool,
    pub default_value: Option<&'a Value>,
    pub scope: &'a str,
    pub is_secret: bool,
    pub sort: i32,
}

pub async fn insert<'c, E>(executor: E, input: NewExtractRule<'_>) -> Result<ExtractRule, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO exile_api_extract_rules (
            request_id, dataset_id, var_name, source_type, source_expr,
            required, default_value, scope, is_secret, is_enabled, sort, is_deleted
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,TRUE,$10,0)
        RETURNING *
        "#,
    )
    .bind(input.request_id)
    .bind(input.dataset_id)
    .bind(input.var_name)
    .bind(input.source_type)
    .bind(input.source_expr)
    .bind(input.required)
    .bind(input.default_value)
    .bind(input.scope)
    .bind(input.is_secret)
    .bind(input.sort)
    .fetch_one(executor)
    .await?;
    Ok(map_row(&row))
}

/// Every enabled rule for a template, ordered `sort, id`. The dataset-scope
/// filter (a rule with `dataset_id = NULL` applies to every dataset; a rule
/// bound to a specific dataset only applies when that dataset is the one
/// running) is applied by the caller, mirroring `_query_extract_rules`
/// fetching all rules and filtering in application code.
pub async fn list_enabled_for_request<'c, E>(executor: E, request_id: i64) -> Result<Vec<ExtractRule>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query(
        r#"
        SELECT * FROM exile_api_extract_rules
        WHERE request_id = $1 AND is_deleted = 0 AND is_enabled = TRUE
        ORDER BY sort, id
        "#,
    )
    .bind(request_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.iter().map(map_row).collect())
}

/// Filter an already-fetched rule set down to those applicable for a
/// specific (possibly absent) dataset — ported from `_query_extract_rules`.
pub fn applicable_for_dataset(rules: Vec<ExtractRule>, dataset_id: Option<i64>) -> Vec<ExtractRule> {
    rules
        .into_iter()
        .filter(|rule| match rule.dataset_id {
            None => true,
            Some(rule_dataset_id) => Some(rule_dataset_id) == dataset_id,
        })
        .collect()
}

fn map_row(row: &PgRow) -> ExtractRule {
    ExtractRule {
        id: row.get("id"),
        request_id: row.get("request_id"),
        dataset_id: row.try_get("dataset_id").ok().flatten(),
        var_name: row.get("var_name"),
        source_type: row.get("source_type"),
        source_expr: row.try_get("source_expr").ok().flatten(),
        required: row.get("required"),
        default_value: row.try_get("default_value").ok().flatten(),
        scope: row.get("scope"),
        is_secret: row.get("is_secret"),
        is_enabled: row.get("is_enabled"),
        sort: row.get("sort"),
        is_deleted: row.get("is_deleted"),
    }
}
