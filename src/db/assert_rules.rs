use serde_json::Value;
use sqlx::{postgres::PgRow, Executor, Postgres, Row};

use crate::models::AssertRule;

pub struct NewAssertRule<'a> {
    pub request_id: i64,
    pub dataset_id: Option<i64>,
    pub assert_type: &'a str,
    pub source_expr: Option<&'a str>,
    pub comparator: &'a str,
    pub expected_value: Option<&'a Value>,
    pub message: Option<&'a str>,
    pub sort: i32,
}

pub async fn insert<'c, E>(executor: E, input: NewAssertRule<'_>) -> Result<AssertRule, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO exile_api_assert_rules (
            request_id, dataset_id, assert_type, source_expr, comparator,
            expected_value, message, is_enabled, sort, is_deleted
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,TRUE,$8,0)
        RETURNING *
        "#,
    )
    .bind(input.request_id)
    .bind(input.dataset_id)
    .bind(input.assert_type)
    .bind(input.source_expr)
    .bind(input.comparator)
    .bind(input.expected_value)
    .bind(input.message)
    .bind(input.sort)
    .fetch_one(executor)
    .await?;
    Ok(map_row(&row))
}

pub async fn list_enabled_for_request<'c, E>(executor: E, request_id: i64) -> Result<Vec<AssertRule>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows = sqlx::query(
        r#"
        SELECT * FROM exile_api_assert_rules
        WHERE request_id = $1 AND is_deleted = 0 AND is_enabled = TRUE
        ORDER BY sort, id
        "#,
    )
    .bind(request_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.iter().map(map_row).collect())
}

/// Same dataset-scope filter as extract rules (spec.md §4.6/§4.5): a rule
/// with no `dataset_id` applies everywhere, a bound rule only to its dataset.
pub fn applicable_for_dataset(rules: Vec<AssertRule>, dataset_id: Option<i64>) -> Vec<AssertRule> {
    rules
        .into_iter()
        .filter(|rule| match rule.dataset_id {
            None => true,
            Some(rule_dataset_id) => Some(rule_dataset_id) == dataset_id,
        })
        .collect()
}

fn map_row(row: &PgRow) -> AssertRule {
    AssertRule {
        id: row.get("id"),
        request_id: row.get("request_id"),
        dataset_id: row.try_get("dataset_id").ok().flatten(),
        assert_type: row.get("assert_type"),
        source_expr: row.try_get("source_expr").ok().flatten(),
        comparator: row.get("comparator"),
        expected_value: row.try_get("expected_value").ok().flatten(),
        message: row.try_get("message").ok().flatten(),
        is_enabled: row.get("is_enabled"),
        sort: row.get("sort"),
        is_deleted: row.get("is_deleted"),
    }
}
