use sqlx::{Executor, Postgres};

use crate::variable_extraction::ExtractRecord;

pub struct NewRunVariable<'a> {
    pub scenario_run_id: Option<i64>,
    pub request_run_id: i64,
    pub scenario_case_id: Option<i64>,
    pub request_id: i64,
    pub dataset_id: Option<i64>,
    pub record: &'a ExtractRecord,
}

pub async fn insert<'c, E>(executor: E, input: NewRunVariable<'_>) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO exile_api_run_variables (
            scenario_run_id, request_run_id, scenario_case_id, request_id, dataset_id,
            var_name, var_value, value_type, source_type, source_expr, scope, is_secret
        )
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
        "#,
    )
    .bind(input.scenario_run_id)
    .bind(input.request_run_id)
    .bind(input.scenario_case_id)
    .bind(input.request_id)
    .bind(input.dataset_id)
    .bind(&input.record.var_name)
    .bind(&input.record.var_value)
    .bind(&input.record.value_type)
    .bind(&input.record.source_type)
    .bind(&input.record.source_expr)
    .bind(&input.record.scope)
    .bind(input.record.is_secret)
    .execute(executor)
    .await?;
    Ok(())
}
