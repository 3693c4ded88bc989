//! Scenario Orchestrator (C7). Drives one claimed `ScenarioRun`: iterates its
//! enabled steps in order, resolves datasets per step (C6), executes each
//! (step, dataset) pair (C3), applies assertions (C5) and extraction (C4),
//! persists `RequestRun`/`RunVariable` rows, enforces stop-on-fail and
//! cooperative cancellation, and finalizes the run (spec.md §4.7).

use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::assertion::evaluate_assert_rules;
use crate::db;
use crate::execution::execute_api_request;
use crate::models::{Dataset, RequestTemplate, RunStatus, Scenario, ScenarioStep};
use crate::variable_extraction::apply_extract_rules;

/// Everything the orchestrator needs besides the `ScenarioRun` row itself.
/// Loaded once up front; `run` borrows it for the whole procedure.
pub struct RunContext {
    pub pool: PgPool,
    pub scenario_run_id: i64,
}

struct Counters {
    total: i32,
    success: i32,
    failed: i32,
}

impl Counters {
    fn new() -> Self {
        Counters { total: 0, success: 0, failed: 0 }
    }

    fn record(&mut self, is_success: bool) {
        self.total += 1;
        if is_success {
            self.success += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Outcome of driving a scenario run to completion. `run()` never returns
/// `Err` for anything the spec models as a captured error (spec.md §7
/// orchestrator-fatal); an escaping DB error is the only `Err` case, and the
/// caller (C8) is responsible for marking the run failed in that case too.
pub async fn run(ctx: &RunContext, scenario: &Scenario) -> Result<(), sqlx::Error> {
    let pool = &ctx.pool;
    let run_id = ctx.scenario_run_id;

    let scenario_run = match db::scenario_runs::get(pool, run_id).await? {
        Some(run) => run,
        None => return Ok(()),
    };

    let environment = match scenario_run.env_id.or(scenario.env_id) {
        Some(env_id) => db::environments::get(pool, env_id).await?,
        None => None,
    };

    let mut runtime_variables: Map<String, Value> = scenario_run
        .runtime_variables
        .as_object()
        .cloned()
        .unwrap_or_default();

    let steps = db::scenario_steps::list_active_for_scenario(pool, scenario.id).await?;

    let mut counters = Counters::new();
    let mut stop_message: Option<String> = None;
    let mut canceled = false;

    'steps: for step in &steps {
        let current = db::scenario_runs::get(pool, run_id).await?;
        if current.map(|r| r.cancel_requested).unwrap_or(false) {
            canceled = true;
            break;
        }

        let Some(request) = db::requests::get(pool, step.request_id).await? else {
            continue;
        };

        let datasets = match resolve_datasets_for_step(pool, &request, step).await? {
            Ok(datasets) => datasets,
            Err(message) => {
                stop_message = Some(message);
                break;
            }
        };

        for dataset in datasets {
            let execute_result =
                execute_api_request(&request, dataset.as_ref(), environment.as_ref(), &runtime_variables).await;

            db::requests::increment_execute_count(pool, request.id).await?;

            let request_run = db::request_runs::insert(
                pool,
                db::request_runs::NewRequestRun {
                    request_id: request.id,
                    scenario_run_id: Some(run_id),
                    scenario_id: Some(scenario.id),
                    scenario_case_id: Some(step.id),
                    dataset_id: dataset.as_ref().map(|d| d.id),
                    dataset_snapshot: &execute_result.dataset_snapshot,
                    request_snapshot: &execute_result.request_snapshot,
                    response_status_code: execute_result.response_status_code,
                    response_headers: &execute_result.response_headers,
                    response_body: execute_result.response_body.as_deref(),
                    response_time_ms: Some(execute_result.response_time_ms),
                    is_success: execute_result.is_success,
                    error_message: execute_result.error_message.as_deref(),
                },
            )
            .await?;

            let mut is_success = execute_result.is_success;
            let mut error_message = execute_result.error_message.clone();

            let assert_rules = db::assert_rules::applicable_for_dataset(
                db::assert_rules::list_enabled_for_request(pool, request.id).await?,
                dataset.as_ref().map(|d| d.id),
            );
            let (assertions_passed, assert_records) = evaluate_assert_rules(&assert_rules, &execute_result);
            if !assertions_passed {
                is_success = false;
                if let Some(first_failure) = assert_records.iter().find(|r| !r.passed) {
                    error_message = Some(prepend(&first_failure.detail, error_message.as_deref()));
                }
            }

            let extract_rules = db::extract_rules::applicable_for_dataset(
                db::extract_rules::list_enabled_for_request(pool, request.id).await?,
                dataset.as_ref().map(|d| d.id),
            );
            match apply_extract_rules(&extract_rules, &execute_result, &runtime_variables) {
                Ok((_, records)) => {
                    for record in &records {
                        db::run_variables::insert(
                            pool,
                            db::run_variables::NewRunVariable {
                                scenario_run_id: Some(run_id),
                                request_run_id: request_run.id,
                                scenario_case_id: Some(step.id),
                                request_id: request.id,
                                dataset_id: dataset.as_ref().map(|d| d.id),
                                record,
                            },
                        )
                        .await?;
                        if crate::models::VariableScope::parse(&record.scope).promotes_to_runtime() {
                            runtime_variables.insert(record.var_name.clone(), record.var_value.clone());
                        }
                    }
                }
                Err(required_error) => {
                    is_success = false;
                    error_message = Some(prepend(&required_error.to_string(), error_message.as_deref()));
                }
            }

            if is_success != execute_result.is_success || error_message != execute_result.error_message {
                db::request_runs::update_success_and_error(pool, request_run.id, is_success, error_message.as_deref())
                    .await?;
            }

            counters.record(is_success);

            if !is_success && (step.stop_on_fail || scenario.stop_on_fail) {
                stop_message = Some(format!(
                    "步骤 {} (用例 {}, 数据集 {}) 执行失败，已停止后续步骤",
                    step.step_no,
                    step.request_id,
                    dataset.as_ref().map(|d| d.id.to_string()).unwrap_or_else(|| "无".into())
                ));
                break 'steps;
            }
        }
    }

    let run_status = if canceled {
        RunStatus::Canceled
    } else if counters.failed == 0 {
        RunStatus::Success
    } else {
        RunStatus::Failed
    };

    let error_message = if let Some(message) = &stop_message {
        Some(message.clone())
    } else if canceled {
        Some("scenario run canceled".to_string())
    } else {
        None
    };

    db::scenario_runs::finalize(
        pool,
        run_id,
        db::scenario_runs::FinalizeScenarioRun {
            run_status: run_status.as_str(),
            is_success: counters.failed == 0 && !canceled,
            total_request_runs: counters.total,
            success_request_runs: counters.success,
            failed_request_runs: counters.failed,
            runtime_variables: &Value::Object(runtime_variables),
            error_message: error_message.as_deref(),
        },
    )
    .await?;

    Ok(())
}

fn prepend(message: &str, existing: Option<&str>) -> String {
    match existing {
        Some(existing) if !existing.is_empty() => format!("{message}; {existing}"),
        _ => message.to_string(),
    }
}

/// Resolve datasets for one step via C6, translating its `AppError`s into a
/// stop message so the orchestrator can record *why* the step was skipped
/// without the whole run loop needing to propagate `AppError` (spec.md §4.6
/// errors are scoped to the step that produced them).
async fn resolve_datasets_for_step(
    pool: &PgPool,
    request: &RequestTemplate,
    step: &ScenarioStep,
) -> Result<Result<Vec<Option<Dataset>>, String>, sqlx::Error> {
    let result = crate::dataset_resolver::resolve_step_datasets(
        request,
        step,
        |id| async move { db::datasets::get(pool, id).await.map_err(crate::error::AppError::from) },
        |request_id| async move {
            db::datasets::list_enabled_for_request(pool, request_id)
                .await
                .map_err(crate::error::AppError::from)
        },
    )
    .await;

    match result {
        Ok(datasets) => Ok(Ok(datasets)),
        Err(crate::error::AppError::Db(err)) => Err(err),
        Err(other) => Ok(Err(format!(
            "步骤 {} 数据集解析失败: {}",
            step.step_no, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_total_success_failed() {
        let mut counters = Counters::new();
        counters.record(true);
        counters.record(false);
        counters.record(true);
        assert_eq!(counters.total, 3);
        assert_eq!(counters.success, 2);
        assert_eq!(counters.failed, 1);
    }

    #[test]
    fn prepend_joins_with_separator_when_both_present() {
        assert_eq!(prepend("a", Some("b")), "a; b");
        assert_eq!(prepend("a", None), "a");
        assert_eq!(prepend("a", Some("")), "a");
    }
}
