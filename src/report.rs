//! Report Builder (C9). Aggregates the `RequestRun` rows of one scenario run
//! into per-step and overall statistics, consulted on demand via
//! `GET /api/scenario/run/{id}/report` (spec.md §2/§6). Ports
//! `_build_scenario_run_report` from
//! `original_source/app/api/v1/routers/scenario.py` field-for-field,
//! including its rounding (`round(x, 2)` / `round(x, 4)`).

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::PgPool;

use crate::db;
use crate::models::{RequestRun, ScenarioRun, ScenarioStep};

#[derive(Debug, Serialize)]
pub struct StepReport {
    pub scenario_case_id: Option<i64>,
    pub step_no: Option<i32>,
    pub request_id: i64,
    pub dataset_run_mode: Option<String>,
    pub dataset_id: Option<i64>,
    pub run_count: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub is_success: bool,
    pub total_response_time_ms: i64,
    pub avg_response_time_ms: Option<f64>,
    pub max_response_time_ms: Option<i32>,
    pub min_response_time_ms: Option<i32>,
    pub last_run_id: Option<i64>,
    pub last_status_code: Option<i32>,
    pub last_error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FailedRun {
    pub run_id: i64,
    pub scenario_case_id: Option<i64>,
    pub step_no: Option<i32>,
    pub request_id: i64,
    pub dataset_id: Option<i64>,
    pub response_status_code: Option<i32>,
    pub response_time_ms: Option<i32>,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub scenario_id: i64,
    pub scenario_name: Option<String>,
    pub run_status: String,
    pub is_success: bool,
    pub planned_step_total: usize,
    pub executed_step_total: usize,
    pub failed_step_total: usize,
    pub total_request_runs: i32,
    pub success_request_runs: i32,
    pub failed_request_runs: i32,
    pub success_rate: f64,
    pub total_response_time_ms: i64,
    pub avg_response_time_ms: Option<f64>,
    pub max_response_time_ms: Option<i32>,
    pub min_response_time_ms: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct ScenarioRunReport {
    pub scenario_run: ScenarioRun,
    pub summary: Summary,
    pub step_reports: Vec<StepReport>,
    pub failed_runs: Vec<FailedRun>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Mutable per-step accumulator, folded over `request_runs` and flattened
/// into a `StepReport` once every run has been folded in (mirrors the
/// Python function's `step_report_map` entries, including the `_timed_count`
/// scratch field it pops before returning).
struct StepAccum {
    scenario_case_id: Option<i64>,
    step_no: Option<i32>,
    request_id: i64,
    dataset_run_mode: Option<String>,
    dataset_id: Option<i64>,
    run_count: i64,
    success_count: i64,
    failed_count: i64,
    total_response_time_ms: i64,
    timed_count: i64,
    max_response_time_ms: Option<i32>,
    min_response_time_ms: Option<i32>,
    last_run_id: Option<i64>,
    last_status_code: Option<i32>,
    last_error_message: Option<String>,
}

impl StepAccum {
    fn from_step(step: &ScenarioStep) -> Self {
        StepAccum {
            scenario_case_id: Some(step.id),
            step_no: Some(step.step_no),
            request_id: step.request_id,
            dataset_run_mode: Some(step.dataset_run_mode.clone()),
            dataset_id: step.dataset_id,
            run_count: 0,
            success_count: 0,
            failed_count: 0,
            total_response_time_ms: 0,
            timed_count: 0,
            max_response_time_ms: None,
            min_response_time_ms: None,
            last_run_id: None,
            last_status_code: None,
            last_error_message: None,
        }
    }

    fn from_orphan_run(run: &RequestRun) -> Self {
        StepAccum {
            scenario_case_id: run.scenario_case_id,
            step_no: None,
            request_id: run.request_id,
            dataset_run_mode: None,
            dataset_id: run.dataset_id,
            run_count: 0,
            success_count: 0,
            failed_count: 0,
            total_response_time_ms: 0,
            timed_count: 0,
            max_response_time_ms: None,
            min_response_time_ms: None,
            last_run_id: None,
            last_status_code: None,
            last_error_message: None,
        }
    }

    fn fold_run(&mut self, run: &RequestRun) {
        self.run_count += 1;
        if run.is_success {
            self.success_count += 1;
        } else {
            self.failed_count += 1;
        }

        if let Some(response_time_ms) = run.response_time_ms {
            self.total_response_time_ms += response_time_ms as i64;
            self.timed_count += 1;
            self.max_response_time_ms =
                Some(self.max_response_time_ms.map_or(response_time_ms, |m| m.max(response_time_ms)));
            self.min_response_time_ms =
                Some(self.min_response_time_ms.map_or(response_time_ms, |m| m.min(response_time_ms)));
        }

        if self.last_run_id.map(|last| run.id > last).unwrap_or(true) {
            self.last_run_id = Some(run.id);
            self.last_status_code = run.response_status_code;
            self.last_error_message = run.error_message.clone();
        }
    }

    fn into_report(self) -> StepReport {
        let avg_response_time_ms = if self.timed_count > 0 {
            Some(round2(self.total_response_time_ms as f64 / self.timed_count as f64))
        } else {
            None
        };
        StepReport {
            scenario_case_id: self.scenario_case_id,
            step_no: self.step_no,
            request_id: self.request_id,
            dataset_run_mode: self.dataset_run_mode,
            dataset_id: self.dataset_id,
            run_count: self.run_count,
            success_count: self.success_count,
            failed_count: self.failed_count,
            is_success: self.run_count > 0 && self.failed_count == 0,
            total_response_time_ms: self.total_response_time_ms,
            avg_response_time_ms,
            max_response_time_ms: if self.timed_count > 0 { self.max_response_time_ms } else { None },
            min_response_time_ms: if self.timed_count > 0 { self.min_response_time_ms } else { None },
            last_run_id: self.last_run_id,
            last_status_code: self.last_status_code,
            last_error_message: self.last_error_message,
        }
    }
}

/// Build the report for one scenario run. `None` if the run itself doesn't
/// exist; an existing run with zero request runs still yields a report with
/// one zero-`run_count` `StepReport` per planned (enabled, live) step.
pub async fn build(pool: &PgPool, scenario_run_id: i64) -> Result<Option<ScenarioRunReport>, sqlx::Error> {
    let Some(scenario_run) = db::scenario_runs::get(pool, scenario_run_id).await? else {
        return Ok(None);
    };

    let scenario = db::scenarios::get(pool, scenario_run.scenario_id).await?;
    let steps = db::scenario_steps::list_active_for_scenario(pool, scenario_run.scenario_id).await?;
    let request_runs = db::request_runs::list_for_scenario_run(pool, scenario_run_id).await?;

    // Synthetic keys for runs whose step has since been deleted/disabled
    // (`scenario_case_id` absent from `steps`) mirror the Python function's
    // `-int(run_obj.id or 0)` fallback so such runs still surface.
    let mut accum: BTreeMap<i64, StepAccum> = BTreeMap::new();
    for step in &steps {
        accum.insert(step.id, StepAccum::from_step(step));
    }

    for run in &request_runs {
        let key = run.scenario_case_id.unwrap_or(-run.id);
        accum.entry(key).or_insert_with(|| StepAccum::from_orphan_run(run)).fold_run(run);
    }

    let mut step_reports: Vec<StepReport> = accum.into_values().map(StepAccum::into_report).collect();
    step_reports.sort_by_key(|s| (s.step_no.unwrap_or(i32::MAX), s.scenario_case_id.unwrap_or(i64::MAX)));

    let failed_runs = request_runs
        .iter()
        .filter(|r| !r.is_success)
        .map(|r| FailedRun {
            run_id: r.id,
            scenario_case_id: r.scenario_case_id,
            step_no: step_reports
                .iter()
                .find(|s| s.scenario_case_id == r.scenario_case_id)
                .and_then(|s| s.step_no),
            request_id: r.request_id,
            dataset_id: r.dataset_id,
            response_status_code: r.response_status_code,
            response_time_ms: r.response_time_ms,
            error_message: r.error_message.clone(),
        })
        .collect();

    let total_request_runs = request_runs.len() as i32;
    let success_request_runs = request_runs.iter().filter(|r| r.is_success).count() as i32;
    let failed_request_runs = total_request_runs - success_request_runs;
    let executed_step_total = step_reports.iter().filter(|s| s.run_count > 0).count();
    let failed_step_total = step_reports.iter().filter(|s| s.failed_count > 0).count();

    let total_response_time_ms: i64 = step_reports.iter().map(|s| s.total_response_time_ms).sum();
    let total_timed_count: i64 = request_runs.iter().filter(|r| r.response_time_ms.is_some()).count() as i64;
    let max_response_time_ms = request_runs.iter().filter_map(|r| r.response_time_ms).max();
    let min_response_time_ms = request_runs.iter().filter_map(|r| r.response_time_ms).min();

    let summary = Summary {
        scenario_id: scenario_run.scenario_id,
        scenario_name: scenario.map(|s| s.name),
        run_status: scenario_run.run_status.clone(),
        is_success: scenario_run.is_success,
        planned_step_total: steps.len(),
        executed_step_total,
        failed_step_total,
        total_request_runs,
        success_request_runs,
        failed_request_runs,
        success_rate: if total_request_runs > 0 {
            round4(success_request_runs as f64 / total_request_runs as f64)
        } else {
            0.0
        },
        total_response_time_ms,
        avg_response_time_ms: if total_timed_count > 0 {
            Some(round2(total_response_time_ms as f64 / total_timed_count as f64))
        } else {
            None
        },
        max_response_time_ms,
        min_response_time_ms,
    };

    Ok(Some(ScenarioRunReport { scenario_run, summary, step_reports, failed_runs }))
}
