//! Dataset Resolver (C6). Decides which dataset(s) a step or a standalone
//! run should execute against, given the step's (or template's) own
//! `dataset_run_mode` policy (spec.md §4.6).

use crate::error::AppError;
use crate::models::{Dataset, RequestTemplate, ScenarioStep};

/// Resolve the datasets a scenario step must run against, mirroring
/// `_resolve_step_datasets` from the original implementation. `load_dataset`
/// fetches one dataset by id (404-mapped by the caller); `list_datasets`
/// returns every enabled dataset for the template ordered by `sort, id`.
pub async fn resolve_step_datasets<F, G, Fut, Gut>(
    request: &RequestTemplate,
    step: &ScenarioStep,
    load_dataset: F,
    list_datasets: G,
) -> Result<Vec<Option<Dataset>>, AppError>
where
    F: FnOnce(i64) -> Fut,
    Fut: std::future::Future<Output = Result<Option<Dataset>, AppError>>,
    G: FnOnce(i64) -> Gut,
    Gut: std::future::Future<Output = Result<Vec<Dataset>, AppError>>,
{
    match step.dataset_run_mode.as_str() {
        "single" => {
            let Some(dataset_id) = step.dataset_id else {
                return Err(AppError::InvalidState("步骤未配置固定数据集".into()));
            };
            let dataset = load_dataset(dataset_id)
                .await?
                .ok_or(AppError::NotFoundEntity)?;
            if dataset.request_id != request.id {
                return Err(AppError::InvalidState("数据集与测试用例不匹配".into()));
            }
            if !dataset.is_enabled {
                return Err(AppError::InvalidState("数据集已禁用".into()));
            }
            Ok(vec![Some(dataset)])
        }
        "all" => {
            let datasets = list_datasets(request.id).await?;
            if datasets.is_empty() {
                Ok(vec![None])
            } else {
                Ok(datasets.into_iter().map(Some).collect())
            }
        }
        _ => resolve_default_dataset(request, load_dataset).await,
    }
}

/// Resolve the dataset for a standalone "run this case" invocation, which
/// has no step — only the template's own `default_dataset_id` policy
/// applies (spec.md §4.6, the "request_default" branch generalized to the
/// template itself).
pub async fn resolve_default_dataset<F, Fut>(
    request: &RequestTemplate,
    load_dataset: F,
) -> Result<Vec<Option<Dataset>>, AppError>
where
    F: FnOnce(i64) -> Fut,
    Fut: std::future::Future<Output = Result<Option<Dataset>, AppError>>,
{
    let Some(dataset_id) = request.default_dataset_id else {
        return Ok(vec![None]);
    };
    let dataset = load_dataset(dataset_id)
        .await?
        .ok_or(AppError::NotFoundEntity)?;
    if dataset.request_id != request.id {
        return Err(AppError::InvalidState("默认数据集与测试用例不匹配".into()));
    }
    if !dataset.is_enabled {
        return Err(AppError::InvalidState("默认数据集已禁用".into()));
    }
    Ok(vec![Some(dataset)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(default_dataset_id: Option<i64>) -> RequestTemplate {
        RequestTemplate {
            id: 1,
            env_id: None,
            name: "t".into(),
            method: "GET".into(),
            url: "http://h".into(),
            base_query_params: json!({}),
            base_headers: json!({}),
            base_cookies: json!({}),
            body_type: "none".into(),
            base_body_data: json!({}),
            base_body_raw: None,
            timeout_ms: 5000,
            follow_redirects: true,
            verify_ssl: true,
            proxy_url: None,
            dataset_run_mode: "all".into(),
            default_dataset_id,
            execute_count: 0,
            is_deleted: 0,
            create_time: chrono::Utc::now(),
            update_time: chrono::Utc::now(),
        }
    }

    fn step(dataset_run_mode: &str, dataset_id: Option<i64>) -> ScenarioStep {
        ScenarioStep {
            id: 1,
            scenario_id: 1,
            request_id: 1,
            step_no: 1,
            dataset_id,
            dataset_run_mode: dataset_run_mode.into(),
            is_enabled: true,
            stop_on_fail: false,
            is_deleted: 0,
        }
    }

    fn dataset(id: i64, request_id: i64, is_enabled: bool) -> Dataset {
        Dataset {
            id,
            request_id,
            name: "d".into(),
            variables: json!({}),
            query_params: json!({}),
            headers: json!({}),
            cookies: json!({}),
            body_type: None,
            body_data: json!({}),
            body_raw: None,
            is_default: false,
            is_enabled,
            sort: 0,
            is_deleted: 0,
        }
    }

    #[tokio::test]
    async fn single_mode_requires_a_configured_dataset_id() {
        let request = request(None);
        let step = step("single", None);
        let result = resolve_step_datasets(
            &request,
            &step,
            |_| async { Ok(None) },
            |_| async { Ok(vec![]) },
        )
        .await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn single_mode_rejects_dataset_from_another_template() {
        let request = request(None);
        let step = step("single", Some(9));
        let result = resolve_step_datasets(
            &request,
            &step,
            |_| async { Ok(Some(dataset(9, 2, true))) },
            |_| async { Ok(vec![]) },
        )
        .await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn all_mode_with_no_enabled_datasets_yields_a_single_none_run() {
        let request = request(None);
        let step = step("all", None);
        let result = resolve_step_datasets(
            &request,
            &step,
            |_| async { Ok(None) },
            |_| async { Ok(vec![]) },
        )
        .await
        .unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0].is_none());
    }

    #[tokio::test]
    async fn all_mode_returns_every_enabled_dataset() {
        let request = request(None);
        let step = step("all", None);
        let result = resolve_step_datasets(
            &request,
            &step,
            |_| async { Ok(None) },
            |_| async { Ok(vec![dataset(1, 1, true), dataset(2, 1, true)]) },
        )
        .await
        .unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn request_default_mode_falls_back_to_none_without_a_default() {
        let request = request(None);
        let step = step("request_default", None);
        let result = resolve_step_datasets(
            &request,
            &step,
            |_| async { Ok(None) },
            |_| async { Ok(vec![]) },
        )
        .await
        .unwrap();
        assert_eq!(result, vec![None]);
    }

    #[tokio::test]
    async fn standalone_run_uses_the_templates_default_dataset() {
        let request = request(Some(5));
        let result = resolve_default_dataset(&request, |id| async move { Ok(Some(dataset(id, 1, true))) })
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].as_ref().unwrap().id, 5);
    }
}
