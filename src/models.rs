use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP method carried by a `RequestTemplate`. `method` is stored as text in
/// the database; this enum gives call sites a closed set to match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Case-insensitive parse defaulting to GET, matching the original's
    /// `(request_obj.method or "GET").upper()`.
    pub fn parse_or_default(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "DELETE" => HttpMethod::Delete,
            "PATCH" => HttpMethod::Patch,
            "HEAD" => HttpMethod::Head,
            "OPTIONS" => HttpMethod::Options,
            _ => HttpMethod::Get,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyType {
    None,
    Json,
    FormUrlencoded,
    FormData,
    Raw,
    Binary,
}

impl BodyType {
    pub fn as_str(self) -> &'static str {
        match self {
            BodyType::None => "none",
            BodyType::Json => "json",
            BodyType::FormUrlencoded => "form-urlencoded",
            BodyType::FormData => "form-data",
            BodyType::Raw => "raw",
            BodyType::Binary => "binary",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "json" => BodyType::Json,
            "form-urlencoded" => BodyType::FormUrlencoded,
            "form-data" => BodyType::FormData,
            "raw" => BodyType::Raw,
            "binary" => BodyType::Binary,
            _ => BodyType::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetRunMode {
    Single,
    All,
}

impl DatasetRunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetRunMode::Single => "single",
            DatasetRunMode::All => "all",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "single" => DatasetRunMode::Single,
            _ => DatasetRunMode::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDatasetRunMode {
    RequestDefault,
    Single,
    All,
}

impl StepDatasetRunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StepDatasetRunMode::RequestDefault => "request_default",
            StepDatasetRunMode::Single => "single",
            StepDatasetRunMode::All => "all",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "single" => StepDatasetRunMode::Single,
            "all" => StepDatasetRunMode::All,
            _ => StepDatasetRunMode::RequestDefault,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioRunMode {
    Sequence,
    Parallel,
}

impl ScenarioRunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ScenarioRunMode::Sequence => "sequence",
            ScenarioRunMode::Parallel => "parallel",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "parallel" => ScenarioRunMode::Parallel,
            _ => ScenarioRunMode::Sequence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Schedule,
}

impl TriggerType {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::Schedule => "schedule",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "schedule" => TriggerType::Schedule,
            _ => TriggerType::Manual,
        }
    }
}

/// `ScenarioRun.run_status`. Transitions are enforced by `orchestrator.rs`
/// and `job_queue.rs`, never written ad hoc elsewhere (spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Success,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Canceled => "canceled",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "running" => RunStatus::Running,
            "success" => RunStatus::Success,
            "failed" => RunStatus::Failed,
            "canceled" => RunStatus::Canceled,
            _ => RunStatus::Queued,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failed | RunStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractSourceType {
    ResponseHeader,
    ResponseJson,
    ResponseCookie,
    ResponseTextRegex,
    ResponseStatus,
    Session,
}

impl ExtractSourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractSourceType::ResponseHeader => "response_header",
            ExtractSourceType::ResponseJson => "response_json",
            ExtractSourceType::ResponseCookie => "response_cookie",
            ExtractSourceType::ResponseTextRegex => "response_text_regex",
            ExtractSourceType::ResponseStatus => "response_status",
            ExtractSourceType::Session => "session",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "response_header" => ExtractSourceType::ResponseHeader,
            "response_json" => ExtractSourceType::ResponseJson,
            "response_cookie" => ExtractSourceType::ResponseCookie,
            "response_text_regex" => ExtractSourceType::ResponseTextRegex,
            "response_status" => ExtractSourceType::ResponseStatus,
            "session" => ExtractSourceType::Session,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableScope {
    Step,
    Scenario,
    Global,
}

impl VariableScope {
    pub fn as_str(self) -> &'static str {
        match self {
            VariableScope::Step => "step",
            VariableScope::Scenario => "scenario",
            VariableScope::Global => "global",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "global" => VariableScope::Global,
            "step" => VariableScope::Step,
            _ => VariableScope::Scenario,
        }
    }

    /// scope=scenario|global are promoted into the run-wide runtime map;
    /// scope=step is recorded but not promoted (spec.md §4.4/§4.7).
    pub fn promotes_to_runtime(self) -> bool {
        matches!(self, VariableScope::Scenario | VariableScope::Global)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertType {
    StatusCode,
    JsonPath,
    TextContains,
}

impl AssertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AssertType::StatusCode => "status_code",
            AssertType::JsonPath => "json_path",
            AssertType::TextContains => "text_contains",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "status_code" => AssertType::StatusCode,
            "json_path" => AssertType::JsonPath,
            "text_contains" => AssertType::TextContains,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Eq,
    Ne,
    Contains,
    NotContains,
}

impl Comparator {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Eq => "eq",
            Comparator::Ne => "ne",
            Comparator::Contains => "contains",
            Comparator::NotContains => "not_contains",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "ne" => Comparator::Ne,
            "contains" => Comparator::Contains,
            "not_contains" => Comparator::NotContains,
            _ => Comparator::Eq,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: i64,
    pub name: String,
    pub variables: Value,
    pub is_default: bool,
    pub is_deleted: i64,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTemplate {
    pub id: i64,
    pub env_id: Option<i64>,
    pub name: String,
    pub method: String,
    pub url: String,
    pub base_query_params: Value,
    pub base_headers: Value,
    pub base_cookies: Value,
    pub body_type: String,
    pub base_body_data: Value,
    pub base_body_raw: Option<String>,
    pub timeout_ms: i32,
    pub follow_redirects: bool,
    pub verify_ssl: bool,
    pub proxy_url: Option<String>,
    pub dataset_run_mode: String,
    pub default_dataset_id: Option<i64>,
    pub execute_count: i32,
    pub is_deleted: i64,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: i64,
    pub request_id: i64,
    pub name: String,
    pub variables: Value,
    pub query_params: Value,
    pub headers: Value,
    pub cookies: Value,
    pub body_type: Option<String>,
    pub body_data: Value,
    pub body_raw: Option<String>,
    pub is_default: bool,
    pub is_enabled: bool,
    pub sort: i32,
    pub is_deleted: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: i64,
    pub name: String,
    pub env_id: Option<i64>,
    pub run_mode: String,
    pub stop_on_fail: bool,
    pub sort: i32,
    pub is_deleted: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub id: i64,
    pub scenario_id: i64,
    pub request_id: i64,
    pub step_no: i32,
    pub dataset_id: Option<i64>,
    pub dataset_run_mode: String,
    pub is_enabled: bool,
    pub stop_on_fail: bool,
    pub is_deleted: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub id: i64,
    pub scenario_id: i64,
    pub env_id: Option<i64>,
    pub trigger_type: String,
    pub run_status: String,
    pub cancel_requested: bool,
    pub total_request_runs: i32,
    pub success_request_runs: i32,
    pub failed_request_runs: i32,
    pub is_success: bool,
    pub runtime_variables: Value,
    pub error_message: Option<String>,
    pub is_deleted: i64,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRun {
    pub id: i64,
    pub request_id: i64,
    pub scenario_run_id: Option<i64>,
    pub scenario_id: Option<i64>,
    pub scenario_case_id: Option<i64>,
    pub dataset_id: Option<i64>,
    pub dataset_snapshot: Value,
    pub request_snapshot: Value,
    pub response_status_code: Option<i32>,
    pub response_headers: Value,
    pub response_body: Option<String>,
    pub response_time_ms: Option<i32>,
    pub is_success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRule {
    pub id: i64,
    pub request_id: i64,
    pub dataset_id: Option<i64>,
    pub var_name: String,
    pub source_type: String,
    pub source_expr: Option<String>,
    pub required: bool,
    pub default_value: Option<Value>,
    pub scope: String,
    pub is_secret: bool,
    pub is_enabled: bool,
    pub sort: i32,
    pub is_deleted: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertRule {
    pub id: i64,
    pub request_id: i64,
    pub dataset_id: Option<i64>,
    pub assert_type: String,
    pub source_expr: Option<String>,
    pub comparator: String,
    pub expected_value: Option<Value>,
    pub message: Option<String>,
    pub is_enabled: bool,
    pub sort: i32,
    pub is_deleted: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunVariable {
    pub id: i64,
    pub scenario_run_id: Option<i64>,
    pub request_run_id: i64,
    pub scenario_case_id: Option<i64>,
    pub request_id: i64,
    pub dataset_id: Option<i64>,
    pub var_name: String,
    pub var_value: Option<Value>,
    pub value_type: String,
    pub source_type: String,
    pub source_expr: Option<String>,
    pub scope: String,
    pub is_secret: bool,
}
