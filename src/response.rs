//! Unified `{code, message, data}` response envelope (spec.md §6). Not
//! present in any teacher module — the envelope shape is inferred from its
//! call sites in `original_source/app/api/v1/routers/scenario.py`
//! (`api_response(http_code=..., code=..., message=..., data=...)`), where
//! `code` is a business code distinct from the HTTP status and only a few
//! call sites override the HTTP status at all.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub code: i32,
    pub message: String,
    pub data: Value,
}

/// `code=200, message="success"`, HTTP 200 — the default success shape.
pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    with_status(StatusCode::OK, 200, "success", data_to_value(data))
}

/// `code=201, message="success"`, HTTP 201 — used by every create endpoint.
pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    with_status(StatusCode::CREATED, 201, "success", data_to_value(data))
}

/// `code=202, message="success"`, HTTP 202 — used by `POST /api/scenario/run`.
pub fn accepted<T: Serialize>(data: T) -> impl IntoResponse {
    with_status(StatusCode::ACCEPTED, 202, "success", data_to_value(data))
}

/// `code=204, message="success"`, HTTP 200 — the original repo's soft-delete
/// acknowledgement keeps HTTP 200 and signals "no content" through the
/// business code alone.
pub fn no_content() -> impl IntoResponse {
    with_status(StatusCode::OK, 204, "success", Value::Null)
}

/// A business-level failure communicated through `code`/`message` with the
/// HTTP status left at 200, e.g. "current state cannot be canceled" (10005).
pub fn business_error(code: i32, message: impl Into<String>) -> impl IntoResponse {
    with_status(StatusCode::OK, code, message, Value::Null)
}

/// Used by `AppError`'s `IntoResponse` impl for error kinds that do carry a
/// distinct HTTP status (404/409/400/500).
pub fn envelope_error(code: i32, message: impl Into<String>) -> Envelope {
    Envelope {
        code,
        message: message.into(),
        data: Value::Null,
    }
}

fn with_status(status: StatusCode, code: i32, message: impl Into<String>, data: Value) -> impl IntoResponse {
    (
        status,
        Json(Envelope {
            code,
            message: message.into(),
            data,
        }),
    )
}

fn data_to_value<T: Serialize>(data: T) -> Value {
    serde_json::to_value(data).unwrap_or(json!(null))
}
