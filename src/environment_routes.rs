//! Thin CRUD around `Environment` — create/list/get only, no business logic
//! of its own (spec.md §1 treats the surrounding CRUD as an external
//! collaborator; SPEC_FULL.md §6 keeps a minimal slice so the core
//! endpoints below have something to run against).

use axum::{extract::Path, Extension, Json};
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::AppResult;
use crate::extractor::AuthUser;
use crate::response;

#[derive(Deserialize)]
pub struct CreateEnvironmentRequest {
    pub name: String,
    #[serde(default)]
    pub variables: Value,
    #[serde(default)]
    pub is_default: bool,
}

pub async fn create_environment(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Json(payload): Json<CreateEnvironmentRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    let environment = crate::db::environments::insert(
        &pool,
        crate::db::environments::NewEnvironment {
            name: &payload.name,
            variables: &payload.variables,
            is_default: payload.is_default,
        },
    )
    .await?;
    Ok(response::created(environment))
}

pub async fn list_environments(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
) -> AppResult<impl axum::response::IntoResponse> {
    let environments = crate::db::environments::list(&pool).await?;
    Ok(response::ok(environments))
}

pub async fn get_environment(
    Extension(pool): Extension<PgPool>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<impl axum::response::IntoResponse> {
    let environment = crate::db::environments::get(&pool, id)
        .await?
        .ok_or(crate::error::AppError::NotFoundEntity)?;
    Ok(response::ok(environment))
}
