use axum::{
    routing::{get, post},
    Router,
};

use crate::{auth, case_routes, environment_routes, scenario_routes};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/register", post(auth::register_user))
        .route("/api/login", post(auth::login_user))
        .route("/api/logout", post(auth::logout_user))
        .route("/api/me", get(auth::current_user))
        .route(
            "/api/environments",
            get(environment_routes::list_environments).post(environment_routes::create_environment),
        )
        .route("/api/environments/:id", get(environment_routes::get_environment))
        .route(
            "/api/requests",
            get(case_routes::list_requests).post(case_routes::create_request),
        )
        .route("/api/requests/:id", get(case_routes::get_request))
        .route(
            "/api/requests/:id/datasets",
            get(case_routes::list_datasets).post(case_routes::create_dataset),
        )
        .route(
            "/api/requests/:id/extract-rules",
            get(case_routes::list_extract_rules).post(case_routes::create_extract_rule),
        )
        .route(
            "/api/requests/:id/assert-rules",
            get(case_routes::list_assert_rules).post(case_routes::create_assert_rule),
        )
        .route("/api/case/run", post(case_routes::run_case))
        .route(
            "/api/scenarios",
            get(scenario_routes::list_scenarios).post(scenario_routes::create_scenario),
        )
        .route("/api/scenarios/:id", get(scenario_routes::get_scenario))
        .route(
            "/api/scenarios/:id/steps",
            get(scenario_routes::list_scenario_steps).post(scenario_routes::create_scenario_step),
        )
        .route(
            "/api/scenarios/:id/steps/reorder",
            post(scenario_routes::reorder_scenario_steps),
        )
        .route("/api/scenario/run", post(scenario_routes::run_scenario))
        .route("/api/scenario/run/cancel", post(scenario_routes::cancel_scenario_run))
        .route("/api/scenario/run/:id", get(scenario_routes::get_scenario_run))
        .route(
            "/api/scenario/run/:id/report",
            get(scenario_routes::get_scenario_run_report),
        )
}
