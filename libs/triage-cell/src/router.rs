use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn triage_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/assessments", post(handlers::create_assessment))
        .route("/assessments", get(handlers::list_assessments))
        .route("/assessments/{assessment_id}", get(handlers::get_assessment))
        .route("/assessments/{assessment_id}/assign", post(handlers::assign_doctor))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
