use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn nurse_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::create_nurse))
        .route("/", get(handlers::list_nurses))
        .route("/{nurse_id}", get(handlers::get_nurse))
        .route("/{nurse_id}", put(handlers::update_nurse))
        .route("/{nurse_id}/state", patch(handlers::change_nurse_state))
        .route("/{nurse_id}/doctors", put(handlers::assign_doctors))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
