use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put, patch, delete},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/search", get(handlers::search_doctors_public))
        .route("/{doctor_id}", get(handlers::get_doctor_public))
        .route("/{doctor_id}/availability", get(handlers::get_doctor_availability_public));

    let protected_routes = Router::new()
        .route("/", post(handlers::create_doctor))
        .route("/{doctor_id}", put(handlers::update_doctor))
        .route("/{doctor_id}/state", patch(handlers::change_doctor_state))
        .route("/{doctor_id}/availability", post(handlers::create_availability))
        .route("/{doctor_id}/availability", put(handlers::replace_availability))
        .route("/{doctor_id}/availability/{window_id}", delete(handlers::delete_availability))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
