use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post, put},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // All appointment operations require authentication
    Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/", get(handlers::list_appointments))
        .route("/slots/check", get(handlers::check_slot))
        .route("/patients/{patient_id}/history", get(handlers::patient_history))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .route("/{appointment_id}/nurse", put(handlers::assign_nurse))
        .route("/{appointment_id}/nurses", get(handlers::nurse_roster))
        .route("/{appointment_id}/treatment", get(handlers::get_treatment))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
