use std::sync::Arc;

use axum::{
    Extension,
    Router,
    routing::get,
};

use appointment_cell::appointment_routes;
use doctor_cell::router::doctor_routes;
use notification_cell::{notification_routes, NotificationProducer};
use nurse_cell::nurse_routes;
use patient_cell::create_patient_router;
use shared_config::AppConfig;
use triage_cell::triage_routes;

pub fn create_router(state: Arc<AppConfig>, producer: NotificationProducer) -> Router {
    Router::new()
        .route("/", get(|| async { "Hospital Management API is running!" }))
        .nest("/doctors", doctor_routes(state.clone()))
        .nest("/patients", create_patient_router(state.clone()))
        .nest("/nurses", nurse_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/triage", triage_routes(state.clone()))
        .nest("/notifications", notification_routes(state))
        .layer(Extension(producer))
}
