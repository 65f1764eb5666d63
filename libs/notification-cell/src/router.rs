use std::sync::Arc;
use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;
use crate::handlers::{
    get_job_status,
    retry_job,
    cancel_job,
    get_queue_stats,
};

/// Admin view of the notification queue. Expects a `NotificationProducer`
/// extension layered on by the application.
pub fn notification_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/jobs/{job_id}", get(get_job_status))
        .route("/jobs/{job_id}/retry", post(retry_job))
        .route("/jobs/{job_id}/cancel", post(cancel_job))
        .route("/stats", get(get_queue_stats))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
