use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{auth::{RequestContext, Role}, error::AppError};

use crate::services::producer::NotificationProducer;

/// Get job status
pub async fn get_job_status(
    State(_config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(producer): Extension<NotificationProducer>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Admin])?;

    let job = producer.get_job(job_id).await?;

    Ok(Json(json!({
        "job_id": job.job_id,
        "kind": job.kind,
        "recipient": job.email.to,
        "subject": job.email.subject,
        "status": job.status,
        "attempts": job.attempts,
        "max_attempts": job.max_attempts,
        "created_at": job.created_at,
        "updated_at": job.updated_at,
        "completed_at": job.completed_at,
        "last_error": job.last_error
    })))
}

/// Re-queue a failed job
pub async fn retry_job(
    State(_config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(producer): Extension<NotificationProducer>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Admin])?;
    info!("Retry request for notification {} from {}", job_id, ctx.user_id());

    let job = producer.retry_job(job_id).await?;

    Ok(Json(json!({
        "success": true,
        "job_id": job.job_id,
        "status": job.status
    })))
}

/// Cancel a job that has not been delivered yet
pub async fn cancel_job(
    State(_config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(producer): Extension<NotificationProducer>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Admin])?;
    info!("Cancel request for notification {} from {}", job_id, ctx.user_id());

    let job = producer.cancel_job(job_id).await?;

    Ok(Json(json!({
        "success": true,
        "job_id": job.job_id,
        "status": job.status
    })))
}

pub async fn get_queue_stats(
    State(_config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(producer): Extension<NotificationProducer>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Admin])?;

    let stats = producer.stats().await?;

    Ok(Json(json!(stats)))
}
