use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::JobStatus;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Queue operation failed: {0}")]
    QueueError(String),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Invalid job status transition from {from} to {to}")]
    InvalidStatusTransition { from: JobStatus, to: JobStatus },

    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Mail delivery timed out after {timeout_seconds} seconds")]
    WorkerTimeout { timeout_seconds: u64 },

    #[error("Mail delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::JobNotFound(_) => AppError::NotFound(err.to_string()),
            NotificationError::InvalidStatusTransition { .. } => AppError::Conflict(err.to_string()),
            NotificationError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            NotificationError::DeliveryFailed(_) | NotificationError::WorkerTimeout { .. } => {
                AppError::ExternalService(err.to_string())
            }
            _ => AppError::Internal(err.to_string()),
        }
    }
}
