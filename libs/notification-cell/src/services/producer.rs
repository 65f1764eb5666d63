use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::services::queue::JobQueue;
use crate::{EnqueueOutcome, JobStatus, NotificationError, NotificationJob, NotificationKind, OutgoingEmail, QueueStats};

pub const DEDUP_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Entry point for every cell that wants an email sent.
#[derive(Clone)]
pub struct NotificationProducer {
    queue: Arc<dyn JobQueue>,
    max_attempts: u32,
    dedup_ttl_seconds: u64,
}

impl NotificationProducer {
    pub fn new(queue: Arc<dyn JobQueue>, config: &AppConfig) -> Self {
        Self {
            queue,
            max_attempts: config.notification_max_attempts.max(1),
            dedup_ttl_seconds: DEDUP_TTL_SECONDS,
        }
    }

    pub fn queue(&self) -> Arc<dyn JobQueue> {
        Arc::clone(&self.queue)
    }

    pub async fn enqueue(
        &self,
        dedup_key: &str,
        kind: NotificationKind,
        email: OutgoingEmail,
    ) -> Result<EnqueueOutcome, NotificationError> {
        if email.to.trim().is_empty() {
            return Err(NotificationError::ValidationError("Recipient is required".to_string()));
        }

        if !self.queue.claim_dedup_key(dedup_key, self.dedup_ttl_seconds).await? {
            debug!("Skipping duplicate notification {}", dedup_key);
            return Ok(EnqueueOutcome::Duplicate { dedup_key: dedup_key.to_string() });
        }

        let job = NotificationJob::new(dedup_key, kind, email, self.max_attempts);
        self.queue.enqueue(&job).await?;

        info!("Queued {:?} notification {} ({})", kind, job.job_id, dedup_key);
        Ok(EnqueueOutcome::Queued(job))
    }

    /// Enqueue without surfacing failures to the caller.
    pub async fn notify(&self, dedup_key: &str, kind: NotificationKind, email: OutgoingEmail) {
        if let Err(e) = self.enqueue(dedup_key, kind, email).await {
            warn!("Failed to queue notification {}: {}", dedup_key, e);
        }
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<NotificationJob, NotificationError> {
        self.queue.get_job(job_id).await?.ok_or(NotificationError::JobNotFound(job_id))
    }

    pub async fn retry_job(&self, job_id: Uuid) -> Result<NotificationJob, NotificationError> {
        let job = self.queue.update_status(job_id, JobStatus::Retrying, None).await?;
        self.queue.requeue(job_id).await?;
        info!("Notification job {} manually re-queued", job_id);
        Ok(job)
    }

    pub async fn cancel_job(&self, job_id: Uuid) -> Result<NotificationJob, NotificationError> {
        self.queue.update_status(job_id, JobStatus::Cancelled, Some("Cancelled by admin".to_string())).await
    }

    pub async fn stats(&self) -> Result<QueueStats, NotificationError> {
        self.queue.stats().await
    }
}
