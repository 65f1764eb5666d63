use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::services::{mailer::Mailer, queue::JobQueue};
use crate::{JobStatus, NotificationError, NotificationJob, WorkerConfig};

const MAX_RETRY_DELAY_SECONDS: u64 = 86_400;

/// Pool of loops draining the notification queue.
#[derive(Clone)]
pub struct NotificationWorker {
    config: WorkerConfig,
    queue: Arc<dyn JobQueue>,
    mailer: Arc<dyn Mailer>,
    is_shutdown: Arc<RwLock<bool>>,
}

impl NotificationWorker {
    pub fn new(config: WorkerConfig, queue: Arc<dyn JobQueue>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            config,
            queue,
            mailer,
            is_shutdown: Arc::new(RwLock::new(false)),
        }
    }

    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn start(&self) -> Result<(), NotificationError> {
        info!("Starting {} notification workers", self.config.worker_count);

        self.queue.recover_in_flight().await?;

        let handles: Vec<_> = (0..self.config.worker_count)
            .map(|i| {
                let worker = self.clone();
                let worker_name = format!("{}-{}", self.config.worker_id, i);
                tokio::spawn(async move { worker.worker_loop(worker_name).await })
            })
            .collect();

        match futures::future::try_join_all(handles).await {
            Ok(_) => info!("Notification workers stopped"),
            Err(e) => error!("Notification worker panicked: {}", e),
        }

        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Stopping notification workers");
        *self.is_shutdown.write().await = true;
    }

    async fn worker_loop(&self, worker_name: String) {
        debug!("Worker loop started: {}", worker_name);

        loop {
            if *self.is_shutdown.read().await {
                break;
            }

            if let Err(e) = self.queue.promote_due_retries(Utc::now()).await {
                warn!("Worker {} failed to promote due retries: {}", worker_name, e);
            }

            match self.queue.dequeue(&worker_name).await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process_job(job, &worker_name).await {
                        error!("Worker {} failed to record job outcome: {}", worker_name, e);
                    }
                }
                Ok(None) => {
                    tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                }
                Err(e) => {
                    error!("Worker {} failed to dequeue job: {}", worker_name, e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }

        debug!("Worker loop ended: {}", worker_name);
    }

    /// Deliver a dequeued job and record the outcome. Returns the job's new status.
    #[instrument(skip(self, job), fields(job_id = %job.job_id, attempt = job.attempts))]
    pub async fn process_job(&self, job: NotificationJob, worker_name: &str) -> Result<JobStatus, NotificationError> {
        debug!("Worker {} delivering {:?} to {}", worker_name, job.kind, job.email.to);

        let job_timeout = Duration::from_secs(self.config.job_timeout_seconds);
        let delivery = match timeout(job_timeout, self.mailer.send(&job.email, &job.dedup_key)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(NotificationError::DeliveryFailed(format!("{:#}", e))),
            Err(_) => Err(NotificationError::WorkerTimeout {
                timeout_seconds: self.config.job_timeout_seconds,
            }),
        };

        match delivery {
            Ok(()) => {
                self.queue.update_status(job.job_id, JobStatus::Completed, None).await?;
                info!("Notification {} delivered to {}", job.job_id, job.email.to);
                Ok(JobStatus::Completed)
            }
            Err(e) if job.has_attempts_left() => {
                let due_at = self.retry_due_at(job.attempts, Utc::now());
                self.queue.retry_later(job.job_id, e.to_string(), due_at).await?;
                warn!(
                    "Notification {} failed (attempt {}/{}), retrying at {}: {}",
                    job.job_id, job.attempts, job.max_attempts, due_at, e
                );
                Ok(JobStatus::Retrying)
            }
            Err(e) => {
                self.queue.update_status(job.job_id, JobStatus::Failed, Some(e.to_string())).await?;
                error!("Notification {} failed permanently: {}", job.job_id, e);
                Ok(JobStatus::Failed)
            }
        }
    }

    /// Linear backoff: the n-th retry waits n * retry_delay, capped at a day.
    fn retry_due_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let seconds = self.config.retry_delay_seconds
            .saturating_mul(u64::from(attempts))
            .min(MAX_RETRY_DELAY_SECONDS);
        now + chrono::Duration::seconds(seconds as i64)
    }
}
