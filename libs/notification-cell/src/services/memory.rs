use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::services::queue::JobQueue;
use crate::{JobStatus, NotificationError, NotificationJob, QueueStats};

#[derive(Default)]
struct QueueState {
    jobs: HashMap<Uuid, NotificationJob>,
    pending: VecDeque<Uuid>,
    processing: Vec<Uuid>,
    retries: Vec<(DateTime<Utc>, Uuid)>,
    dedup: HashMap<String, Instant>,
    completed: u64,
    failed: u64,
}

/// Process-local queue used when no Redis is configured, and in tests.
#[derive(Default, Clone)]
pub struct InMemoryJobQueue {
    state: Arc<Mutex<QueueState>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> Arc<dyn JobQueue> {
        Arc::new(self)
    }

    pub async fn jobs(&self) -> Vec<NotificationJob> {
        let state = self.state.lock().await;
        let mut jobs: Vec<NotificationJob> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn claim_dedup_key(&self, dedup_key: &str, ttl_seconds: u64) -> Result<bool, NotificationError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        if let Some(expires_at) = state.dedup.get(dedup_key) {
            if *expires_at > now {
                return Ok(false);
            }
        }

        state.dedup.insert(dedup_key.to_string(), now + Duration::from_secs(ttl_seconds));
        Ok(true)
    }

    async fn enqueue(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        let mut state = self.state.lock().await;
        state.jobs.insert(job.job_id, job.clone());
        state.pending.push_back(job.job_id);
        debug!("Notification job {} enqueued in memory", job.job_id);
        Ok(())
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<NotificationJob>, NotificationError> {
        let mut state = self.state.lock().await;

        while let Some(job_id) = state.pending.pop_front() {
            let Some(job) = state.jobs.get_mut(&job_id) else {
                continue;
            };
            if job.status.is_terminal() || job.status == JobStatus::Processing {
                continue;
            }

            job.transition(JobStatus::Processing, None)?;
            job.worker_id = Some(worker_id.to_string());
            let job = job.clone();
            state.processing.push(job_id);
            return Ok(Some(job));
        }

        Ok(None)
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<NotificationJob, NotificationError> {
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(&job_id).ok_or(NotificationError::JobNotFound(job_id))?;

        let previous = job.status;
        job.transition(status, error)?;
        if status != JobStatus::Processing {
            job.worker_id = None;
        }
        let job = job.clone();

        if previous == JobStatus::Processing {
            state.processing.retain(|id| *id != job_id);
        }
        match status {
            JobStatus::Completed => state.completed += 1,
            JobStatus::Failed => state.failed += 1,
            _ => {}
        }

        Ok(job)
    }

    async fn requeue(&self, job_id: Uuid) -> Result<(), NotificationError> {
        let mut state = self.state.lock().await;
        let job = state.jobs.get(&job_id).ok_or(NotificationError::JobNotFound(job_id))?;

        if job.status != JobStatus::Retrying {
            return Err(NotificationError::InvalidStatusTransition {
                from: job.status,
                to: JobStatus::Processing,
            });
        }

        state.pending.push_back(job_id);
        Ok(())
    }

    async fn retry_later(
        &self,
        job_id: Uuid,
        error: String,
        due_at: DateTime<Utc>,
    ) -> Result<NotificationJob, NotificationError> {
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(&job_id).ok_or(NotificationError::JobNotFound(job_id))?;

        job.transition(JobStatus::Retrying, Some(error))?;
        job.worker_id = None;
        let job = job.clone();

        state.processing.retain(|id| *id != job_id);
        state.retries.push((due_at, job_id));
        Ok(job)
    }

    async fn promote_due_retries(&self, now: DateTime<Utc>) -> Result<u64, NotificationError> {
        let mut state = self.state.lock().await;

        let (mut due, waiting): (Vec<_>, Vec<_>) = state.retries.drain(..).partition(|(at, _)| *at <= now);
        state.retries = waiting;
        due.sort_by_key(|(at, _)| *at);

        let promoted = due.len() as u64;
        state.pending.extend(due.into_iter().map(|(_, job_id)| job_id));
        Ok(promoted)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<NotificationJob>, NotificationError> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn recover_in_flight(&self) -> Result<u64, NotificationError> {
        let mut state = self.state.lock().await;
        let in_flight: Vec<Uuid> = state.processing.drain(..).collect();
        let recovered = in_flight.len() as u64;

        for job_id in in_flight {
            if let Some(job) = state.jobs.get_mut(&job_id) {
                if job.status == JobStatus::Processing {
                    job.transition(JobStatus::Retrying, Some("worker restarted".to_string()))?;
                }
            }
            state.pending.push_back(job_id);
        }

        Ok(recovered)
    }

    async fn stats(&self) -> Result<QueueStats, NotificationError> {
        let state = self.state.lock().await;
        Ok(QueueStats {
            pending_jobs: state.pending.len() as u64,
            processing_jobs: state.processing.len() as u64,
            completed_jobs: state.completed,
            failed_jobs: state.failed,
            scheduled_retries: state.retries.len() as u64,
        })
    }
}
