use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::{JobStatus, NotificationError, NotificationJob, QueueStats};

const PENDING_KEY: &str = "notification_queue:pending";
const PROCESSING_KEY: &str = "notification_queue:processing";
const RETRY_KEY: &str = "notification_queue:retry";
const COMPLETED_COUNTER: &str = "notification_stats:completed";
const FAILED_COUNTER: &str = "notification_stats:failed";
const JOB_TTL_SECONDS: i64 = 604_800;
const PROMOTE_BATCH: u64 = 100;

const PROMOTE_DUE_SCRIPT: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, id in ipairs(due) do
    redis.call('ZREM', KEYS[1], id)
    redis.call('LPUSH', KEYS[2], id)
end
return #due
";

/// Storage for notification jobs. Jobs move pending -> processing, then either
/// finish or are parked in the retry schedule until their backoff elapses.
/// A job id is always held by the pending list, the processing list or the
/// retry schedule until it reaches a terminal state.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Reserve a dedup key for `ttl_seconds`. Returns false if it is already held.
    async fn claim_dedup_key(&self, dedup_key: &str, ttl_seconds: u64) -> Result<bool, NotificationError>;

    async fn enqueue(&self, job: &NotificationJob) -> Result<(), NotificationError>;

    /// Pop the next runnable job and mark it Processing for `worker_id`.
    /// Jobs that already reached a terminal state are dropped.
    async fn dequeue(&self, worker_id: &str) -> Result<Option<NotificationJob>, NotificationError>;

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<NotificationJob, NotificationError>;

    /// Push a Retrying job back onto the pending list.
    async fn requeue(&self, job_id: Uuid) -> Result<(), NotificationError>;

    /// Mark a Processing job Retrying and park it in the retry schedule until `due_at`.
    async fn retry_later(
        &self,
        job_id: Uuid,
        error: String,
        due_at: DateTime<Utc>,
    ) -> Result<NotificationJob, NotificationError>;

    /// Move parked jobs due at or before `now` onto the pending list.
    async fn promote_due_retries(&self, now: DateTime<Utc>) -> Result<u64, NotificationError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<NotificationJob>, NotificationError>;

    /// Return jobs left in flight by a previous process to the pending list.
    async fn recover_in_flight(&self) -> Result<u64, NotificationError>;

    async fn stats(&self) -> Result<QueueStats, NotificationError>;
}

pub struct RedisJobQueue {
    pool: Pool,
}

impl RedisJobQueue {
    pub async fn new(config: &AppConfig) -> Result<Self, NotificationError> {
        let redis_url = config.redis_url.clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            NotificationError::RedisError(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Failed to create Redis pool",
                format!("Pool creation error: {}", e),
            )))
        })?;

        let queue = Self { pool };
        let mut conn = queue.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis notification queue initialized");

        Ok(queue)
    }

    pub fn shared(self) -> Arc<dyn JobQueue> {
        Arc::new(self)
    }

    async fn get_connection(&self) -> Result<Connection, NotificationError> {
        self.pool.get().await.map_err(|e| {
            NotificationError::RedisError(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Failed to get Redis connection",
                e.to_string(),
            )))
        })
    }

    async fn load(conn: &mut Connection, job_id: &str) -> Result<Option<NotificationJob>, NotificationError> {
        let job_key = format!("notification_job:{}", job_id);
        let data: Option<String> = conn.hget(&job_key, "data").await?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn store(conn: &mut Connection, job: &NotificationJob) -> Result<(), NotificationError> {
        let job_key = format!("notification_job:{}", job.job_id);
        let job_data = serde_json::to_string(job)?;

        let _: () = conn.hset_multiple(&job_key, &[
            ("data", job_data.as_str()),
            ("status", &job.status.to_string()),
            ("updated_at", &job.updated_at.to_rfc3339()),
        ]).await?;
        let _: () = conn.expire(&job_key, JOB_TTL_SECONDS).await?;

        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn claim_dedup_key(&self, dedup_key: &str, ttl_seconds: u64) -> Result<bool, NotificationError> {
        let mut conn = self.get_connection().await?;
        let key = format!("notification_dedup:{}", dedup_key);

        let claimed: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(claimed.is_some())
    }

    async fn enqueue(&self, job: &NotificationJob) -> Result<(), NotificationError> {
        let mut conn = self.get_connection().await?;

        Self::store(&mut conn, job).await?;
        let _: () = conn.lpush(PENDING_KEY, job.job_id.to_string()).await?;

        debug!("Notification job {} enqueued", job.job_id);
        Ok(())
    }

    async fn dequeue(&self, worker_id: &str) -> Result<Option<NotificationJob>, NotificationError> {
        let mut conn = self.get_connection().await?;

        // Atomic move from pending to processing
        let job_id: Option<String> = conn.brpoplpush(PENDING_KEY, PROCESSING_KEY, 1.0).await?;
        let Some(job_id) = job_id else {
            return Ok(None);
        };

        let Some(mut job) = Self::load(&mut conn, &job_id).await? else {
            warn!("Dropping notification job {} with no stored data", job_id);
            let _: () = conn.lrem(PROCESSING_KEY, 1, &job_id).await?;
            return Ok(None);
        };

        if job.status.is_terminal() || job.status == JobStatus::Processing {
            debug!("Skipping notification job {} already {}", job.job_id, job.status);
            let _: () = conn.lrem(PROCESSING_KEY, 1, &job_id).await?;
            return Ok(None);
        }

        job.transition(JobStatus::Processing, None)?;
        job.worker_id = Some(worker_id.to_string());
        Self::store(&mut conn, &job).await?;

        debug!("Notification job {} dequeued by {}", job.job_id, worker_id);
        Ok(Some(job))
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<NotificationJob, NotificationError> {
        let mut conn = self.get_connection().await?;
        let mut job = Self::load(&mut conn, &job_id.to_string())
            .await?
            .ok_or(NotificationError::JobNotFound(job_id))?;

        let previous = job.status;
        job.transition(status, error)?;
        if status != JobStatus::Processing {
            job.worker_id = None;
        }
        Self::store(&mut conn, &job).await?;

        if previous == JobStatus::Processing {
            let _: () = conn.lrem(PROCESSING_KEY, 1, job_id.to_string()).await?;
        }
        match status {
            JobStatus::Completed => {
                let _: () = conn.incr(COMPLETED_COUNTER, 1).await?;
            }
            JobStatus::Failed => {
                let _: () = conn.incr(FAILED_COUNTER, 1).await?;
            }
            _ => {}
        }

        debug!("Notification job {} moved from {} to {}", job_id, previous, status);
        Ok(job)
    }

    async fn requeue(&self, job_id: Uuid) -> Result<(), NotificationError> {
        let mut conn = self.get_connection().await?;
        let job = Self::load(&mut conn, &job_id.to_string())
            .await?
            .ok_or(NotificationError::JobNotFound(job_id))?;

        if job.status != JobStatus::Retrying {
            return Err(NotificationError::InvalidStatusTransition {
                from: job.status,
                to: JobStatus::Processing,
            });
        }

        let _: () = conn.lpush(PENDING_KEY, job_id.to_string()).await?;
        Ok(())
    }

    async fn retry_later(
        &self,
        job_id: Uuid,
        error: String,
        due_at: DateTime<Utc>,
    ) -> Result<NotificationJob, NotificationError> {
        let mut conn = self.get_connection().await?;
        let mut job = Self::load(&mut conn, &job_id.to_string())
            .await?
            .ok_or(NotificationError::JobNotFound(job_id))?;

        job.transition(JobStatus::Retrying, Some(error))?;
        job.worker_id = None;
        Self::store(&mut conn, &job).await?;

        // Still listed as processing until this runs, so a crash here is recovered on start.
        let _: () = redis::pipe()
            .atomic()
            .zadd(RETRY_KEY, job_id.to_string(), due_at.timestamp())
            .ignore()
            .lrem(PROCESSING_KEY, 1, job_id.to_string())
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!("Notification job {} parked until {}", job_id, due_at);
        Ok(job)
    }

    async fn promote_due_retries(&self, now: DateTime<Utc>) -> Result<u64, NotificationError> {
        let mut conn = self.get_connection().await?;

        let promoted: u64 = redis::Script::new(PROMOTE_DUE_SCRIPT)
            .key(RETRY_KEY)
            .key(PENDING_KEY)
            .arg(now.timestamp())
            .arg(PROMOTE_BATCH)
            .invoke_async(&mut conn)
            .await?;

        if promoted > 0 {
            debug!("Promoted {} notification retries", promoted);
        }
        Ok(promoted)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<NotificationJob>, NotificationError> {
        let mut conn = self.get_connection().await?;
        Self::load(&mut conn, &job_id.to_string()).await
    }

    async fn recover_in_flight(&self) -> Result<u64, NotificationError> {
        let mut conn = self.get_connection().await?;
        let mut recovered = 0;

        loop {
            let moved: Option<String> = conn.rpoplpush(PROCESSING_KEY, PENDING_KEY).await?;
            let Some(job_id) = moved else { break };

            // A Processing job that never finished gets a fresh Retrying state.
            if let Some(mut job) = Self::load(&mut conn, &job_id).await? {
                if job.status == JobStatus::Processing {
                    job.transition(JobStatus::Retrying, Some("worker restarted".to_string()))?;
                    Self::store(&mut conn, &job).await?;
                }
            }
            recovered += 1;
        }

        if recovered > 0 {
            info!("Recovered {} in-flight notification jobs", recovered);
        }
        Ok(recovered)
    }

    async fn stats(&self) -> Result<QueueStats, NotificationError> {
        let mut conn = self.get_connection().await?;

        let pending_jobs: u64 = conn.llen(PENDING_KEY).await?;
        let processing_jobs: u64 = conn.llen(PROCESSING_KEY).await?;
        let completed_jobs: Option<u64> = conn.get(COMPLETED_COUNTER).await?;
        let failed_jobs: Option<u64> = conn.get(FAILED_COUNTER).await?;
        let scheduled_retries: u64 = conn.zcard(RETRY_KEY).await?;

        Ok(QueueStats {
            pending_jobs,
            processing_jobs,
            completed_jobs: completed_jobs.unwrap_or(0),
            failed_jobs: failed_jobs.unwrap_or(0),
            scheduled_retries,
        })
    }
}
