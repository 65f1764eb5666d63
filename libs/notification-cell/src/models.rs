use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::NotificationError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingConfirmation,
    Cancellation,
    Reschedule,
    TreatmentSummary,
    AppointmentReminder,
    MonthlyReport,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, target),
            (Queued, Processing)
                | (Processing, Completed)
                | (Processing, Retrying)
                | (Processing, Failed)
                | (Retrying, Processing)
                | (Queued, Cancelled)
                | (Retrying, Cancelled)
                // manual retry of an exhausted job
                | (Failed, Retrying)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A rendered email ready for delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationJob {
    pub job_id: Uuid,
    pub dedup_key: String,
    pub kind: NotificationKind,
    pub email: OutgoingEmail,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub worker_id: Option<String>,
}

impl NotificationJob {
    pub fn new(dedup_key: impl Into<String>, kind: NotificationKind, email: OutgoingEmail, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            dedup_key: dedup_key.into(),
            kind,
            email,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            created_at: now,
            updated_at: now,
            completed_at: None,
            last_error: None,
            worker_id: None,
        }
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Apply a status change, enforcing the job state machine.
    pub fn transition(&mut self, status: JobStatus, error: Option<String>) -> Result<(), NotificationError> {
        if !self.status.can_transition_to(status) {
            return Err(NotificationError::InvalidStatusTransition {
                from: self.status,
                to: status,
            });
        }

        let now = Utc::now();
        match status {
            JobStatus::Processing => self.attempts += 1,
            JobStatus::Retrying if self.status == JobStatus::Failed => {
                self.attempts = 0;
                self.completed_at = None;
            }
            _ => {}
        }
        if status.is_terminal() {
            self.completed_at = Some(now);
        }
        if error.is_some() || status == JobStatus::Completed {
            self.last_error = error;
        }

        self.status = status;
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    Queued(NotificationJob),
    /// The dedup key was already seen within the dedup window.
    Duplicate { dedup_key: String },
}

impl EnqueueOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, EnqueueOutcome::Duplicate { .. })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueStats {
    pub pending_jobs: u64,
    pub processing_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    /// Jobs parked until their retry backoff elapses.
    pub scheduled_retries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub worker_count: u32,
    pub job_timeout_seconds: u64,
    pub retry_delay_seconds: u64,
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("notifier-{}", Uuid::new_v4()),
            worker_count: 2,
            job_timeout_seconds: 30,
            retry_delay_seconds: 30,
            poll_interval_ms: 250,
        }
    }
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            worker_count: config.notification_workers.max(1),
            retry_delay_seconds: config.notification_retry_delay_seconds,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn job() -> NotificationJob {
        NotificationJob::new(
            "booking:1",
            NotificationKind::BookingConfirmation,
            OutgoingEmail {
                to: "patient@example.com".to_string(),
                subject: "Appointment Confirmation".to_string(),
                body: "See you soon".to_string(),
            },
            3,
        )
    }

    #[test]
    fn processing_counts_attempts() {
        let mut job = job();
        job.transition(JobStatus::Processing, None).unwrap();
        job.transition(JobStatus::Retrying, Some("smtp down".to_string())).unwrap();
        job.transition(JobStatus::Processing, None).unwrap();

        assert_eq!(job.attempts, 2);
        assert_eq!(job.last_error.as_deref(), Some("smtp down"));
    }

    #[test]
    fn completed_jobs_cannot_restart() {
        let mut job = job();
        job.transition(JobStatus::Processing, None).unwrap();
        job.transition(JobStatus::Completed, None).unwrap();

        assert!(job.completed_at.is_some());
        assert_matches!(
            job.transition(JobStatus::Processing, None),
            Err(NotificationError::InvalidStatusTransition { from: JobStatus::Completed, .. })
        );
    }

    #[test]
    fn manual_retry_resets_attempts() {
        let mut job = job();
        job.transition(JobStatus::Processing, None).unwrap();
        job.transition(JobStatus::Failed, Some("bounced".to_string())).unwrap();
        job.transition(JobStatus::Retrying, None).unwrap();

        assert_eq!(job.attempts, 0);
        assert!(job.completed_at.is_none());
        assert!(job.has_attempts_left());
    }

    #[test]
    fn cancel_only_before_processing() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Retrying.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Cancelled));
    }
}
