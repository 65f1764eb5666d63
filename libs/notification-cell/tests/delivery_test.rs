use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{extract::{Path, State}, Extension};
use serde_json::json;
use tokio::time::{sleep, Duration};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::handlers::{get_job_status, get_queue_stats};
use notification_cell::{
    EnqueueOutcome, HttpMailer, InMemoryJobQueue, JobQueue, JobStatus, Mailer, NotificationKind,
    NotificationProducer, NotificationWorker, OutgoingEmail, WorkerConfig,
};
use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::test_utils::{TestConfig, TestUser};

fn mail_config(server: &MockServer) -> AppConfig {
    AppConfig {
        mail_api_url: format!("{}/v1/send", server.uri()),
        mail_api_token: "mail-token".to_string(),
        mail_default_sender: "Hospital MS <noreply@hospital.com>".to_string(),
        ..AppConfig::default()
    }
}

fn email() -> OutgoingEmail {
    OutgoingEmail {
        to: "jane@example.com".to_string(),
        subject: "Appointment Confirmation".to_string(),
        body: "Your appointment has been booked.".to_string(),
    }
}

#[tokio::test]
async fn http_mailer_sends_idempotency_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .and(header("authorization", "Bearer mail-token"))
        .and(header("idempotency-key", "booking:123"))
        .and(body_partial_json(json!({
            "to": ["jane@example.com"],
            "subject": "Appointment Confirmation"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(&mail_config(&server));
    tokio_test::assert_ok!(mailer.send(&email(), "booking:123").await);
}

#[tokio::test]
async fn http_mailer_reports_provider_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(&mail_config(&server));
    let err = mailer.send(&email(), "booking:123").await.unwrap_err();
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn worker_pool_delivers_queued_jobs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/send"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = mail_config(&server);
    let queue = InMemoryJobQueue::new();
    let producer = NotificationProducer::new(queue.clone().shared(), &config);

    let EnqueueOutcome::Queued(job) = producer
        .enqueue("booking:456", NotificationKind::BookingConfirmation, email())
        .await
        .unwrap()
    else {
        panic!("expected a queued job");
    };

    let worker = NotificationWorker::new(
        WorkerConfig {
            worker_count: 2,
            poll_interval_ms: 10,
            ..WorkerConfig::default()
        },
        queue.clone().shared(),
        Arc::new(HttpMailer::new(&config)),
    );
    let running = worker.clone();
    let handle = tokio::spawn(async move { running.start().await });

    let mut status = JobStatus::Queued;
    for _ in 0..100 {
        status = queue.get_job(job.job_id).await.unwrap().unwrap().status;
        if status == JobStatus::Completed {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    worker.shutdown().await;
    handle.await.unwrap().unwrap();
    assert_eq!(status, JobStatus::Completed);
}

#[tokio::test]
async fn job_status_is_admin_only() {
    let queue = InMemoryJobQueue::new();
    let producer = NotificationProducer::new(queue.shared(), &AppConfig::default());
    let patient = TestUser::patient("jane@example.com");

    let result = get_job_status(
        State(TestConfig::default().to_arc()),
        Extension(patient.context("token")),
        Extension(producer),
        Path(Uuid::new_v4()),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let queue = InMemoryJobQueue::new();
    let producer = NotificationProducer::new(queue.shared(), &AppConfig::default());
    let admin = TestUser::admin("admin@hospital.com");

    let result = get_job_status(
        State(TestConfig::default().to_arc()),
        Extension(admin.context("token")),
        Extension(producer),
        Path(Uuid::new_v4()),
    )
    .await;

    assert_matches!(result, Err(AppError::NotFound(_)));
}

#[tokio::test]
async fn stats_count_pending_jobs() {
    let queue = InMemoryJobQueue::new();
    let producer = NotificationProducer::new(queue.shared(), &AppConfig::default());
    producer.notify("reminder:a:2025-06-01", NotificationKind::AppointmentReminder, email()).await;
    producer.notify("reminder:a:2025-06-01", NotificationKind::AppointmentReminder, email()).await;

    let body = get_queue_stats(
        State(TestConfig::default().to_arc()),
        Extension(TestUser::admin("admin@hospital.com").context("token")),
        Extension(producer),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(body["pending_jobs"], 1);
}
