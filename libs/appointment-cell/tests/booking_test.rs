use assert_matches::assert_matches;
use axum::{
    extract::{Extension, Query, State},
    Json,
};
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::handlers::{book_appointment, check_slot};
use appointment_cell::models::{BookAppointmentRequest, SlotCheckQuery};
use notification_cell::{InMemoryJobQueue, NotificationKind, NotificationProducer};
use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

fn booking_date() -> NaiveDate {
    Utc::now().date_naive() + Duration::days(30)
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn request(doctor_id: Uuid, start: NaiveTime) -> BookAppointmentRequest {
    BookAppointmentRequest {
        patient_id: None,
        doctor_id,
        appointment_date: booking_date(),
        start_time: start,
        end_time: None,
        duration_minutes: Some(30),
        reason: Some("Persistent cough".to_string()),
        notes: None,
        priority: None,
        override_availability: false,
    }
}

fn producer(config: &AppConfig) -> (InMemoryJobQueue, NotificationProducer) {
    let queue = InMemoryJobQueue::new();
    let producer = NotificationProducer::new(queue.clone().shared(), config);
    (queue, producer)
}

/// Patient and doctor profiles, both active.
async fn mount_profiles(server: &MockServer, patient_id: Uuid, doctor_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id.to_string())
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_response(&doctor_id.to_string())
        ])))
        .mount(server)
        .await;
}

async fn mount_window(server: &MockServer, doctor_id: Uuid) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_windows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_window_response(
                &doctor_id.to_string(),
                &booking_date().to_string(),
                "09:00:00",
                "12:00:00",
            )
        ])))
        .mount(server)
        .await;
}

async fn mount_doctor_day(server: &MockServer, doctor_id: Uuid, rows: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

async fn mount_patient_day(server: &MockServer, patient_id: Uuid, rows: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

fn created_row(patient_id: Uuid, doctor_id: Uuid, start: &str, end: &str) -> serde_json::Value {
    MockSupabaseResponses::appointment_response(
        &patient_id.to_string(),
        &doctor_id.to_string(),
        &booking_date().to_string(),
        start,
        Some(end),
        "active",
    )
}

#[tokio::test]
async fn patient_books_free_slot_and_confirmation_is_queued() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("jane@example.com");
    let patient_id = patient.uuid();
    let doctor_id = Uuid::new_v4();

    mount_profiles(&server, patient_id, doctor_id).await;
    mount_window(&server, doctor_id).await;
    mount_doctor_day(&server, doctor_id, json!([])).await;
    mount_patient_day(&server, patient_id, json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "start_time": "10:00:00",
            "end_time": "10:30:00",
            "duration_minutes": 30,
            "status": "active"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            created_row(patient_id, doctor_id, "10:00:00", "10:30:00")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(server.uri()).to_arc();
    let (queue, producer) = producer(&config);

    let body = book_appointment(
        State(config),
        Extension(patient.context("token")),
        Extension(producer),
        Json(request(doctor_id, time(10, 0))),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(body["success"], true);
    assert_eq!(body["warnings"], json!([]));

    let jobs = queue.jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].kind, NotificationKind::BookingConfirmation);
    assert_eq!(jobs[0].email.to, "jane@example.com");
}

#[tokio::test]
async fn overlapping_booking_is_rejected_with_reason() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("jane@example.com");
    let patient_id = patient.uuid();
    let doctor_id = Uuid::new_v4();

    mount_profiles(&server, patient_id, doctor_id).await;
    mount_window(&server, doctor_id).await;
    mount_doctor_day(&server, doctor_id, json!([
        created_row(Uuid::new_v4(), doctor_id, "10:00:00", "10:30:00")
    ])).await;
    mount_patient_day(&server, patient_id, json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(server.uri()).to_arc();
    let (queue, producer) = producer(&config);

    let result = book_appointment(
        State(config),
        Extension(patient.context("token")),
        Extension(producer),
        Json(request(doctor_id, time(10, 15))),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(msg)) if msg == "Conflicts with existing appointment at 10:00");
    assert_eq!(queue.pending_len().await, 0);
}

#[tokio::test]
async fn booking_that_ends_when_another_starts_is_accepted() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("jane@example.com");
    let patient_id = patient.uuid();
    let doctor_id = Uuid::new_v4();

    mount_profiles(&server, patient_id, doctor_id).await;
    mount_window(&server, doctor_id).await;
    mount_doctor_day(&server, doctor_id, json!([
        created_row(Uuid::new_v4(), doctor_id, "10:00:00", "10:30:00")
    ])).await;
    mount_patient_day(&server, patient_id, json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            created_row(patient_id, doctor_id, "09:30:00", "10:00:00")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(server.uri()).to_arc();
    let (_queue, producer) = producer(&config);

    let result = book_appointment(
        State(config),
        Extension(patient.context("token")),
        Extension(producer),
        Json(request(doctor_id, time(9, 30))),
    )
    .await;

    tokio_test::assert_ok!(result);
}

#[tokio::test]
async fn admin_override_books_outside_windows_with_warning() {
    let server = MockServer::start().await;
    let admin = TestUser::admin("admin@hospital.com");
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    mount_profiles(&server, patient_id, doctor_id).await;
    mount_window(&server, doctor_id).await;
    mount_doctor_day(&server, doctor_id, json!([])).await;
    mount_patient_day(&server, patient_id, json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            created_row(patient_id, doctor_id, "13:00:00", "13:30:00")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(server.uri()).to_arc();
    let (_queue, producer) = producer(&config);

    let mut booking = request(doctor_id, time(13, 0));
    booking.patient_id = Some(patient_id);
    booking.override_availability = true;

    let body = book_appointment(
        State(config),
        Extension(admin.context("token")),
        Extension(producer),
        Json(booking),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(body["warnings"], json!(["Requested time is outside doctor's availability"]));
}

#[tokio::test]
async fn patient_cannot_override_availability() {
    let patient = TestUser::patient("jane@example.com");
    let config = TestConfig::default().to_arc();
    let (_queue, producer) = producer(&config);

    let mut booking = request(Uuid::new_v4(), time(13, 0));
    booking.override_availability = true;

    let result = book_appointment(
        State(config),
        Extension(patient.context("token")),
        Extension(producer),
        Json(booking),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn patient_cannot_book_for_someone_else() {
    let patient = TestUser::patient("jane@example.com");
    let config = TestConfig::default().to_arc();
    let (_queue, producer) = producer(&config);

    let mut booking = request(Uuid::new_v4(), time(10, 0));
    booking.patient_id = Some(Uuid::new_v4());

    let result = book_appointment(
        State(config),
        Extension(patient.context("token")),
        Extension(producer),
        Json(booking),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[tokio::test]
async fn patient_double_booking_is_rejected() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("jane@example.com");
    let patient_id = patient.uuid();
    let doctor_id = Uuid::new_v4();

    mount_profiles(&server, patient_id, doctor_id).await;
    mount_window(&server, doctor_id).await;
    mount_doctor_day(&server, doctor_id, json!([])).await;
    mount_patient_day(&server, patient_id, json!([
        created_row(patient_id, Uuid::new_v4(), "10:00:00", "11:00:00")
    ])).await;

    let config = TestConfig::with_supabase_url(server.uri()).to_arc();
    let (_queue, producer) = producer(&config);

    let result = book_appointment(
        State(config),
        Extension(patient.context("token")),
        Extension(producer),
        Json(request(doctor_id, time(10, 30))),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(msg)) if msg == "You already have an appointment at this time");
}

#[tokio::test]
async fn concurrent_insert_surfaces_as_slot_taken() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("jane@example.com");
    let patient_id = patient.uuid();
    let doctor_id = Uuid::new_v4();

    mount_profiles(&server, patient_id, doctor_id).await;
    mount_window(&server, doctor_id).await;
    mount_doctor_day(&server, doctor_id, json!([])).await;
    mount_patient_day(&server, patient_id, json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response("conflicting key value violates exclusion constraint", "23P01"),
        ))
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(server.uri()).to_arc();
    let (queue, producer) = producer(&config);

    let result = book_appointment(
        State(config),
        Extension(patient.context("token")),
        Extension(producer),
        Json(request(doctor_id, time(10, 0))),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(msg)) if msg == "Slot was just booked by another request");
    assert_eq!(queue.pending_len().await, 0);
}

#[tokio::test]
async fn booking_in_the_past_is_a_bad_request() {
    let patient = TestUser::patient("jane@example.com");
    let config = TestConfig::default().to_arc();
    let (_queue, producer) = producer(&config);

    let mut booking = request(Uuid::new_v4(), time(10, 0));
    booking.appointment_date = Utc::now().date_naive() - Duration::days(1);

    let result = book_appointment(
        State(config),
        Extension(patient.context("token")),
        Extension(producer),
        Json(booking),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(_)));
}

#[tokio::test]
async fn slot_check_reports_missing_windows() {
    let server = MockServer::start().await;
    let triage = TestUser::triage("triage@hospital.com");
    let doctor_id = Uuid::new_v4();

    mount_profiles(&server, Uuid::new_v4(), doctor_id).await;
    mount_doctor_day(&server, doctor_id, json!([])).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_windows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let body = check_slot(
        State(TestConfig::with_supabase_url(server.uri()).to_arc()),
        Extension(triage.context("token")),
        Query(SlotCheckQuery {
            doctor_id,
            date: booking_date(),
            start_time: time(10, 0),
            end_time: Some(time(10, 45)),
            duration_minutes: None,
            exclude_appointment_id: None,
        }),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(body["available"], false);
    assert_eq!(body["reason"], "Doctor not available on this date");
    assert_eq!(body["end_time"], "10:45:00");
}

#[tokio::test]
async fn absurd_duration_is_a_bad_request() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("jane@example.com");
    let doctor_id = Uuid::new_v4();

    mount_profiles(&server, patient.uuid(), doctor_id).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let config = TestConfig::with_supabase_url(server.uri()).to_arc();
    let (_queue, producer) = producer(&config);
    let mut booking = request(doctor_id, time(10, 0));
    booking.duration_minutes = Some(1_000_000_000_000);

    let result = book_appointment(
        State(config),
        Extension(patient.context("token")),
        Extension(producer),
        Json(booking),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(msg)) if msg.contains("must not exceed 1440 minutes"));
}

#[tokio::test]
async fn slot_check_rejects_absurd_duration() {
    let server = MockServer::start().await;
    let triage = TestUser::triage("triage@hospital.com");
    let doctor_id = Uuid::new_v4();

    mount_profiles(&server, Uuid::new_v4(), doctor_id).await;

    let body = check_slot(
        State(TestConfig::with_supabase_url(server.uri()).to_arc()),
        Extension(triage.context("token")),
        Query(SlotCheckQuery {
            doctor_id,
            date: booking_date(),
            start_time: time(10, 0),
            end_time: None,
            duration_minutes: Some(1_000_000_000_000),
            exclude_appointment_id: None,
        }),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(body["available"], false);
    assert_eq!(body["reason"], "Requested duration must not exceed 1440 minutes");
    assert_eq!(body["end_time"], serde_json::Value::Null);
}
