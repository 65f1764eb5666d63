use assert_matches::assert_matches;
use axum::{
    extract::{Extension, Path, State},
    Json,
};
use chrono::{Duration, NaiveTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::Priority;
use notification_cell::{InMemoryJobQueue, NotificationProducer};
use shared_models::error::AppError;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};
use triage_cell::handlers::{assign_doctor, create_assessment};
use triage_cell::models::{AssignDoctorRequest, CreateAssessmentRequest};

fn assessment_row(id: Uuid, patient_id: Option<Uuid>, status: &str) -> Value {
    json!({
        "id": id,
        "triage_user_id": Uuid::new_v4(),
        "patient_id": patient_id,
        "patient_name": "Jane Roe",
        "patient_contact": null,
        "patient_age": 35,
        "patient_gender": "female",
        "chief_complaint": "Severe chest pain",
        "vital_signs": "BP 150/95",
        "priority_level": "emergency",
        "recommended_specialization": "Cardiology",
        "notes": null,
        "status": status,
        "assigned_doctor_id": null,
        "appointment_id": null,
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z"
    })
}

fn walk_in() -> CreateAssessmentRequest {
    CreateAssessmentRequest {
        patient_id: None,
        patient_name: Some("  John Doe ".to_string()),
        patient_contact: Some("+1 555 0199".to_string()),
        patient_age: Some(52),
        patient_gender: Some("male".to_string()),
        chief_complaint: "Shortness of breath".to_string(),
        vital_signs: Some("SpO2 91%".to_string()),
        priority_level: Priority::Urgent,
        recommended_specialization: Some("Pulmonology".to_string()),
        notes: None,
    }
}

fn assignment(doctor_id: Uuid) -> AssignDoctorRequest {
    AssignDoctorRequest {
        doctor_id,
        appointment_date: Utc::now().date_naive() + Duration::days(1),
        start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        end_time: None,
        duration_minutes: None,
    }
}

fn producer() -> NotificationProducer {
    NotificationProducer::new(InMemoryJobQueue::new().shared(), &TestConfig::default().to_app_config())
}

#[tokio::test]
async fn triage_records_walk_in_assessment() {
    let server = MockServer::start().await;
    let triage = TestUser::triage("triage@hospital.com");

    let mut created = assessment_row(Uuid::new_v4(), None, "pending");
    created["patient_name"] = json!("John Doe");
    created["priority_level"] = json!("urgent");
    Mock::given(method("POST"))
        .and(path("/rest/v1/triage_assessments"))
        .and(body_partial_json(json!({
            "triage_user_id": triage.uuid(),
            "patient_name": "John Doe",
            "priority_level": "urgent",
            "status": "pending"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([created])))
        .expect(1)
        .mount(&server)
        .await;

    let body = create_assessment(
        State(TestConfig::with_supabase_url(server.uri()).to_arc()),
        Extension(triage.context("token")),
        Json(walk_in()),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(body["assessment"]["status"], "pending");
}

#[tokio::test]
async fn walk_in_needs_a_name() {
    let triage = TestUser::triage("triage@hospital.com");
    let mut request = walk_in();
    request.patient_name = Some("   ".to_string());

    let result = create_assessment(
        State(TestConfig::default().to_arc()),
        Extension(triage.context("token")),
        Json(request),
    )
    .await;

    assert_matches!(result, Err(AppError::ValidationError(_)));
}

#[tokio::test]
async fn only_triage_staff_create_assessments() {
    let doctor = TestUser::doctor("house@hospital.com");

    let result = create_assessment(
        State(TestConfig::default().to_arc()),
        Extension(doctor.context("token")),
        Json(walk_in()),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

/// A pending assessment for a registered patient, a free doctor and an
/// accepting appointments endpoint. Returns the booked appointment row.
async fn mount_bookable(server: &MockServer, assessment_id: Uuid, patient_id: Uuid, doctor_id: Uuid, date: &str) -> Value {
    Mock::given(method("GET"))
        .and(path("/rest/v1/triage_assessments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            assessment_row(assessment_id, Some(patient_id), "pending")
        ])))
        .mount(server)
        .await;
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
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_windows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_window_response(&doctor_id.to_string(), date, "08:00:00", "12:00:00")
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;

    let mut booked = MockSupabaseResponses::appointment_response(
        &patient_id.to_string(),
        &doctor_id.to_string(),
        date,
        "09:00:00",
        Some("09:30:00"),
        "active",
    );
    booked["priority"] = json!("emergency");
    booked["triage_assessment_id"] = json!(assessment_id);
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "priority": "emergency",
            "reason": "Severe chest pain",
            "triage_assessment_id": assessment_id
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([booked.clone()])))
        .expect(1)
        .mount(server)
        .await;

    booked
}

/// The cancellation that hands a just-booked slot back.
async fn expect_release(server: &MockServer, booked: &Value, times: u64) {
    let mut canceled = booked.clone();
    canceled["status"] = json!("canceled");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", booked["id"].as_str().unwrap())))
        .and(body_partial_json(json!({
            "status": "canceled",
            "notes": "Canceled by triage: Triage assignment did not complete"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([canceled])))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn assignment_books_with_assessment_priority() {
    let server = MockServer::start().await;
    let triage = TestUser::triage("triage@hospital.com");
    let assessment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let request = assignment(doctor_id);
    let date = request.appointment_date.to_string();

    let booked = mount_bookable(&server, assessment_id, patient_id, doctor_id, &date).await;
    expect_release(&server, &booked, 0).await;

    let mut assigned = assessment_row(assessment_id, Some(patient_id), "assigned");
    assigned["assigned_doctor_id"] = json!(doctor_id);
    assigned["appointment_id"] = booked["id"].clone();
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/triage_assessments"))
        .and(query_param("status", "eq.pending"))
        .and(body_partial_json(json!({"status": "assigned", "assigned_doctor_id": doctor_id})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([assigned])))
        .expect(1)
        .mount(&server)
        .await;

    let body = assign_doctor(
        State(TestConfig::with_supabase_url(server.uri()).to_arc()),
        Extension(triage.context("token")),
        Extension(producer()),
        Path(assessment_id),
        Json(request),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(body["assessment"]["status"], "assigned");
    assert_eq!(body["appointment"]["priority"], "emergency");
}

#[tokio::test]
async fn losing_a_concurrent_assignment_releases_the_slot() {
    let server = MockServer::start().await;
    let triage = TestUser::triage("triage@hospital.com");
    let assessment_id = Uuid::new_v4();
    let request = assignment(Uuid::new_v4());
    let date = request.appointment_date.to_string();

    let booked = mount_bookable(&server, assessment_id, Uuid::new_v4(), request.doctor_id, &date).await;
    expect_release(&server, &booked, 1).await;

    // Another triage user moved the assessment out of pending first.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/triage_assessments"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let result = assign_doctor(
        State(TestConfig::with_supabase_url(server.uri()).to_arc()),
        Extension(triage.context("token")),
        Extension(producer()),
        Path(assessment_id),
        Json(request),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(msg)) if msg == "Assessment is already assigned");
}

#[tokio::test]
async fn failed_assessment_update_releases_the_slot() {
    let server = MockServer::start().await;
    let triage = TestUser::triage("triage@hospital.com");
    let assessment_id = Uuid::new_v4();
    let request = assignment(Uuid::new_v4());
    let date = request.appointment_date.to_string();

    let booked = mount_bookable(&server, assessment_id, Uuid::new_v4(), request.doctor_id, &date).await;
    expect_release(&server, &booked, 1).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/triage_assessments"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let result = assign_doctor(
        State(TestConfig::with_supabase_url(server.uri()).to_arc()),
        Extension(triage.context("token")),
        Extension(producer()),
        Path(assessment_id),
        Json(request),
    )
    .await;

    assert_matches!(result, Err(AppError::Database(_)));
}

#[tokio::test]
async fn assigned_assessment_cannot_be_assigned_again() {
    let server = MockServer::start().await;
    let triage = TestUser::triage("triage@hospital.com");
    let assessment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/triage_assessments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            assessment_row(assessment_id, Some(Uuid::new_v4()), "assigned")
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let result = assign_doctor(
        State(TestConfig::with_supabase_url(server.uri()).to_arc()),
        Extension(triage.context("token")),
        Extension(producer()),
        Path(assessment_id),
        Json(assignment(Uuid::new_v4())),
    )
    .await;

    assert_matches!(result, Err(AppError::Conflict(_)));
}

#[tokio::test]
async fn unregistered_walk_in_cannot_be_booked() {
    let server = MockServer::start().await;
    let triage = TestUser::triage("triage@hospital.com");
    let assessment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/triage_assessments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            assessment_row(assessment_id, None, "pending")
        ])))
        .mount(&server)
        .await;

    let result = assign_doctor(
        State(TestConfig::with_supabase_url(server.uri()).to_arc()),
        Extension(triage.context("token")),
        Extension(producer()),
        Path(assessment_id),
        Json(assignment(Uuid::new_v4())),
    )
    .await;

    assert_matches!(result, Err(AppError::ValidationError(_)));
}
