use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nurse_cell::handlers::*;
use nurse_cell::models::*;
use shared_models::{error::AppError, lifecycle::RecordState};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

#[tokio::test]
async fn admin_assigns_doctors_deduplicated() {
    let server = MockServer::start().await;
    let admin = TestUser::admin("admin@hospital.com");
    let nurse_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/nurses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::nurse_response(&nurse_id.to_string())
        ])))
        .mount(&server)
        .await;

    let mut updated = MockSupabaseResponses::nurse_response(&nurse_id.to_string());
    updated["assigned_doctor_ids"] = json!([doctor_id]);
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/nurses"))
        .and(body_partial_json(json!({"assigned_doctor_ids": [doctor_id]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([updated])))
        .expect(1)
        .mount(&server)
        .await;

    let body = assign_doctors(
        State(TestConfig::with_supabase_url(server.uri()).to_arc()),
        Extension(admin.context("token")),
        Path(nurse_id),
        Json(AssignDoctorsRequest { doctor_ids: vec![doctor_id, doctor_id] }),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(body["nurse"]["assigned_doctor_ids"][0], doctor_id.to_string());
}

#[tokio::test]
async fn deactivating_a_nurse_clears_patient_assignment() {
    let server = MockServer::start().await;
    let admin = TestUser::admin("admin@hospital.com");
    let nurse_id = Uuid::new_v4();

    let mut busy = MockSupabaseResponses::nurse_response(&nurse_id.to_string());
    busy["assigned_patient_id"] = json!(Uuid::new_v4());
    Mock::given(method("GET"))
        .and(path("/rest/v1/nurses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([busy])))
        .mount(&server)
        .await;

    let mut deactivated = MockSupabaseResponses::nurse_response(&nurse_id.to_string());
    deactivated["state"] = json!("deactivated");
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/nurses"))
        .and(body_partial_json(json!({"state": "deactivated", "assigned_patient_id": null})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([deactivated])))
        .expect(1)
        .mount(&server)
        .await;

    let body = change_nurse_state(
        State(TestConfig::with_supabase_url(server.uri()).to_arc()),
        Extension(admin.context("token")),
        Path(nurse_id),
        Json(ChangeNurseStateRequest { state: RecordState::Deactivated }),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(body["nurse"]["state"], "deactivated");
}

#[tokio::test]
async fn nurse_listing_defaults_to_active() {
    let server = MockServer::start().await;
    let doctor = TestUser::doctor("doc@hospital.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/nurses"))
        .and(query_param("state", "eq.active"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::nurse_response(&Uuid::new_v4().to_string()),
            MockSupabaseResponses::nurse_response(&Uuid::new_v4().to_string())
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let body = list_nurses(
        State(TestConfig::with_supabase_url(server.uri()).to_arc()),
        Extension(doctor.context("token")),
        Query(NurseListQuery::default()),
    )
    .await
    .unwrap()
    .0;

    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn patients_cannot_list_nurses() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("p@example.com");

    let result = list_nurses(
        State(TestConfig::with_supabase_url(server.uri()).to_arc()),
        Extension(patient.context("token")),
        Query(NurseListQuery::default()),
    )
    .await;

    assert_matches!(result, Err(AppError::Forbidden(_)));
}

#[test]
fn assignment_to_other_patient_is_detected() {
    let patient_a = Uuid::new_v4();
    let mut nurse: Nurse =
        serde_json::from_value(MockSupabaseResponses::nurse_response(&Uuid::new_v4().to_string())).unwrap();
    assert!(!nurse.is_assigned_to_other_patient(patient_a));

    nurse.assigned_patient_id = Some(patient_a);
    assert!(!nurse.is_assigned_to_other_patient(patient_a));
    assert!(nurse.is_assigned_to_other_patient(Uuid::new_v4()));
}
