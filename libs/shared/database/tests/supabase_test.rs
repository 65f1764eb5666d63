use reqwest::Method;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_database::{SupabaseClient, SupabaseError};

fn config_for(server: &MockServer) -> AppConfig {
    AppConfig {
        supabase_url: server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
        supabase_jwt_secret: "secret".to_string(),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn request_sends_api_key_and_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", "eq.42"))
        .and(header("apikey", "test-anon-key"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 42}])))
        .expect(1)
        .mount(&server)
        .await;

    let client = SupabaseClient::new(&config_for(&server));
    let rows: Vec<Value> = client
        .request(Method::GET, "/rest/v1/doctors?id=eq.42", Some("user-token"), None)
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], 42);
}

#[tokio::test]
async fn request_returning_sets_prefer_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(header("prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": "a"}])))
        .mount(&server)
        .await;

    let client = SupabaseClient::new(&config_for(&server));
    let rows = client
        .request_returning(Method::POST, "/rest/v1/appointments", Some("t"), json!({"x": 1}))
        .await
        .unwrap();

    assert_eq!(rows[0]["id"], "a");
}

#[tokio::test]
async fn exclusion_violation_surfaces_as_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23P01",
            "message": "conflicting key value violates exclusion constraint"
        })))
        .mount(&server)
        .await;

    let client = SupabaseClient::new(&config_for(&server));
    let err = client
        .request_returning(Method::POST, "/rest/v1/appointments", Some("t"), json!({}))
        .await
        .unwrap_err();

    assert!(err.is_conflict());
}

#[tokio::test]
async fn empty_body_decodes_as_unit() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/availability_windows"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = SupabaseClient::new(&config_for(&server));
    let result: Result<(), SupabaseError> = client
        .request(Method::DELETE, "/rest/v1/availability_windows?id=eq.1", Some("t"), None)
        .await;

    assert!(result.is_ok());
}
