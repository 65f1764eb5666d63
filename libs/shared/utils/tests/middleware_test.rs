use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Extension, Router,
};
use tower::ServiceExt;

use shared_models::auth::RequestContext;
use shared_utils::extractor::auth_middleware;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn app(config: &TestConfig) -> Router {
    let state = config.to_arc();
    Router::new()
        .route(
            "/whoami",
            get(|Extension(ctx): Extension<RequestContext>| async move {
                format!("{}:{}", ctx.role, ctx.user_id())
            }),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

#[tokio::test]
async fn valid_token_builds_request_context() {
    let config = TestConfig::default();
    let user = TestUser::triage("triage@hospital.com");
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(1));

    let response = app(&config)
        .oneshot(
            Request::builder()
                .uri("/whoami")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(String::from_utf8(body.to_vec()).unwrap(), format!("triage:{}", user.id));
}

#[tokio::test]
async fn missing_header_is_unauthorized() {
    let config = TestConfig::default();
    let response = app(&config)
        .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let config = TestConfig::default();
    let user = TestUser::admin("admin@hospital.com");
    let token = JwtTestUtils::create_expired_token(&user, &config.jwt_secret);

    let response = app(&config)
        .oneshot(
            Request::builder()
                .uri("/whoami")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_role_is_unauthorized() {
    let config = TestConfig::default();
    let user = TestUser::new("janitor@hospital.com", "janitor");
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(1));

    let response = app(&config)
        .oneshot(
            Request::builder()
                .uri("/whoami")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
