// HTTP-level tests for the clinic auth API
// Drives the full router (rate limiter, guard, handlers) over the in-memory store

use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};

use crate::auth::{
    clock::{Clock, ManualClock},
    memory_store::InMemoryCredentialStore,
    models::{AuthResponse, RefreshResponse, Registration, Role, SubjectProfile},
    password::PasswordHasher,
    service::SessionService,
    token::TokenService,
};
use crate::config::default_rate_limits;
use crate::rate_limit::RateLimiter;
use crate::routes::{create_router, AppState};

// ============================================================================
// Test Helpers
// ============================================================================

const PASSWORD: &str = "correct horse battery";

struct TestApp {
    server: TestServer,
    sessions: Arc<SessionService>,
    clock: Arc<ManualClock>,
}

/// Build the full router over an in-memory store and a manual clock
fn create_test_app() -> TestApp {
    let clock = Arc::new(ManualClock::default());
    let shared_clock: Arc<dyn Clock> = clock.clone();

    let tokens = Arc::new(
        TokenService::new(
            "http_test_access_secret",
            "http_test_refresh_secret",
            std::time::Duration::from_secs(900),
            std::time::Duration::from_secs(604800),
            shared_clock.clone(),
        )
        .unwrap(),
    );
    // Cheap argon2 parameters keep the suite fast
    let hasher = PasswordHasher::new(1, 1024, 8).unwrap();

    let sessions = Arc::new(SessionService::new(
        Arc::new(InMemoryCredentialStore::new()),
        hasher,
        tokens,
        true,
    ));
    let limiter = Arc::new(RateLimiter::new(shared_clock, default_rate_limits()));

    let app = create_router(AppState::new(sessions.clone(), limiter));

    TestApp {
        server: TestServer::new(app).unwrap(),
        sessions,
        clock,
    }
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

fn registration_payload(email: &str) -> Value {
    json!({
        "email": email,
        "password": PASSWORD,
        "name": "Ada Lovelace",
        "phone": "+44 20 7946 0000",
        "role": "patient"
    })
}

async fn register(app: &TestApp, email: &str) -> AuthResponse {
    let response = app
        .server
        .post("/api/auth/register")
        .json(&registration_payload(email))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED, "{}", response.text());
    response.json::<AuthResponse>()
}

async fn seed_admin(app: &TestApp) -> AuthResponse {
    app.sessions
        .register(Registration {
            email: "admin@clinic.test".to_string(),
            password: PASSWORD.to_string(),
            name: "Clinic Admin".to_string(),
            phone: None,
            role: Role::Admin,
        })
        .await
        .unwrap()
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_returns_tokens_and_profile() {
    let app = create_test_app();

    let auth = register(&app, "  Ada@Clinic.TEST ").await;

    assert!(!auth.access_token.is_empty());
    assert!(!auth.refresh_token.is_empty());
    assert_eq!(auth.subject.email, "ada@clinic.test");
    assert_eq!(auth.subject.role, Role::User);
    assert!(auth.subject.is_active);
}

#[tokio::test]
async fn test_register_padded_email_can_log_in_normalized() {
    let app = create_test_app();
    register(&app, "  Grace@Clinic.TEST\t").await;

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({"email": "grace@clinic.test", "password": PASSWORD}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_malformed_email_rejected() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/auth/register")
        .json(&registration_payload("  not-an-address  "))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_response_never_exposes_password_hash() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/auth/register")
        .json(&registration_payload("hash@clinic.test"))
        .await;

    let body = response.text();
    assert!(!body.contains("password"));
    assert!(!body.contains("argon2"));
}

#[tokio::test]
async fn test_register_duplicate_email_conflict() {
    let app = create_test_app();
    register(&app, "dup@clinic.test").await;

    let response = app
        .server
        .post("/api/auth/register")
        .json(&registration_payload("DUP@clinic.test"))
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_short_password_rejected() {
    let app = create_test_app();

    let response = app
        .server
        .post("/api/auth/register")
        .json(&json!({
            "email": "short@clinic.test",
            "password": "abc",
            "name": "Shorty"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_admin_role_rejected() {
    let app = create_test_app();

    let mut payload = registration_payload("sneaky@clinic.test");
    payload["role"] = json!("admin");
    let response = app.server.post("/api/auth/register").json(&payload).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_success() {
    let app = create_test_app();
    register(&app, "login@clinic.test").await;

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({"email": "LOGIN@clinic.test", "password": PASSWORD}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let auth: AuthResponse = response.json();
    assert_eq!(auth.subject.email, "login@clinic.test");
}

#[tokio::test]
async fn test_unknown_email_and_wrong_password_are_indistinguishable() {
    let app = create_test_app();
    register(&app, "known@clinic.test").await;

    let unknown = app
        .server
        .post("/api/auth/login")
        .json(&json!({"email": "nobody@clinic.test", "password": PASSWORD}))
        .await;
    let wrong = app
        .server
        .post("/api/auth/login")
        .json(&json!({"email": "known@clinic.test", "password": "not the password"}))
        .await;

    assert_eq!(unknown.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.text(), wrong.text());
}

#[tokio::test]
async fn test_login_rate_limited_with_retry_after() {
    let app = create_test_app();
    let attempt = json!({"email": "flood@clinic.test", "password": "whatever-it-is"});

    for _ in 0..5 {
        let response = app.server.post("/api/auth/login").json(&attempt).await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    }

    let response = app.server.post("/api/auth/login").json(&attempt).await;
    assert_eq!(response.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.header(header::RETRY_AFTER), "60");
    let body: Value = response.json();
    assert_eq!(body["retry_after"], 60);

    // A new window opens once the old one has ended
    app.clock.advance(chrono::Duration::seconds(60));
    let response = app.server.post("/api/auth/login").json(&attempt).await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_budget_is_separate_from_register_budget() {
    let app = create_test_app();
    let attempt = json!({"email": "mix@clinic.test", "password": "whatever-it-is"});

    for _ in 0..6 {
        app.server.post("/api/auth/login").json(&attempt).await;
    }

    let response = app
        .server
        .post("/api/auth/register")
        .json(&registration_payload("mix@clinic.test"))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
}

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_issues_new_access_token() {
    let app = create_test_app();
    let auth = register(&app, "refresh@clinic.test").await;

    let response = app
        .server
        .post("/api/auth/refresh")
        .json(&json!({"refresh_token": auth.refresh_token}))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let refreshed: RefreshResponse = response.json();
    assert!(!refreshed.access_token.is_empty());
    assert!(refreshed.refresh_token.is_some());
}

#[tokio::test]
async fn test_refresh_with_access_token_rejected() {
    let app = create_test_app();
    let auth = register(&app, "kinds@clinic.test").await;

    let response = app
        .server
        .post("/api/auth/refresh")
        .json(&json!({"refresh_token": auth.access_token}))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_after_expiry_rejected() {
    let app = create_test_app();
    let auth = register(&app, "expiry@clinic.test").await;

    app.clock.advance(chrono::Duration::days(7) + chrono::Duration::seconds(1));

    let response = app
        .server
        .post("/api/auth/refresh")
        .json(&json!({"refresh_token": auth.refresh_token}))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Protected routes
// ============================================================================

#[tokio::test]
async fn test_me_returns_current_subject() {
    let app = create_test_app();
    let auth = register(&app, "me@clinic.test").await;

    let response = app
        .server
        .get("/api/auth/me")
        .add_header(header::AUTHORIZATION, bearer(&auth.access_token))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let profile: SubjectProfile = response.json();
    assert_eq!(profile.id, auth.subject.id);
    assert_eq!(profile.name, "Ada Lovelace");
}

#[tokio::test]
async fn test_me_without_token_unauthorized() {
    let app = create_test_app();

    let response = app.server.get("/api/auth/me").await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_with_refresh_token_unauthorized() {
    let app = create_test_app();
    let auth = register(&app, "wrongkind@clinic.test").await;

    let response = app
        .server
        .get("/api/auth/me")
        .add_header(header::AUTHORIZATION, bearer(&auth.refresh_token))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_access_token_unauthorized() {
    let app = create_test_app();
    let auth = register(&app, "stale@clinic.test").await;

    app.clock.advance(chrono::Duration::seconds(901));

    let response = app
        .server
        .get("/api/auth/me")
        .add_header(header::AUTHORIZATION, bearer(&auth.access_token))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_requires_authentication() {
    let app = create_test_app();
    let auth = register(&app, "bye@clinic.test").await;

    let anonymous = app.server.post("/api/auth/logout").await;
    assert_eq!(anonymous.status_code(), StatusCode::UNAUTHORIZED);

    let response = app
        .server
        .post("/api/auth/logout")
        .add_header(header::AUTHORIZATION, bearer(&auth.access_token))
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_change_password_flow() {
    let app = create_test_app();
    let auth = register(&app, "rotate@clinic.test").await;

    let response = app
        .server
        .post("/api/auth/change-password")
        .add_header(header::AUTHORIZATION, bearer(&auth.access_token))
        .json(&json!({
            "current_password": PASSWORD,
            "new_password": "an entirely new secret"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);

    let old = app
        .server
        .post("/api/auth/login")
        .json(&json!({"email": "rotate@clinic.test", "password": PASSWORD}))
        .await;
    assert_eq!(old.status_code(), StatusCode::UNAUTHORIZED);

    let new = app
        .server
        .post("/api/auth/login")
        .json(&json!({"email": "rotate@clinic.test", "password": "an entirely new secret"}))
        .await;
    assert_eq!(new.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_wrong_current_rejected() {
    let app = create_test_app();
    let auth = register(&app, "guess@clinic.test").await;

    let response = app
        .server
        .post("/api/auth/change-password")
        .add_header(header::AUTHORIZATION, bearer(&auth.access_token))
        .json(&json!({
            "current_password": "not my password",
            "new_password": "an entirely new secret"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Administration
// ============================================================================

#[tokio::test]
async fn test_non_admin_cannot_change_status() {
    let app = create_test_app();
    let auth = register(&app, "patient@clinic.test").await;

    let response = app
        .server
        .patch(&format!("/api/admin/subjects/{}/status", auth.subject.id))
        .add_header(header::AUTHORIZATION, bearer(&auth.access_token))
        .json(&json!({"is_active": false}))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_deactivated_subject_cannot_refresh_or_login() {
    let app = create_test_app();
    let admin = seed_admin(&app).await;
    let patient = register(&app, "leaving@clinic.test").await;

    let response = app
        .server
        .patch(&format!("/api/admin/subjects/{}/status", patient.subject.id))
        .add_header(header::AUTHORIZATION, bearer(&admin.access_token))
        .json(&json!({"is_active": false}))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let profile: SubjectProfile = response.json();
    assert!(!profile.is_active);

    let refresh = app
        .server
        .post("/api/auth/refresh")
        .json(&json!({"refresh_token": patient.refresh_token}))
        .await;
    assert_eq!(refresh.status_code(), StatusCode::UNAUTHORIZED);

    let login = app
        .server
        .post("/api/auth/login")
        .json(&json!({"email": "leaving@clinic.test", "password": PASSWORD}))
        .await;
    assert_eq!(login.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_status_change_for_unknown_subject_not_found() {
    let app = create_test_app();
    let admin = seed_admin(&app).await;

    let response = app
        .server
        .patch(&format!("/api/admin/subjects/{}/status", uuid::Uuid::new_v4()))
        .add_header(header::AUTHORIZATION, bearer(&admin.access_token))
        .json(&json!({"is_active": false}))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
