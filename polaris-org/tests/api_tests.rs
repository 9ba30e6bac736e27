//! Integration tests for the HTTP API
//!
//! Exercises the Salesforce webhook decision tree end to end against the
//! router, plus the user status endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use polaris_common::db::models::{IdpKind, TenantState, UserRole};
use polaris_org::db;
use polaris_org::{build_router, AppState};

async fn body_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(body: Body) -> Value {
    serde_json::from_str(&body_string(body).await).unwrap()
}

fn webhook_request(secret: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/organization/salesforce")
        .header("Authorization", secret)
        .header("Content-Type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn acme_payload() -> Value {
    json!({
        "Account_ID_18_char__c": "abc123",
        "Name": "Acme",
        "Website": "https://acme.example",
        "Compliance_Architect__r": {"Email": "ca@x"},
        "Customer_Success_Manager__r": {"Email": "csm@x"},
        "Current_Contract_Start_Date_Auto__c": "2024-01-10 00:00:00",
        "Account_Status__c": "Customer",
        "LastModifiedById": "u1"
    })
}

/// CSM and CA users that the payload references
async fn seed_internal_users(state: &AppState) {
    for (email, first) in [("csm@x", "Casey"), ("ca@x", "Ari")] {
        db::users::insert(
            &state.db,
            &db::users::NewUser {
                tenant_id: None,
                email: email.to_string(),
                first_name: first.to_string(),
                last_name: "Polaris".to_string(),
                role: UserRole::Concierge,
                idp: IdpKind::Cognito,
                is_active: true,
            },
        )
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn health_endpoint_is_public() {
    let state = common::test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "polaris-org");
}

#[tokio::test]
async fn webhook_rejects_bad_secret() {
    let state = common::test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(webhook_request("wrong-secret", &acme_payload()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_rejects_wrong_method() {
    let state = common::test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/organization/salesforce")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn webhook_reports_missing_fields() {
    let state = common::test_state().await;
    let app = build_router(state);

    let mut payload = acme_payload();
    payload.as_object_mut().unwrap().remove("Website");

    let response = app
        .oneshot(webhook_request("test-webhook-secret", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_string(response.into_body()).await;
    assert!(body.contains("Website"));
}

#[tokio::test]
async fn webhook_creates_tenant_with_super_admins() {
    let state = common::test_state().await;
    seed_internal_users(&state).await;
    let app = build_router(state.clone());

    let response = app
        .oneshot(webhook_request("test-webhook-secret", &acme_payload()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Response body is the bare tenant UUID
    let body = body_string(response.into_body()).await;
    let tenant_id = Uuid::parse_str(body.trim()).unwrap();

    let tenant = db::tenants::get(&state.db, tenant_id).await.unwrap().unwrap();
    assert_eq!(tenant.name, "Acme");
    assert_eq!(tenant.state, TenantState::Onboarding);
    assert_eq!(tenant.sfdc_id.as_deref(), Some("abc123"));

    // Plus-addressed super-admin identities for CSM and CA
    for email in ["csm+acme@x", "ca+acme@x"] {
        let admin = db::users::get_by_email(&state.db, email)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("missing super-admin {email}"));
        assert_eq!(admin.role, UserRole::SuperAdmin);
        assert_eq!(admin.tenant_id, Some(tenant_id));
        assert!(admin.username.is_some());
    }

    // Creation side effects
    assert_eq!(
        db::content::library::default_template_count(&state.db, tenant_id)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        db::content::misc::drive_count(&state.db, tenant_id)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn webhook_replay_is_idempotent() {
    let state = common::test_state().await;
    seed_internal_users(&state).await;

    let app = build_router(state.clone());
    let first = app
        .oneshot(webhook_request("test-webhook-secret", &acme_payload()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first_id = body_string(first.into_body()).await;

    let app = build_router(state.clone());
    let second = app
        .oneshot(webhook_request("test-webhook-secret", &acme_payload()))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second_id = body_string(second.into_body()).await;

    assert_eq!(first_id, second_id);

    // Exactly one tenant and one pair of super-admins
    let tenants: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenants")
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(tenants, 1);
    let admins: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'SuperAdmin'")
            .fetch_one(&state.db)
            .await
            .unwrap();
    assert_eq!(admins, 2);
}

#[tokio::test]
async fn webhook_promotes_trial_to_active_without_new_users() {
    let state = common::test_state().await;
    seed_internal_users(&state).await;

    // First delivery creates the tenant as an active trial
    let mut trial = acme_payload();
    trial["Account_Status__c"] = json!("Active Trial");
    let app = build_router(state.clone());
    let response = app
        .oneshot(webhook_request("test-webhook-secret", &trial))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let tenant_id = Uuid::parse_str(body_string(response.into_body()).await.trim()).unwrap();

    // New tenants start in onboarding; move this one to trial directly
    db::tenants::set_state(&state.db, tenant_id, TenantState::Trial)
        .await
        .unwrap();
    let users_before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await
        .unwrap();

    // The customer conversion arrives
    let app = build_router(state.clone());
    let response = app
        .oneshot(webhook_request("test-webhook-secret", &acme_payload()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let tenant = db::tenants::get(&state.db, tenant_id).await.unwrap().unwrap();
    assert_eq!(tenant.state, TenantState::Active);

    let users_after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(users_before, users_after);
}

#[tokio::test]
async fn webhook_rejects_unknown_account_status() {
    let state = common::test_state().await;
    seed_internal_users(&state).await;

    let mut payload = acme_payload();
    payload["Account_Status__c"] = json!("Prospect");

    let app = build_router(state.clone());
    let response = app
        .oneshot(webhook_request("test-webhook-secret", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_string(response.into_body()).await;
    assert!(body.contains("unknown account status"));

    let tenants: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenants")
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(tenants, 0);
}

#[tokio::test]
async fn user_status_reflects_invitation_window() {
    let state = common::test_state().await;

    let user = db::users::insert(
        &state.db,
        &db::users::NewUser {
            tenant_id: None,
            email: "pending@x.example".to_string(),
            first_name: "P".to_string(),
            last_name: "X".to_string(),
            role: UserRole::Member,
            idp: IdpKind::Cognito,
            is_active: false,
        },
    )
    .await
    .unwrap();

    // Invited 30 days ago, never logged in
    let sent = (chrono::Utc::now() - chrono::Duration::days(30)).to_rfc3339();
    sqlx::query("UPDATE users SET invitation_sent_at = ? WHERE id = ?")
        .bind(&sent)
        .bind(user.id.to_string())
        .execute(&state.db)
        .await
        .unwrap();

    let app = build_router(state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/user/get_user_status?username=pending@x.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["status"], "INVITATION_EXPIRED");

    // One day inside the window reads as pending
    let sent = (chrono::Utc::now() - chrono::Duration::days(29)).to_rfc3339();
    sqlx::query("UPDATE users SET invitation_sent_at = ? WHERE id = ?")
        .bind(&sent)
        .bind(user.id.to_string())
        .execute(&state.db)
        .await
        .unwrap();

    let app = build_router(state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/user/get_user_status?username=pending@x.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response.into_body()).await;
    assert_eq!(body["status"], "PENDING_INVITATION");
}

#[tokio::test]
async fn user_idp_endpoint_reports_backend() {
    let state = common::test_state().await;

    db::users::insert(
        &state.db,
        &db::users::NewUser {
            tenant_id: None,
            email: "okta-user@x.example".to_string(),
            first_name: "O".to_string(),
            last_name: "X".to_string(),
            role: UserRole::Member,
            idp: IdpKind::Okta,
            is_active: true,
        },
    )
    .await
    .unwrap();

    let app = build_router(state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/user/user_idp?username=okta-user@x.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["idp"], "OKTA");
    assert_eq!(body["expired"], false);
}

#[tokio::test]
async fn unknown_user_is_404() {
    let state = common::test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/user/get_user_status?username=ghost@x.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_key_is_enforced_when_configured() {
    let mut state = common::test_state().await;
    state.api_key = "sekrit".to_string();
    let app = build_router(state.clone());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/user/get_user_status?username=a@x.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/user/get_user_status?username=a@x.example")
                .header("X-Api-Key", "sekrit")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    // Authenticated but the user does not exist
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
