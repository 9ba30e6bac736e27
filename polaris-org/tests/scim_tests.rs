//! Integration tests for the SCIM user endpoints

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use polaris_org::db;
use polaris_org::state::AppState;
use polaris_org::build_router;

async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn tenant_token(state: &AppState) -> String {
    let tenant = db::tenants::insert(
        &state.db,
        &db::tenants::NewTenant {
            name: "Acme".to_string(),
            website: None,
            tier: None,
            sfdc_id: None,
            csm_user_id: None,
            ca_user_id: None,
            contract_sign_date: None,
            is_internal: false,
        },
    )
    .await
    .unwrap();
    let token = db::api_tokens::create(&state.db, tenant.id, "scim")
        .await
        .unwrap();
    token.token_identifier.to_string()
}

fn scim_user_payload() -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
        "externalId": "ext-123",
        "userName": "ada@acme.example",
        "name": { "givenName": "Ada", "familyName": "Li" },
        "emails": [{ "value": "ada@acme.example", "primary": true }],
        "active": true
    })
}

fn scim_request(method: &str, uri: &str, token: &str, body: Option<&Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn create_then_get_roundtrip() {
    let state = common::test_state().await;
    let token = tenant_token(&state).await;

    let app = build_router(state.clone());
    let response = app
        .oneshot(scim_request("POST", "/scim/v2/Users", &token, Some(&scim_user_payload())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response.into_body()).await;
    assert_eq!(created["userName"], "ada@acme.example");
    assert_eq!(created["externalId"], "ext-123");
    let id = created["id"].as_str().unwrap().to_string();

    let app = build_router(state);
    let response = app
        .oneshot(scim_request("GET", &format!("/scim/v2/Users/{id}"), &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response.into_body()).await;
    assert_eq!(fetched["name"]["givenName"], "Ada");
    assert_eq!(fetched["active"], true);
}

#[tokio::test]
async fn create_requires_the_contract_fields() {
    let state = common::test_state().await;
    let token = tenant_token(&state).await;

    for missing in ["externalId", "name", "emails"] {
        let mut payload = scim_user_payload();
        payload.as_object_mut().unwrap().remove(missing);

        let app = build_router(state.clone());
        let response = app
            .oneshot(scim_request("POST", "/scim/v2/Users", &token, Some(&payload)))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "missing {missing} should 400"
        );
        let body = body_json(response.into_body()).await;
        assert_eq!(
            body["schemas"][0],
            "urn:ietf:params:scim:api:messages:2.0:Error"
        );
    }
}

#[tokio::test]
async fn patch_requires_operations_and_toggles_active() {
    let state = common::test_state().await;
    let token = tenant_token(&state).await;

    let app = build_router(state.clone());
    let response = app
        .oneshot(scim_request("POST", "/scim/v2/Users", &token, Some(&scim_user_payload())))
        .await
        .unwrap();
    let id = body_json(response.into_body()).await["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Empty operations list is rejected
    let app = build_router(state.clone());
    let response = app
        .oneshot(scim_request(
            "PATCH",
            &format!("/scim/v2/Users/{id}"),
            &token,
            Some(&json!({ "Operations": [] })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Deactivate through replace
    let app = build_router(state.clone());
    let response = app
        .oneshot(scim_request(
            "PATCH",
            &format!("/scim/v2/Users/{id}"),
            &token,
            Some(&json!({
                "Operations": [{ "op": "replace", "path": "active", "value": false }]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response.into_body()).await;
    assert_eq!(body["active"], false);
}

#[tokio::test]
async fn unknown_bearer_is_unauthorized() {
    let state = common::test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(scim_request(
            "POST",
            "/scim/v2/Users",
            &uuid::Uuid::new_v4().to_string(),
            Some(&scim_user_payload()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tokens_scope_users_to_their_tenant() {
    let state = common::test_state().await;
    let token_a = tenant_token(&state).await;

    // A second tenant with its own token
    let tenant_b = db::tenants::insert(
        &state.db,
        &db::tenants::NewTenant {
            name: "Globex".to_string(),
            website: None,
            tier: None,
            sfdc_id: None,
            csm_user_id: None,
            ca_user_id: None,
            contract_sign_date: None,
            is_internal: false,
        },
    )
    .await
    .unwrap();
    let token_b = db::api_tokens::create(&state.db, tenant_b.id, "scim")
        .await
        .unwrap()
        .token_identifier
        .to_string();

    let app = build_router(state.clone());
    let response = app
        .oneshot(scim_request("POST", "/scim/v2/Users", &token_a, Some(&scim_user_payload())))
        .await
        .unwrap();
    let id = body_json(response.into_body()).await["id"]
        .as_str()
        .unwrap()
        .to_string();

    // The other tenant's token cannot see the user
    let app = build_router(state);
    let response = app
        .oneshot(scim_request("GET", &format!("/scim/v2/Users/{id}"), &token_b, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
