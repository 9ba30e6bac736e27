//! SCIM 2.0 user endpoints
//!
//! Machine-to-machine user provisioning, authenticated per tenant by an
//! api token passed as a bearer. Create and replace require
//! `emails[0].value`, `name.givenName`, `name.familyName` and
//! `externalId`; patch requires a non-empty `Operations` list.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use polaris_common::db::models::{ApiToken, User, UserRole};
use polaris_common::Error;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db;
use crate::state::AppState;

const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
const ERROR_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:Error";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScimName {
    #[serde(rename = "givenName")]
    pub given_name: Option<String>,
    #[serde(rename = "familyName")]
    pub family_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScimEmail {
    pub value: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScimUser {
    #[serde(default)]
    pub schemas: Vec<String>,
    pub id: Option<String>,
    #[serde(rename = "externalId")]
    pub external_id: Option<String>,
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
    pub name: Option<ScimName>,
    pub emails: Option<Vec<ScimEmail>>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ScimPatch {
    #[serde(rename = "Operations", default)]
    pub operations: Vec<ScimOperation>,
}

#[derive(Debug, Deserialize)]
pub struct ScimOperation {
    pub op: String,
    pub path: Option<String>,
    pub value: Option<Value>,
}

fn scim_error(status: StatusCode, detail: &str) -> Response {
    (
        status,
        Json(json!({
            "schemas": [ERROR_SCHEMA],
            "detail": detail,
            "status": status.as_u16().to_string(),
        })),
    )
        .into_response()
}

fn to_scim(user: &User) -> Value {
    json!({
        "schemas": [USER_SCHEMA],
        "id": user.id.to_string(),
        "externalId": Value::Null,
        "userName": user.email,
        "name": {
            "givenName": user.first_name,
            "familyName": user.last_name,
        },
        "emails": [{ "value": user.email, "primary": true }],
        "active": user.is_active,
    })
}

async fn load_external_id(state: &AppState, user_id: Uuid) -> Option<String> {
    sqlx::query_scalar("SELECT external_id FROM users WHERE id = ?")
        .bind(user_id.to_string())
        .fetch_optional(&state.db)
        .await
        .ok()
        .flatten()
}

async fn store_external_id(state: &AppState, user_id: Uuid, external_id: &str) {
    if let Err(e) = sqlx::query("UPDATE users SET external_id = ? WHERE id = ?")
        .bind(external_id)
        .bind(user_id.to_string())
        .execute(&state.db)
        .await
    {
        tracing::warn!(user_id = %user_id, error = %e, "external_id update failed");
    }
}

async fn render(state: &AppState, user: &User, status: StatusCode) -> Response {
    let mut body = to_scim(user);
    if let Some(external_id) = load_external_id(state, user.id).await {
        body["externalId"] = Value::String(external_id);
    }
    (status, Json(body)).into_response()
}

/// Resolve the bearer api token to its tenant
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<ApiToken, Response> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(bearer) = bearer else {
        return Err(scim_error(StatusCode::UNAUTHORIZED, "missing bearer token"));
    };
    let Ok(identifier) = Uuid::parse_str(bearer) else {
        return Err(scim_error(StatusCode::UNAUTHORIZED, "malformed bearer token"));
    };

    db::api_tokens::resolve(&state.db, identifier)
        .await
        .map_err(|_| scim_error(StatusCode::UNAUTHORIZED, "unknown bearer token"))
}

/// The create/replace validation contract
fn validate_user_payload(payload: &ScimUser) -> Result<(String, String, String, String), Response> {
    let email = payload
        .emails
        .as_ref()
        .and_then(|emails| emails.first())
        .and_then(|email| email.value.clone());
    let Some(email) = email else {
        return Err(scim_error(StatusCode::BAD_REQUEST, "emails[0].value is required"));
    };

    let given = payload.name.as_ref().and_then(|n| n.given_name.clone());
    let Some(given) = given else {
        return Err(scim_error(StatusCode::BAD_REQUEST, "name.givenName is required"));
    };

    let family = payload.name.as_ref().and_then(|n| n.family_name.clone());
    let Some(family) = family else {
        return Err(scim_error(StatusCode::BAD_REQUEST, "name.familyName is required"));
    };

    let Some(external_id) = payload.external_id.clone() else {
        return Err(scim_error(StatusCode::BAD_REQUEST, "externalId is required"));
    };

    Ok((email, given, family, external_id))
}

/// POST /scim/v2/Users
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ScimUser>,
) -> Response {
    let token = match authenticate(&state, &headers).await {
        Ok(token) => token,
        Err(response) => return response,
    };
    let (email, given, family, external_id) = match validate_user_payload(&payload) {
        Ok(fields) => fields,
        Err(response) => return response,
    };

    let idp = match state.idp.for_tenant(&state.db, token.tenant_id).await {
        Ok(idp) => idp,
        Err(e) => {
            tracing::error!(error = %e, "IdP selection failed");
            return scim_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    };

    let created = db::users::insert(
        &state.db,
        &db::users::NewUser {
            tenant_id: Some(token.tenant_id),
            email: email.clone(),
            first_name: given,
            last_name: family,
            role: UserRole::Member,
            idp: idp.kind(),
            is_active: payload.active.unwrap_or(true),
        },
    )
    .await;

    match created {
        Ok(user) => {
            store_external_id(&state, user.id, &external_id).await;
            render(&state, &user, StatusCode::CREATED).await
        }
        Err(Error::Duplicate(detail)) => scim_error(StatusCode::CONFLICT, &detail),
        Err(e) => {
            tracing::error!(error = %e, "SCIM create failed");
            scim_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

async fn load_tenant_user(
    state: &AppState,
    token: &ApiToken,
    id: &str,
) -> Result<User, Response> {
    let Ok(user_id) = Uuid::parse_str(id) else {
        return Err(scim_error(StatusCode::NOT_FOUND, "unknown user"));
    };
    match db::users::get(&state.db, user_id).await {
        Ok(Some(user)) if user.tenant_id == Some(token.tenant_id) => Ok(user),
        Ok(_) => Err(scim_error(StatusCode::NOT_FOUND, "unknown user")),
        Err(e) => {
            tracing::error!(error = %e, "SCIM lookup failed");
            Err(scim_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
    }
}

/// GET /scim/v2/Users/:id
pub async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let token = match authenticate(&state, &headers).await {
        Ok(token) => token,
        Err(response) => return response,
    };
    match load_tenant_user(&state, &token, &id).await {
        Ok(user) => render(&state, &user, StatusCode::OK).await,
        Err(response) => response,
    }
}

/// PUT /scim/v2/Users/:id
pub async fn replace_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<ScimUser>,
) -> Response {
    let token = match authenticate(&state, &headers).await {
        Ok(token) => token,
        Err(response) => return response,
    };
    let user = match load_tenant_user(&state, &token, &id).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    let (email, given, family, external_id) = match validate_user_payload(&payload) {
        Ok(fields) => fields,
        Err(response) => return response,
    };

    let active = payload.active.unwrap_or(user.is_active);
    let result = sqlx::query(
        r#"
        UPDATE users
        SET email = ?, first_name = ?, last_name = ?, is_active = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&email)
    .bind(&given)
    .bind(&family)
    .bind(active as i64)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(user.id.to_string())
    .execute(&state.db)
    .await;

    if let Err(e) = result {
        tracing::error!(error = %e, "SCIM replace failed");
        return scim_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
    }
    store_external_id(&state, user.id, &external_id).await;

    match db::users::get(&state.db, user.id).await {
        Ok(Some(user)) => render(&state, &user, StatusCode::OK).await,
        _ => scim_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
    }
}

/// PATCH /scim/v2/Users/:id
pub async fn patch_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<ScimPatch>,
) -> Response {
    let token = match authenticate(&state, &headers).await {
        Ok(token) => token,
        Err(response) => return response,
    };
    if patch.operations.is_empty() {
        return scim_error(StatusCode::BAD_REQUEST, "Operations must not be empty");
    }
    let user = match load_tenant_user(&state, &token, &id).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    for operation in &patch.operations {
        if !operation.op.eq_ignore_ascii_case("replace") {
            return scim_error(
                StatusCode::BAD_REQUEST,
                &format!("unsupported operation '{}'", operation.op),
            );
        }

        // "active" arrives either as {path: "active", value: bool} or as
        // {value: {"active": bool}}
        let active = match (&operation.path, &operation.value) {
            (Some(path), Some(Value::Bool(value))) if path == "active" => Some(*value),
            (None, Some(Value::Object(map))) => map.get("active").and_then(Value::as_bool),
            _ => None,
        };

        let Some(active) = active else {
            return scim_error(StatusCode::BAD_REQUEST, "unsupported patch target");
        };

        let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active as i64)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(user.id.to_string())
            .execute(&state.db)
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "SCIM patch failed");
            return scim_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    }

    match db::users::get(&state.db, user.id).await {
        Ok(Some(user)) => render(&state, &user, StatusCode::OK).await,
        _ => scim_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
    }
}
