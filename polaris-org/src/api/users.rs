//! User status endpoints
//!
//! `GET /user/user_idp` and `GET /user/get_user_status`, both keyed by
//! the user's email. Status derivation is a pure function so the
//! boundary cases (invitation window edges) stay testable.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use polaris_common::db::models::User;
use serde::Deserialize;
use serde_json::json;

use crate::db;
use crate::state::AppState;

/// Wire values of the user status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Active,
    PendingInvitation,
    InvitationExpired,
    PasswordExpired,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::PendingInvitation => "PENDING_INVITATION",
            UserStatus::InvitationExpired => "INVITATION_EXPIRED",
            UserStatus::PasswordExpired => "PASSWORD_EXPIRED",
        }
    }
}

/// Derive a user's status. A user who has logged in is active; an
/// invitation at or past the expiration window is expired; otherwise the
/// IdP's view of the temporary password decides between password-expired
/// and still-pending.
pub fn calculate_user_status(
    user: &User,
    expiration_days: i64,
    idp_password_expired: bool,
    now: chrono::DateTime<chrono::Utc>,
) -> UserStatus {
    if user.last_login.is_some() {
        return UserStatus::Active;
    }

    if let Some(sent_at) = user.invitation_sent_at {
        if now - sent_at >= chrono::Duration::days(expiration_days) {
            return UserStatus::InvitationExpired;
        }
    }

    if idp_password_expired {
        return UserStatus::PasswordExpired;
    }

    UserStatus::PendingInvitation
}

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

async fn load_user(state: &AppState, email: &str) -> Result<User, Response> {
    match db::users::get_by_email(&state.db, email).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown user" })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!(error = %e, "User lookup failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error" })),
            )
                .into_response())
        }
    }
}

async fn idp_password_expired(state: &AppState, user: &User) -> bool {
    let Some(username) = user.username.as_deref() else {
        return false;
    };
    let idp = state.idp.by_kind(user.idp);
    match idp.temp_password_expired(username).await {
        Ok(expired) => expired,
        Err(e) => {
            tracing::warn!(username = %username, error = %e, "IdP password status lookup failed");
            false
        }
    }
}

/// GET /user/user_idp?username=<email>
pub async fn user_idp(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> Response {
    let user = match load_user(&state, &query.username).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    let expiration_days =
        polaris_common::config::get_setting_i64(&state.db, "invitation_expiration_days", 30).await;
    let password_expired = idp_password_expired(&state, &user).await;
    let status = calculate_user_status(&user, expiration_days, password_expired, chrono::Utc::now());

    Json(json!({
        "idp": user.idp.as_str(),
        "expired": matches!(
            status,
            UserStatus::InvitationExpired | UserStatus::PasswordExpired
        ),
    }))
    .into_response()
}

/// GET /user/get_user_status?username=<email>
pub async fn get_user_status(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> Response {
    let user = match load_user(&state, &query.username).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    let expiration_days =
        polaris_common::config::get_setting_i64(&state.db, "invitation_expiration_days", 30).await;
    let password_expired = idp_password_expired(&state, &user).await;
    let status = calculate_user_status(&user, expiration_days, password_expired, chrono::Utc::now());

    Json(json!({ "status": status.as_str() })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polaris_common::db::models::{IdpKind, UserRole};
    use uuid::Uuid;

    fn user(
        last_login: Option<chrono::DateTime<chrono::Utc>>,
        invitation_sent_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> User {
        User {
            id: Uuid::new_v4(),
            tenant_id: None,
            email: "a@x.example".to_string(),
            username: Some("a@x.example".to_string()),
            first_name: "A".to_string(),
            last_name: "X".to_string(),
            role: UserRole::Member,
            idp: IdpKind::Cognito,
            is_active: false,
            last_login,
            invitation_sent_at,
            deleted_at: None,
            manager_user_id: None,
        }
    }

    #[test]
    fn logged_in_users_are_active() {
        let now = chrono::Utc::now();
        let u = user(Some(now), Some(now - chrono::Duration::days(90)));
        assert_eq!(
            calculate_user_status(&u, 30, false, now),
            UserStatus::Active
        );
    }

    #[test]
    fn invitation_expires_exactly_at_the_window() {
        let now = chrono::Utc::now();

        let at_window = user(None, Some(now - chrono::Duration::days(30)));
        assert_eq!(
            calculate_user_status(&at_window, 30, false, now),
            UserStatus::InvitationExpired
        );

        let inside_window = user(None, Some(now - chrono::Duration::days(29)));
        assert_eq!(
            calculate_user_status(&inside_window, 30, false, now),
            UserStatus::PendingInvitation
        );
    }

    #[test]
    fn idp_password_expiry_applies_inside_the_window() {
        let now = chrono::Utc::now();
        let u = user(None, Some(now - chrono::Duration::days(1)));
        assert_eq!(
            calculate_user_status(&u, 30, true, now),
            UserStatus::PasswordExpired
        );
    }

    #[test]
    fn never_invited_user_is_pending() {
        let now = chrono::Utc::now();
        let u = user(None, None);
        assert_eq!(
            calculate_user_status(&u, 30, false, now),
            UserStatus::PendingInvitation
        );
    }
}
