//! User database operations
//!
//! The IdP is the source of truth for usernames; this table reconciles
//! them after provisioning calls.

use polaris_common::db::models::{IdpKind, User, UserRole};
use polaris_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::tenants::{parse_ts, parse_uuid};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub idp: IdpKind,
    pub is_active: bool,
}

fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let id: String = row.get("id");
    let tenant_id: Option<String> = row.get("tenant_id");
    let role: String = row.get("role");
    let idp: String = row.get("idp");
    let last_login: Option<String> = row.get("last_login");
    let invitation_sent_at: Option<String> = row.get("invitation_sent_at");
    let deleted_at: Option<String> = row.get("deleted_at");
    let manager: Option<String> = row.get("manager_user_id");

    Ok(User {
        id: parse_uuid(&id)?,
        tenant_id: tenant_id.as_deref().map(parse_uuid).transpose()?,
        email: row.get("email"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        role: UserRole::parse(&role)?,
        idp: IdpKind::parse(&idp)?,
        is_active: row.get::<i64, _>("is_active") != 0,
        last_login: last_login.as_deref().map(parse_ts).transpose()?,
        invitation_sent_at: invitation_sent_at.as_deref().map(parse_ts).transpose()?,
        deleted_at: deleted_at.as_deref().map(parse_ts).transpose()?,
        manager_user_id: manager.as_deref().map(parse_uuid).transpose()?,
    })
}

pub async fn insert(pool: &SqlitePool, new: &NewUser) -> Result<User> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO users (id, tenant_id, email, first_name, last_name, role, idp,
                           is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(new.tenant_id.map(|u| u.to_string()))
    .bind(&new.email)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(new.role.as_str())
    .bind(new.idp.as_str())
    .bind(new.is_active as i64)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.message().contains("UNIQUE") => {
            Error::Duplicate(format!("user email already in use: {}", new.email))
        }
        _ => Error::Database(e),
    })?;

    get(pool, id)
        .await?
        .ok_or_else(|| Error::Internal("user vanished after insert".into()))
}

pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn get_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE email = ? COLLATE NOCASE")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_row).transpose()
}

/// Reconcile the IdP-issued username after a provisioning call
pub async fn set_username(
    pool: &SqlitePool,
    id: Uuid,
    idp: IdpKind,
    username: &str,
) -> Result<()> {
    sqlx::query("UPDATE users SET idp = ?, username = ?, updated_at = ? WHERE id = ?")
        .bind(idp.as_str())
        .bind(username)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.message().contains("UNIQUE") => Error::Duplicate(
                format!("username already in use on {}: {username}", idp.as_str()),
            ),
            _ => Error::Database(e),
        })?;
    Ok(())
}

pub async fn record_invitation_sent(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE users SET invitation_sent_at = ?, updated_at = ? WHERE id = ?")
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Inactive placeholder used by the seeders to reference not-yet-invited
/// users. Idempotent on email.
pub async fn get_or_create_partial(
    pool: &SqlitePool,
    email: &str,
    tenant_id: Uuid,
) -> Result<User> {
    if let Some(user) = get_by_email(pool, email).await? {
        return Ok(user);
    }
    insert(
        pool,
        &NewUser {
            tenant_id: Some(tenant_id),
            email: email.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            role: UserRole::Member,
            idp: IdpKind::Cognito,
            is_active: false,
        },
    )
    .await
}

/// Admins and super-admins of a tenant, for ready-state notifications
pub async fn admins_of_tenant(pool: &SqlitePool, tenant_id: Uuid) -> Result<Vec<User>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM users
        WHERE tenant_id = ? AND role IN ('Admin', 'SuperAdmin') AND deleted_at IS NULL
        "#,
    )
    .bind(tenant_id.to_string())
    .fetch_all(pool)
    .await?;
    rows.iter().map(map_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polaris_common::db::init_in_memory;

    #[tokio::test]
    async fn email_lookup_ignores_case() {
        let pool = init_in_memory().await.unwrap();
        insert(
            &pool,
            &NewUser {
                tenant_id: None,
                email: "CSM@x.example".to_string(),
                first_name: "Casey".to_string(),
                last_name: "Moss".to_string(),
                role: UserRole::Concierge,
                idp: IdpKind::Cognito,
                is_active: true,
            },
        )
        .await
        .unwrap();

        let found = get_by_email(&pool, "csm@x.example").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn partial_user_is_idempotent_on_email() {
        let pool = init_in_memory().await.unwrap();
        let tenant = crate::db::tenants::insert(
            &pool,
            &crate::db::tenants::NewTenant {
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

        let first = get_or_create_partial(&pool, "owner@acme.example", tenant.id)
            .await
            .unwrap();
        let second = get_or_create_partial(&pool, "owner@acme.example", tenant.id)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert!(!first.is_active);
    }

    #[tokio::test]
    async fn username_unique_per_backend() {
        let pool = init_in_memory().await.unwrap();
        let a = insert(
            &pool,
            &NewUser {
                tenant_id: None,
                email: "a@x.example".to_string(),
                first_name: "A".to_string(),
                last_name: "A".to_string(),
                role: UserRole::Member,
                idp: IdpKind::Cognito,
                is_active: true,
            },
        )
        .await
        .unwrap();
        let b = insert(
            &pool,
            &NewUser {
                tenant_id: None,
                email: "b@x.example".to_string(),
                first_name: "B".to_string(),
                last_name: "B".to_string(),
                role: UserRole::Member,
                idp: IdpKind::Cognito,
                is_active: true,
            },
        )
        .await
        .unwrap();

        set_username(&pool, a.id, IdpKind::Cognito, "shared").await.unwrap();
        let err = set_username(&pool, b.id, IdpKind::Cognito, "shared")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));

        // Same username on the other backend is fine
        set_username(&pool, b.id, IdpKind::Okta, "shared").await.unwrap();
    }
}
