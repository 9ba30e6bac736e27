//! API token database operations
//!
//! Tokens identify a tenant on machine-to-machine surfaces (SCIM). The
//! identifier is a UUID, unique per tenant.

use polaris_common::db::models::ApiToken;
use polaris_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::tenants::{parse_ts, parse_uuid};

fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<ApiToken> {
    let id: String = row.get("id");
    let tenant_id: String = row.get("tenant_id");
    let identifier: String = row.get("token_identifier");
    let created_at: String = row.get("created_at");
    Ok(ApiToken {
        id: parse_uuid(&id)?,
        tenant_id: parse_uuid(&tenant_id)?,
        name: row.get("name"),
        token_identifier: parse_uuid(&identifier)?,
        created_at: parse_ts(&created_at)?,
    })
}

pub async fn create(pool: &SqlitePool, tenant_id: Uuid, name: &str) -> Result<ApiToken> {
    let id = Uuid::new_v4();
    let identifier = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO api_tokens (id, tenant_id, name, token_identifier, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(tenant_id.to_string())
    .bind(name)
    .bind(identifier.to_string())
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT * FROM api_tokens WHERE id = ?")
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;
    map_row(&row)
}

/// Resolve a bearer token identifier to its tenant
pub async fn resolve(pool: &SqlitePool, token_identifier: Uuid) -> Result<ApiToken> {
    let row = sqlx::query("SELECT * FROM api_tokens WHERE token_identifier = ?")
        .bind(token_identifier.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::Unauthorized("unknown api token".into()))?;
    map_row(&row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polaris_common::db::init_in_memory;

    #[tokio::test]
    async fn token_identifier_resolves_to_its_tenant() {
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

        let token = create(&pool, tenant.id, "scim").await.unwrap();
        let resolved = resolve(&pool, token.token_identifier).await.unwrap();
        assert_eq!(resolved.tenant_id, tenant.id);

        let err = resolve(&pool, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }
}
