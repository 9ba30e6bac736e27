//! Feature flag database operations

use polaris_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Upsert a flag value for a tenant
pub async fn set(pool: &SqlitePool, tenant_id: Uuid, name: &str, enabled: bool) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO feature_flags (tenant_id, name, enabled) VALUES (?, ?, ?)
        ON CONFLICT(tenant_id, name) DO UPDATE SET enabled = excluded.enabled
        "#,
    )
    .bind(tenant_id.to_string())
    .bind(name)
    .bind(enabled as i64)
    .execute(pool)
    .await?;
    Ok(())
}

/// Whether a flag is enabled. Absent rows read as disabled.
pub async fn is_enabled(pool: &SqlitePool, tenant_id: Uuid, name: &str) -> Result<bool> {
    let enabled: Option<i64> = sqlx::query_scalar(
        "SELECT enabled FROM feature_flags WHERE tenant_id = ? AND name = ?",
    )
    .bind(tenant_id.to_string())
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(enabled.unwrap_or(0) != 0)
}

pub async fn delete(pool: &SqlitePool, tenant_id: Uuid, name: &str) -> Result<()> {
    sqlx::query("DELETE FROM feature_flags WHERE tenant_id = ? AND name = ?")
        .bind(tenant_id.to_string())
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn all_for_tenant(pool: &SqlitePool, tenant_id: Uuid) -> Result<Vec<(String, bool)>> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT name, enabled FROM feature_flags WHERE tenant_id = ? ORDER BY name")
            .bind(tenant_id.to_string())
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(n, e)| (n, e != 0)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tenants::{self, NewTenant};
    use polaris_common::db::init_in_memory;

    #[tokio::test]
    async fn set_is_an_upsert() {
        let pool = init_in_memory().await.unwrap();
        let tenant = tenants::insert(
            &pool,
            &NewTenant {
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

        set(&pool, tenant.id, crate::flags::OKTA, true).await.unwrap();
        assert!(is_enabled(&pool, tenant.id, crate::flags::OKTA).await.unwrap());

        set(&pool, tenant.id, crate::flags::OKTA, false).await.unwrap();
        assert!(!is_enabled(&pool, tenant.id, crate::flags::OKTA).await.unwrap());

        // Absent flag reads as disabled
        assert!(!is_enabled(&pool, tenant.id, "missing").await.unwrap());
    }
}
