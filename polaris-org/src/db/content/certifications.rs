//! Certification content operations

use polaris_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Upsert a section of a certification (e.g. "CC1.1" of "SOC 2 Type 1")
pub async fn upsert_section(
    pool: &SqlitePool,
    tenant_id: Uuid,
    certification_name: &str,
    section_name: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO certification_sections (id, tenant_id, certification_name, name)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(tenant_id, certification_name, name) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(certification_name)
    .bind(section_name)
    .execute(pool)
    .await?;
    Ok(())
}

/// Upsert a certification owned by the organization
pub async fn upsert_org_certification(
    pool: &SqlitePool,
    tenant_id: Uuid,
    name: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO org_certifications (id, tenant_id, name)
        VALUES (?, ?, ?)
        ON CONFLICT(tenant_id, name) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(name)
    .execute(pool)
    .await?;
    Ok(())
}

/// Idempotently unlock a framework for a tenant
pub async fn unlock(pool: &SqlitePool, tenant_id: Uuid, certification_name: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO unlocked_certifications (id, tenant_id, certification_name, unlocked_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(tenant_id, certification_name) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(certification_name)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn unlocked_names(pool: &SqlitePool, tenant_id: Uuid) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT certification_name FROM unlocked_certifications WHERE tenant_id = ? ORDER BY certification_name",
    )
    .bind(tenant_id.to_string())
    .fetch_all(pool)
    .await?;
    Ok(names)
}

/// Move every unlocked certification into the archive table and delete
/// the originals, in one transaction. Returns the number archived.
pub async fn archive_unlocked(pool: &SqlitePool, tenant_id: Uuid) -> Result<usize> {
    let mut tx = pool.begin().await?;

    let names: Vec<String> = sqlx::query_scalar(
        "SELECT certification_name FROM unlocked_certifications WHERE tenant_id = ?",
    )
    .bind(tenant_id.to_string())
    .fetch_all(&mut *tx)
    .await?;

    let now = chrono::Utc::now().to_rfc3339();
    for name in &names {
        sqlx::query(
            r#"
            INSERT INTO archived_unlocked_certifications
                (id, tenant_id, certification_name, archived_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(tenant_id.to_string())
        .bind(name)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM unlocked_certifications WHERE tenant_id = ?")
        .bind(tenant_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(names.len())
}

/// Upsert a certification logo (global, keyed by certification name)
pub async fn upsert_logo(
    pool: &SqlitePool,
    certification_name: &str,
    logo_file: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO certification_logos (id, certification_name, logo_file)
        VALUES (?, ?, ?)
        ON CONFLICT(certification_name) DO UPDATE SET logo_file = excluded.logo_file
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(certification_name)
    .bind(logo_file)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tenants::{self, NewTenant};
    use polaris_common::db::init_in_memory;

    async fn tenant(pool: &SqlitePool) -> Uuid {
        tenants::insert(
            pool,
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
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn unlock_is_idempotent() {
        let pool = init_in_memory().await.unwrap();
        let tid = tenant(&pool).await;
        unlock(&pool, tid, "SOC 2 Type 1").await.unwrap();
        unlock(&pool, tid, "SOC 2 Type 1").await.unwrap();
        assert_eq!(unlocked_names(&pool, tid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn archiving_moves_rows_and_clears_originals() {
        let pool = init_in_memory().await.unwrap();
        let tid = tenant(&pool).await;
        unlock(&pool, tid, "SOC 2 Type 1").await.unwrap();
        unlock(&pool, tid, "ISO 27001").await.unwrap();

        let archived = archive_unlocked(&pool, tid).await.unwrap();
        assert_eq!(archived, 2);
        assert!(unlocked_names(&pool, tid).await.unwrap().is_empty());

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM archived_unlocked_certifications WHERE tenant_id = ?",
        )
        .bind(tid.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 2);
    }
}
