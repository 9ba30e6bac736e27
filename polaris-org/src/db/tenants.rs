//! Tenant database operations

use polaris_common::db::models::{Tenant, TenantState};
use polaris_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Fields accepted when creating a tenant
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub website: Option<String>,
    pub tier: Option<String>,
    pub sfdc_id: Option<String>,
    pub csm_user_id: Option<Uuid>,
    pub ca_user_id: Option<Uuid>,
    pub contract_sign_date: Option<chrono::NaiveDate>,
    pub is_internal: bool,
}

/// Partial update; only `Some` fields are written
#[derive(Debug, Clone, Default)]
pub struct TenantPatch {
    pub name: Option<String>,
    pub website: Option<String>,
    pub tier: Option<String>,
    pub csm_user_id: Option<Uuid>,
    pub ca_user_id: Option<Uuid>,
    pub contract_sign_date: Option<chrono::NaiveDate>,
    pub state: Option<TenantState>,
}

fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<Tenant> {
    let id: String = row.get("id");
    let state: String = row.get("state");
    let csm: Option<String> = row.get("csm_user_id");
    let ca: Option<String> = row.get("ca_user_id");
    let contract: Option<String> = row.get("contract_sign_date");
    let billing: Option<String> = row.get("billing_address");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Tenant {
        id: parse_uuid(&id)?,
        name: row.get("name"),
        website: row.get("website"),
        state: TenantState::parse(&state)?,
        tier: row.get("tier"),
        sfdc_id: row.get("sfdc_id"),
        csm_user_id: csm.as_deref().map(parse_uuid).transpose()?,
        ca_user_id: ca.as_deref().map(parse_uuid).transpose()?,
        contract_sign_date: contract
            .as_deref()
            .map(|s| {
                s.parse::<chrono::NaiveDate>()
                    .map_err(|e| Error::Internal(format!("bad contract_sign_date: {e}")))
            })
            .transpose()?,
        is_internal: row.get::<i64, _>("is_internal") != 0,
        billing_address: billing
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| Error::Internal(format!("bad billing_address: {e}")))?,
        row_version: row.get("row_version"),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("bad uuid in database: {e}")))
}

pub(crate) fn parse_ts(s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp in database: {e}")))
}

/// Insert a tenant row. Uniqueness violations surface as `Duplicate`.
pub async fn insert(pool: &SqlitePool, new: &NewTenant) -> Result<Tenant> {
    if get_by_name(pool, &new.name).await?.is_some() {
        return Err(Error::Duplicate(format!(
            "tenant name already in use: {}",
            new.name
        )));
    }
    if let Some(website) = &new.website {
        if get_by_website(pool, website).await?.is_some() {
            return Err(Error::Duplicate(format!(
                "tenant website already in use: {website}"
            )));
        }
    }

    let id = Uuid::new_v4();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO tenants (
            id, name, website, state, tier, sfdc_id, csm_user_id, ca_user_id,
            contract_sign_date, is_internal, created_at, updated_at
        ) VALUES (?, ?, ?, 'ONBOARDING', ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&new.name)
    .bind(&new.website)
    .bind(&new.tier)
    .bind(&new.sfdc_id)
    .bind(new.csm_user_id.map(|u| u.to_string()))
    .bind(new.ca_user_id.map(|u| u.to_string()))
    .bind(new.contract_sign_date.map(|d| d.to_string()))
    .bind(new.is_internal as i64)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.message().contains("UNIQUE") => {
            Error::Duplicate(format!("tenant violates uniqueness: {}", db.message()))
        }
        _ => Error::Database(e),
    })?;

    get(pool, id)
        .await?
        .ok_or_else(|| Error::Internal("tenant vanished after insert".into()))
}

pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Option<Tenant>> {
    let row = sqlx::query("SELECT * FROM tenants WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn get_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Tenant>> {
    let row = sqlx::query("SELECT * FROM tenants WHERE name = ? COLLATE NOCASE")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn get_by_website(pool: &SqlitePool, website: &str) -> Result<Option<Tenant>> {
    let row = sqlx::query("SELECT * FROM tenants WHERE website = ?")
        .bind(website)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn get_by_sfdc_id(pool: &SqlitePool, sfdc_id: &str) -> Result<Option<Tenant>> {
    let row = sqlx::query("SELECT * FROM tenants WHERE sfdc_id = ?")
        .bind(sfdc_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_row).transpose()
}

/// Every sfdc id Polaris already knows; the outbound sync filter
pub async fn known_sfdc_ids(pool: &SqlitePool) -> Result<Vec<String>> {
    let ids: Vec<String> =
        sqlx::query_scalar("SELECT sfdc_id FROM tenants WHERE sfdc_id IS NOT NULL")
            .fetch_all(pool)
            .await?;
    Ok(ids)
}

/// Tenant state transitions allowed outside of deletion
fn transition_allowed(from: TenantState, to: TenantState) -> bool {
    use TenantState::*;
    match (from, to) {
        (a, b) if a == b => true,
        (Onboarding, Active) | (Onboarding, Trial) => true,
        (Trial, Active) | (Trial, Deactivated) => true,
        (Active, Deactivated) => true,
        (Deactivated, Active) => true,
        _ => false,
    }
}

/// Apply a partial update. State changes are validated; the row version
/// bumps on every write so concurrent updaters can detect each other.
pub async fn update(pool: &SqlitePool, id: Uuid, patch: &TenantPatch) -> Result<Tenant> {
    let current = get(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tenant {id}")))?;

    if let Some(target) = patch.state {
        if !transition_allowed(current.state, target) {
            return Err(Error::InvalidTransition {
                from: current.state.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }
    }

    let name = patch.name.clone().unwrap_or(current.name);
    let website = patch.website.clone().or(current.website);
    let tier = patch.tier.clone().or(current.tier);
    let csm = patch.csm_user_id.or(current.csm_user_id);
    let ca = patch.ca_user_id.or(current.ca_user_id);
    let contract = patch.contract_sign_date.or(current.contract_sign_date);
    let state = patch.state.unwrap_or(current.state);

    sqlx::query(
        r#"
        UPDATE tenants
        SET name = ?, website = ?, tier = ?, csm_user_id = ?, ca_user_id = ?,
            contract_sign_date = ?, state = ?,
            row_version = row_version + 1, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&name)
    .bind(&website)
    .bind(&tier)
    .bind(csm.map(|u| u.to_string()))
    .bind(ca.map(|u| u.to_string()))
    .bind(contract.map(|d| d.to_string()))
    .bind(state.as_str())
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.message().contains("UNIQUE") => {
            Error::Duplicate(format!("tenant violates uniqueness: {}", db.message()))
        }
        _ => Error::Database(e),
    })?;

    get(pool, id)
        .await?
        .ok_or_else(|| Error::Internal("tenant vanished after update".into()))
}

pub async fn set_state(pool: &SqlitePool, id: Uuid, state: TenantState) -> Result<Tenant> {
    update(
        pool,
        id,
        &TenantPatch {
            state: Some(state),
            ..Default::default()
        },
    )
    .await
}

/// Delete a tenant row. Dependent rows go through ON DELETE CASCADE; the
/// caller is responsible for IdP users and blob storage first.
pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM tenants WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("tenant {id}")));
    }
    Ok(())
}

/// Active tenants without the given feature flag enabled
pub async fn active_without_flag(pool: &SqlitePool, flag: &str) -> Result<Vec<Tenant>> {
    let rows = sqlx::query(
        r#"
        SELECT t.* FROM tenants t
        WHERE t.state = 'ACTIVE'
          AND NOT EXISTS (
            SELECT 1 FROM feature_flags f
            WHERE f.tenant_id = t.id AND f.name = ? AND f.enabled = 1
          )
        "#,
    )
    .bind(flag)
    .fetch_all(pool)
    .await?;
    rows.iter().map(map_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polaris_common::db::init_in_memory;

    fn new_tenant(name: &str) -> NewTenant {
        NewTenant {
            name: name.to_string(),
            website: None,
            tier: None,
            sfdc_id: None,
            csm_user_id: None,
            ca_user_id: None,
            contract_sign_date: None,
            is_internal: false,
        }
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let pool = init_in_memory().await.unwrap();
        let tenant = insert(&pool, &new_tenant("Acme")).await.unwrap();
        assert_eq!(tenant.state, TenantState::Onboarding);

        let loaded = get(&pool, tenant.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Acme");
        assert_eq!(loaded.row_version, 0);
    }

    #[tokio::test]
    async fn name_uniqueness_is_case_insensitive() {
        let pool = init_in_memory().await.unwrap();
        insert(&pool, &new_tenant("Acme")).await.unwrap();
        let err = insert(&pool, &new_tenant("ACME")).await.unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));
    }

    #[tokio::test]
    async fn trial_to_active_is_allowed_backwards_is_not() {
        let pool = init_in_memory().await.unwrap();
        let tenant = insert(&pool, &new_tenant("Acme")).await.unwrap();

        let tenant = set_state(&pool, tenant.id, TenantState::Trial).await.unwrap();
        assert_eq!(tenant.state, TenantState::Trial);

        let tenant = set_state(&pool, tenant.id, TenantState::Active).await.unwrap();
        assert_eq!(tenant.state, TenantState::Active);
        assert_eq!(tenant.row_version, 2);

        let err = set_state(&pool, tenant.id, TenantState::Trial)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn partial_update_preserves_absent_fields() {
        let pool = init_in_memory().await.unwrap();
        let mut new = new_tenant("Acme");
        new.website = Some("https://acme.example".to_string());
        let tenant = insert(&pool, &new).await.unwrap();

        let updated = update(
            &pool,
            tenant.id,
            &TenantPatch {
                tier: Some("enterprise".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.website.as_deref(), Some("https://acme.example"));
        assert_eq!(updated.tier.as_deref(), Some("enterprise"));
    }
}
