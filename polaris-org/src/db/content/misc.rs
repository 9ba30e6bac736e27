//! Evidence, audits, drives, blueprint history and integration connections

use polaris_common::db::models::BlueprintStatus;
use polaris_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

/// What an evidence row is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceOwner {
    Subtask,
    ActionItem,
    Control,
}

impl EvidenceOwner {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceOwner::Subtask => "subtask",
            EvidenceOwner::ActionItem => "action_item",
            EvidenceOwner::Control => "control",
        }
    }
}

pub async fn add_evidence(
    pool: &SqlitePool,
    tenant_id: Uuid,
    owner: EvidenceOwner,
    owner_id: Uuid,
    file_name: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO evidence (id, tenant_id, owner_kind, owner_id, file_name)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(owner.as_str())
    .bind(owner_id.to_string())
    .bind(file_name)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn evidence_exists(
    pool: &SqlitePool,
    owner: EvidenceOwner,
    owner_id: Uuid,
) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM evidence WHERE owner_kind = ? AND owner_id = ?")
            .bind(owner.as_str())
            .bind(owner_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

/// Copy evidence rows from one owner to another (migration linking)
pub async fn copy_evidence(
    pool: &SqlitePool,
    tenant_id: Uuid,
    from: (EvidenceOwner, Uuid),
    to: (EvidenceOwner, Uuid),
) -> Result<usize> {
    let files: Vec<String> =
        sqlx::query_scalar("SELECT file_name FROM evidence WHERE owner_kind = ? AND owner_id = ?")
            .bind(from.0.as_str())
            .bind(from.1.to_string())
            .fetch_all(pool)
            .await?;

    for file in &files {
        add_evidence(pool, tenant_id, to.0, to.1, file).await?;
    }
    Ok(files.len())
}

/// Latest audit completion date for a tenant, RFC3339 date string
pub async fn latest_audit_completion(pool: &SqlitePool, tenant_id: Uuid) -> Result<Option<String>> {
    let date: Option<String> = sqlx::query_scalar(
        "SELECT MAX(completion_date) FROM audits WHERE tenant_id = ? AND completion_date IS NOT NULL",
    )
    .bind(tenant_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(date)
}

pub async fn insert_audit(
    pool: &SqlitePool,
    tenant_id: Uuid,
    name: &str,
    completion_date: Option<&str>,
) -> Result<()> {
    sqlx::query("INSERT INTO audits (id, tenant_id, name, completion_date) VALUES (?, ?, ?, ?)")
        .bind(Uuid::new_v4().to_string())
        .bind(tenant_id.to_string())
        .bind(name)
        .bind(completion_date)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record the tenant's drive container. One per tenant.
pub async fn create_drive(pool: &SqlitePool, tenant_id: Uuid, root_key: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO drives (id, tenant_id, root_key, created_at) VALUES (?, ?, ?, ?)
        ON CONFLICT(tenant_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(root_key)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn drive_count(pool: &SqlitePool, tenant_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM drives WHERE tenant_id = ?")
        .bind(tenant_id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn record_blueprint_result(
    pool: &SqlitePool,
    tenant_id: Uuid,
    status: BlueprintStatus,
    detail: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO blueprint_history (id, tenant_id, status, detail, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(status.as_str())
    .bind(detail)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_integration_connections(pool: &SqlitePool, tenant_id: Uuid) -> Result<usize> {
    let result = sqlx::query("DELETE FROM integration_connections WHERE tenant_id = ?")
        .bind(tenant_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() as usize)
}
