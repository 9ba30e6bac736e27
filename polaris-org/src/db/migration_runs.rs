//! Migration run database operations

use polaris_common::db::models::{MigrationRun, RunStatus};
use polaris_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::tenants::{parse_ts, parse_uuid};

fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<MigrationRun> {
    let id: String = row.get("id");
    let tenant_id: String = row.get("tenant_id");
    let frameworks: String = row.get("frameworks");
    let status: String = row.get("status");
    let created_by: Option<String> = row.get("created_by_user_id");
    let created_at: String = row.get("created_at");

    Ok(MigrationRun {
        id: parse_uuid(&id)?,
        tenant_id: parse_uuid(&tenant_id)?,
        frameworks: serde_json::from_str(&frameworks)
            .map_err(|e| Error::Internal(format!("bad frameworks list: {e}")))?,
        mapping_path: row.get("mapping_path"),
        status: RunStatus::parse(&status)?,
        status_detail: row.get("status_detail"),
        mapped_subtasks: row.get("mapped_subtasks"),
        created_by_user_id: created_by.as_deref().map(parse_uuid).transpose()?,
        created_at: parse_ts(&created_at)?,
    })
}

pub async fn create(
    pool: &SqlitePool,
    tenant_id: Uuid,
    frameworks: &[String],
    mapping_path: &str,
    created_by: Option<Uuid>,
) -> Result<MigrationRun> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO migration_runs (id, tenant_id, frameworks, mapping_path, status,
                                    created_by_user_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, 'PENDING', ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(tenant_id.to_string())
    .bind(serde_json::to_string(frameworks).map_err(|e| Error::Internal(e.to_string()))?)
    .bind(mapping_path)
    .bind(created_by.map(|u| u.to_string()))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get(pool, id)
        .await?
        .ok_or_else(|| Error::Internal("migration run vanished after insert".into()))
}

pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Option<MigrationRun>> {
    let row = sqlx::query("SELECT * FROM migration_runs WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn set_status(
    pool: &SqlitePool,
    id: Uuid,
    status: RunStatus,
    status_detail: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE migration_runs SET status = ?, status_detail = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(status_detail)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Persist the "mapped/total" counter, e.g. "2/3"
pub async fn set_mapped_subtasks(pool: &SqlitePool, id: Uuid, mapped: &str) -> Result<()> {
    sqlx::query("UPDATE migration_runs SET mapped_subtasks = ?, updated_at = ? WHERE id = ?")
        .bind(mapped)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}
