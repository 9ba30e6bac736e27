//! Seed run and seed profile database operations

use polaris_common::db::models::{ProfileKind, RunStatus, SeedProfile, SeedRun};
use polaris_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::tenants::{parse_ts, parse_uuid};

fn map_run(row: &sqlx::sqlite::SqliteRow) -> Result<SeedRun> {
    let id: String = row.get("id");
    let tenant_id: Option<String> = row.get("tenant_id");
    let profile_id: Option<String> = row.get("profile_id");
    let status: String = row.get("status");
    let created_by: Option<String> = row.get("created_by_user_id");
    let created_at: String = row.get("created_at");

    Ok(SeedRun {
        id: parse_uuid(&id)?,
        tenant_id: tenant_id.as_deref().map(parse_uuid).transpose()?,
        profile_id: profile_id.as_deref().map(parse_uuid).transpose()?,
        archive_path: row.get("archive_path"),
        status: RunStatus::parse(&status)?,
        status_detail: row.get("status_detail"),
        created_by_user_id: created_by.as_deref().map(parse_uuid).transpose()?,
        created_at: parse_ts(&created_at)?,
    })
}

fn map_profile(row: &sqlx::sqlite::SqliteRow) -> Result<SeedProfile> {
    let id: String = row.get("id");
    let kind: String = row.get("content_kind");
    Ok(SeedProfile {
        id: parse_uuid(&id)?,
        name: row.get("name"),
        content_kind: ProfileKind::parse(&kind)?,
        visible: row.get::<i64, _>("visible") != 0,
        archive_path: row.get("archive_path"),
        default_base: row.get::<i64, _>("default_base") != 0,
    })
}

pub async fn create_run(
    pool: &SqlitePool,
    tenant_id: Option<Uuid>,
    profile_id: Option<Uuid>,
    archive_path: &str,
    status: RunStatus,
    created_by: Option<Uuid>,
) -> Result<SeedRun> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO seed_runs (id, tenant_id, profile_id, archive_path, status,
                               created_by_user_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(tenant_id.map(|u| u.to_string()))
    .bind(profile_id.map(|u| u.to_string()))
    .bind(archive_path)
    .bind(status.as_str())
    .bind(created_by.map(|u| u.to_string()))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_run(pool, id)
        .await?
        .ok_or_else(|| Error::Internal("seed run vanished after insert".into()))
}

pub async fn get_run(pool: &SqlitePool, id: Uuid) -> Result<Option<SeedRun>> {
    let row = sqlx::query("SELECT * FROM seed_runs WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_run).transpose()
}

/// Status writes contend with the seeders' own row traffic, so they go
/// through the lock-retry helper.
pub async fn set_run_status(
    pool: &SqlitePool,
    id: Uuid,
    status: RunStatus,
    status_detail: &str,
) -> Result<()> {
    let max_wait_ms =
        polaris_common::config::get_setting_i64(pool, "database_max_lock_wait_ms", 5000).await as u64;

    polaris_common::retry::retry_on_lock("seed_run_status", max_wait_ms, || async {
        sqlx::query(
            "UPDATE seed_runs SET status = ?, status_detail = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(status_detail)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

pub async fn create_profile(
    pool: &SqlitePool,
    name: &str,
    content_kind: ProfileKind,
    visible: bool,
    archive_path: &str,
) -> Result<SeedProfile> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO seed_profiles (id, name, content_kind, visible, archive_path)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(name)
    .bind(content_kind.as_str())
    .bind(visible as i64)
    .bind(archive_path)
    .execute(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.message().contains("UNIQUE") => {
            Error::Duplicate(format!("seed profile name already in use: {name}"))
        }
        _ => Error::Database(e),
    })?;

    get_profile(pool, id)
        .await?
        .ok_or_else(|| Error::Internal("seed profile vanished after insert".into()))
}

pub async fn get_profile(pool: &SqlitePool, id: Uuid) -> Result<Option<SeedProfile>> {
    let row = sqlx::query("SELECT * FROM seed_profiles WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_profile).transpose()
}

pub async fn get_profile_by_name(pool: &SqlitePool, name: &str) -> Result<Option<SeedProfile>> {
    let row = sqlx::query("SELECT * FROM seed_profiles WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_profile).transpose()
}

pub async fn get_default_base(pool: &SqlitePool) -> Result<Option<SeedProfile>> {
    let row = sqlx::query("SELECT * FROM seed_profiles WHERE default_base = 1")
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_profile).transpose()
}

/// Promote a profile to the default base. The prior default is demoted in
/// the same transaction, keeping at most one default across the store.
pub async fn set_default_base(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE seed_profiles SET default_base = 0 WHERE default_base = 1")
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("UPDATE seed_profiles SET default_base = 1 WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("seed profile {id}")));
    }

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polaris_common::db::init_in_memory;

    #[tokio::test]
    async fn default_base_promotion_demotes_prior_default() {
        let pool = init_in_memory().await.unwrap();
        let a = create_profile(&pool, "SOC 2 Type 1", ProfileKind::MyCompliance, true, "a.zip")
            .await
            .unwrap();
        let b = create_profile(&pool, "ISO 27001", ProfileKind::MyCompliance, true, "b.zip")
            .await
            .unwrap();

        set_default_base(&pool, a.id).await.unwrap();
        set_default_base(&pool, b.id).await.unwrap();

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM seed_profiles WHERE default_base = 1")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);

        let default = get_default_base(&pool).await.unwrap().unwrap();
        assert_eq!(default.id, b.id);
    }

    #[tokio::test]
    async fn run_status_transitions_persist_detail() {
        let pool = init_in_memory().await.unwrap();
        let run = create_run(&pool, None, None, "seed.zip", RunStatus::Pending, None)
            .await
            .unwrap();

        set_run_status(&pool, run.id, RunStatus::Done, "Error seeding subtask row 2")
            .await
            .unwrap();

        let loaded = get_run(&pool, run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Done);
        assert!(loaded.status_detail.contains("subtask"));
    }
}
