//! Training, officer and team content operations

use polaris_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

pub async fn upsert_training(pool: &SqlitePool, tenant_id: Uuid, name: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trainings (id, tenant_id, name) VALUES (?, ?, ?)
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

pub async fn upsert_officer(
    pool: &SqlitePool,
    tenant_id: Uuid,
    name: &str,
    user_email: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO officers (id, tenant_id, name, user_email) VALUES (?, ?, ?, ?)
        ON CONFLICT(tenant_id, name) DO UPDATE SET user_email = excluded.user_email
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(name)
    .bind(user_email)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_team(pool: &SqlitePool, tenant_id: Uuid, name: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO teams (id, tenant_id, name) VALUES (?, ?, ?)
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

pub async fn upsert_team_member(
    pool: &SqlitePool,
    tenant_id: Uuid,
    team_name: &str,
    user_email: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO team_members (id, tenant_id, team_name, user_email) VALUES (?, ?, ?, ?)
        ON CONFLICT(tenant_id, team_name, user_email) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(team_name)
    .bind(user_email)
    .execute(pool)
    .await?;
    Ok(())
}
