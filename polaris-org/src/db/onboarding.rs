//! Onboarding and setup-step database operations
//!
//! State writes are guarded by the row version so concurrent transitions
//! detect each other; the state machine retries on version loss.

use polaris_common::db::models::{
    Onboarding, OnboardingStateV1, OnboardingStateV2, SetupStep, SetupStepName,
};
use polaris_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::tenants::{parse_uuid, parse_ts};

fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<Onboarding> {
    let id: String = row.get("id");
    let tenant_id: String = row.get("tenant_id");
    let v1: String = row.get("state_v1");
    let v2: String = row.get("state_v2");
    let period_ends: Option<String> = row.get("period_ends");

    Ok(Onboarding {
        id: parse_uuid(&id)?,
        tenant_id: parse_uuid(&tenant_id)?,
        state_v1: OnboardingStateV1::parse(&v1)?,
        state_v2: OnboardingStateV2::parse(&v2)?,
        period_ends: period_ends
            .as_deref()
            .map(|s| {
                s.parse::<chrono::NaiveDate>()
                    .map_err(|e| Error::Internal(format!("bad period_ends: {e}")))
            })
            .transpose()?,
        calendly_event_id: row.get("calendly_event_id"),
        calendly_invitee_id: row.get("calendly_invitee_id"),
        row_version: row.get("row_version"),
    })
}

/// Create the onboarding and its six setup steps in one transaction
pub async fn create_for_tenant(pool: &SqlitePool, tenant_id: Uuid) -> Result<Onboarding> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now().to_rfc3339();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO onboardings (id, tenant_id, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(tenant_id.to_string())
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for step in SetupStepName::ALL {
        sqlx::query(
            "INSERT INTO onboarding_setup_steps (onboarding_id, name, completed) VALUES (?, ?, 0)",
        )
        .bind(id.to_string())
        .bind(step.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    get(pool, id)
        .await?
        .ok_or_else(|| Error::Internal("onboarding vanished after insert".into()))
}

pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Option<Onboarding>> {
    let row = sqlx::query("SELECT * FROM onboardings WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_row).transpose()
}

pub async fn get_by_tenant(pool: &SqlitePool, tenant_id: Uuid) -> Result<Option<Onboarding>> {
    let row = sqlx::query("SELECT * FROM onboardings WHERE tenant_id = ?")
        .bind(tenant_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_row).transpose()
}

/// Version-guarded v1 state write. Returns false when another writer won.
pub async fn set_state_v1(
    pool: &SqlitePool,
    id: Uuid,
    new_state: OnboardingStateV1,
    expected_version: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE onboardings
        SET state_v1 = ?, row_version = row_version + 1, updated_at = ?
        WHERE id = ? AND row_version = ?
        "#,
    )
    .bind(new_state.as_str())
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(id.to_string())
    .bind(expected_version)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Version-guarded v2 state write. Returns false when another writer won.
pub async fn set_state_v2(
    pool: &SqlitePool,
    id: Uuid,
    new_state: OnboardingStateV2,
    expected_version: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE onboardings
        SET state_v2 = ?, row_version = row_version + 1, updated_at = ?
        WHERE id = ? AND row_version = ?
        "#,
    )
    .bind(new_state.as_str())
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(id.to_string())
    .bind(expected_version)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Persist or clear the scheduled meeting identifiers
pub async fn set_meeting(
    pool: &SqlitePool,
    id: Uuid,
    event_id: Option<&str>,
    invitee_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE onboardings
        SET calendly_event_id = ?, calendly_invitee_id = ?,
            row_version = row_version + 1, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(event_id)
    .bind(invitee_id)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Whether the enter-review notification already went out
pub async fn review_notified(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let notified: i64 = sqlx::query_scalar("SELECT review_notified FROM onboardings WHERE id = ?")
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(notified != 0)
}

pub async fn mark_review_notified(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE onboardings SET review_notified = 1 WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// All six steps, in the fixed enumeration order
pub async fn steps(pool: &SqlitePool, onboarding_id: Uuid) -> Result<Vec<SetupStep>> {
    let rows = sqlx::query(
        "SELECT onboarding_id, name, completed FROM onboarding_setup_steps WHERE onboarding_id = ?",
    )
    .bind(onboarding_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut steps = Vec::with_capacity(rows.len());
    for row in &rows {
        let oid: String = row.get("onboarding_id");
        let name: String = row.get("name");
        steps.push(SetupStep {
            onboarding_id: parse_uuid(&oid)?,
            name: SetupStepName::parse(&name)?,
            completed: row.get::<i64, _>("completed") != 0,
        });
    }
    // Stable order regardless of insert order
    steps.sort_by_key(|s| SetupStepName::ALL.iter().position(|n| *n == s.name));
    Ok(steps)
}

pub async fn get_step(
    pool: &SqlitePool,
    onboarding_id: Uuid,
    name: SetupStepName,
) -> Result<SetupStep> {
    let row = sqlx::query(
        "SELECT onboarding_id, name, completed FROM onboarding_setup_steps
         WHERE onboarding_id = ? AND name = ?",
    )
    .bind(onboarding_id.to_string())
    .bind(name.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("setup step {} for {onboarding_id}", name.as_str())))?;

    let oid: String = row.get("onboarding_id");
    let step_name: String = row.get("name");
    Ok(SetupStep {
        onboarding_id: parse_uuid(&oid)?,
        name: SetupStepName::parse(&step_name)?,
        completed: row.get::<i64, _>("completed") != 0,
    })
}

pub async fn set_step(
    pool: &SqlitePool,
    onboarding_id: Uuid,
    name: SetupStepName,
    completed: bool,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE onboarding_setup_steps SET completed = ? WHERE onboarding_id = ? AND name = ?",
    )
    .bind(completed as i64)
    .bind(onboarding_id.to_string())
    .bind(name.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!(
            "setup step {} for {onboarding_id}",
            name.as_str()
        )));
    }
    Ok(())
}

pub async fn completed_step_count(pool: &SqlitePool, onboarding_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM onboarding_setup_steps WHERE onboarding_id = ? AND completed = 1",
    )
    .bind(onboarding_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Store a questionnaire capture. Append-only by design.
pub async fn insert_response(
    pool: &SqlitePool,
    tenant_id: Uuid,
    questionary_id: &str,
    typeform_response_id: &str,
    response: &serde_json::Value,
    submitted_by: Option<Uuid>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO onboarding_responses
            (id, tenant_id, questionary_id, typeform_response_id, response_json,
             submitted_by_user_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(tenant_id.to_string())
    .bind(questionary_id)
    .bind(typeform_response_id)
    .bind(response.to_string())
    .bind(submitted_by.map(|u| u.to_string()))
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(id)
}
