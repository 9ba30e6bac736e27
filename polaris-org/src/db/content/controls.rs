//! Control and action-item content operations

use polaris_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Control fields as the seeders and migration see them
#[derive(Debug, Clone, Default)]
pub struct ControlUpsert {
    pub reference_id: Option<String>,
    pub name: String,
    pub description: String,
    pub status: Option<String>,
    pub implementation_notes: Option<String>,
    pub owner_user_id: Option<Uuid>,
    pub group_name: Option<String>,
    pub framework_tag: Option<String>,
    pub is_custom: bool,
}

/// Lightweight control row for migration decisions
#[derive(Debug, Clone)]
pub struct ControlRow {
    pub id: Uuid,
    pub reference_id: Option<String>,
    pub name: String,
    pub status: Option<String>,
    pub implementation_notes: Option<String>,
    pub owner_user_id: Option<Uuid>,
    pub is_custom: bool,
}

fn map_control(row: &sqlx::sqlite::SqliteRow) -> Result<ControlRow> {
    let id: String = row.get("id");
    let owner: Option<String> = row.get("owner_user_id");
    Ok(ControlRow {
        id: crate::db::tenants::parse_uuid(&id)?,
        reference_id: row.get("reference_id"),
        name: row.get("name"),
        status: row.get("status"),
        implementation_notes: row.get("implementation_notes"),
        owner_user_id: owner
            .as_deref()
            .map(crate::db::tenants::parse_uuid)
            .transpose()?,
        is_custom: row.get::<i64, _>("is_custom") != 0,
    })
}

/// Upsert a control. My Compliance controls key on reference_id; legacy
/// playbooks controls carry no reference and key on name instead.
pub async fn upsert_control(pool: &SqlitePool, tenant_id: Uuid, c: &ControlUpsert) -> Result<()> {
    match &c.reference_id {
        Some(reference) => {
            sqlx::query(
                r#"
                INSERT INTO controls (id, tenant_id, reference_id, name, description, status,
                                      implementation_notes, owner_user_id, group_name,
                                      framework_tag, is_custom)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tenant_id, reference_id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    group_name = excluded.group_name,
                    framework_tag = excluded.framework_tag
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(tenant_id.to_string())
            .bind(reference)
            .bind(&c.name)
            .bind(&c.description)
            .bind(&c.status)
            .bind(&c.implementation_notes)
            .bind(c.owner_user_id.map(|u| u.to_string()))
            .bind(&c.group_name)
            .bind(&c.framework_tag)
            .bind(c.is_custom as i64)
            .execute(pool)
            .await?;
        }
        None => {
            let existing: Option<String> = sqlx::query_scalar(
                "SELECT id FROM controls WHERE tenant_id = ? AND name = ? AND reference_id IS NULL",
            )
            .bind(tenant_id.to_string())
            .bind(&c.name)
            .fetch_optional(pool)
            .await?;

            match existing {
                Some(id) => {
                    sqlx::query(
                        "UPDATE controls SET description = ?, group_name = ?, framework_tag = ? WHERE id = ?",
                    )
                    .bind(&c.description)
                    .bind(&c.group_name)
                    .bind(&c.framework_tag)
                    .bind(id)
                    .execute(pool)
                    .await?;
                }
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO controls (id, tenant_id, name, description, status,
                                              implementation_notes, owner_user_id, group_name,
                                              framework_tag, is_custom)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(Uuid::new_v4().to_string())
                    .bind(tenant_id.to_string())
                    .bind(&c.name)
                    .bind(&c.description)
                    .bind(&c.status)
                    .bind(&c.implementation_notes)
                    .bind(c.owner_user_id.map(|u| u.to_string()))
                    .bind(&c.group_name)
                    .bind(&c.framework_tag)
                    .bind(c.is_custom as i64)
                    .execute(pool)
                    .await?;
                }
            }
        }
    }
    Ok(())
}

pub async fn upsert_group(pool: &SqlitePool, tenant_id: Uuid, name: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO control_groups (id, tenant_id, name) VALUES (?, ?, ?)
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

/// Link a control to a certification section
pub async fn upsert_cert_section_link(
    pool: &SqlitePool,
    tenant_id: Uuid,
    control_reference: &str,
    certification_name: &str,
    section_name: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO control_cert_sections
            (id, tenant_id, control_reference, certification_name, section_name)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(tenant_id, control_reference, certification_name, section_name) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(control_reference)
    .bind(certification_name)
    .bind(section_name)
    .execute(pool)
    .await?;
    Ok(())
}

/// Action-item fields as the seeders see them
#[derive(Debug, Clone, Default)]
pub struct ActionItemUpsert {
    pub reference_id: String,
    pub name: String,
    pub description: String,
    pub recurring_schedule: Option<String>,
    pub required_evidence: Option<String>,
    pub control_reference: Option<String>,
}

pub async fn upsert_action_item(
    pool: &SqlitePool,
    tenant_id: Uuid,
    item: &ActionItemUpsert,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO action_items (id, tenant_id, reference_id, name, description,
                                  recurring_schedule, required_evidence, control_reference)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(tenant_id, reference_id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            recurring_schedule = excluded.recurring_schedule,
            control_reference = excluded.control_reference
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(&item.reference_id)
    .bind(&item.name)
    .bind(&item.description)
    .bind(&item.recurring_schedule)
    .bind(&item.required_evidence)
    .bind(&item.control_reference)
    .execute(pool)
    .await?;
    Ok(())
}

/// Action item id by reference, for migration linking
pub async fn action_item_id_by_reference(
    pool: &SqlitePool,
    tenant_id: Uuid,
    reference_id: &str,
) -> Result<Option<Uuid>> {
    let id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM action_items WHERE tenant_id = ? AND reference_id = ?",
    )
    .bind(tenant_id.to_string())
    .bind(reference_id)
    .fetch_optional(pool)
    .await?;
    id.as_deref().map(crate::db::tenants::parse_uuid).transpose()
}

pub async fn update_action_item_assignment(
    pool: &SqlitePool,
    id: Uuid,
    assignee: Option<Uuid>,
    due_date: Option<&str>,
    completion_date: Option<&str>,
    required_evidence: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE action_items
        SET assignee_user_id = COALESCE(?, assignee_user_id),
            due_date = COALESCE(?, due_date),
            completion_date = COALESCE(?, completion_date),
            required_evidence = COALESCE(?, required_evidence)
        WHERE id = ?
        "#,
    )
    .bind(assignee.map(|u| u.to_string()))
    .bind(due_date)
    .bind(completion_date)
    .bind(required_evidence)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Legacy playbooks controls: rows whose reference id does not carry the
/// My Compliance "CTRL-" prefix.
pub async fn legacy_controls(pool: &SqlitePool, tenant_id: Uuid) -> Result<Vec<ControlRow>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM controls
        WHERE tenant_id = ? AND (reference_id IS NULL OR reference_id NOT LIKE 'CTRL-%')
        "#,
    )
    .bind(tenant_id.to_string())
    .fetch_all(pool)
    .await?;
    rows.iter().map(map_control).collect()
}

/// Controls attached to any of the given frameworks, directly by tag or
/// through a certification-section link.
pub async fn controls_in_frameworks(
    pool: &SqlitePool,
    tenant_id: Uuid,
    frameworks: &[String],
) -> Result<Vec<ControlRow>> {
    let mut out = Vec::new();
    for framework in frameworks {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT c.* FROM controls c
            LEFT JOIN control_cert_sections s
              ON s.tenant_id = c.tenant_id AND s.control_reference = c.reference_id
            WHERE c.tenant_id = ?
              AND (c.framework_tag = ? OR s.certification_name = ?)
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(framework)
        .bind(framework)
        .fetch_all(pool)
        .await?;
        for row in &rows {
            let control = map_control(row)?;
            if !out.iter().any(|c: &ControlRow| c.id == control.id) {
                out.push(control);
            }
        }
    }
    Ok(out)
}

pub async fn set_control_reference(pool: &SqlitePool, id: Uuid, reference_id: &str) -> Result<()> {
    sqlx::query("UPDATE controls SET reference_id = ? WHERE id = ?")
        .bind(reference_id)
        .bind(id.to_string())
        .execute(pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.message().contains("UNIQUE") => {
                Error::Duplicate(format!("control reference already in use: {reference_id}"))
            }
            _ => Error::Database(e),
        })?;
    Ok(())
}

pub async fn set_control_status_if_unset(pool: &SqlitePool, id: Uuid, status: &str) -> Result<()> {
    sqlx::query("UPDATE controls SET status = ? WHERE id = ? AND (status IS NULL OR status = '')")
        .bind(status)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_control_owner_if_unset(pool: &SqlitePool, id: Uuid, owner: Uuid) -> Result<()> {
    sqlx::query("UPDATE controls SET owner_user_id = ? WHERE id = ? AND owner_user_id IS NULL")
        .bind(owner.to_string())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_control(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM controls WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Unset action items under a control, for migration completion
pub async fn unset_action_items_for_control(
    pool: &SqlitePool,
    tenant_id: Uuid,
    control_reference: &str,
) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM action_items
        WHERE tenant_id = ? AND control_reference = ?
          AND (status IS NULL OR status = '')
        "#,
    )
    .bind(tenant_id.to_string())
    .bind(control_reference)
    .fetch_all(pool)
    .await?;
    ids.iter()
        .map(|s| crate::db::tenants::parse_uuid(s))
        .collect()
}

pub async fn complete_action_item(
    pool: &SqlitePool,
    id: Uuid,
    completion_date: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE action_items SET status = 'Completed', completion_date = ? WHERE id = ?")
        .bind(completion_date)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// All control reference ids in a tenant's controls sheet history; used by
/// the migration to count custom controls when assigning new references.
pub async fn custom_control_count(pool: &SqlitePool, tenant_id: Uuid) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM controls WHERE tenant_id = ? AND is_custom = 1")
            .bind(tenant_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(count)
}
