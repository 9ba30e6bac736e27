//! Program, task and sub-task content operations

use polaris_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::tenants::parse_uuid;

pub async fn upsert_program(pool: &SqlitePool, tenant_id: Uuid, name: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO programs (id, tenant_id, name) VALUES (?, ?, ?)
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

pub async fn upsert_task(
    pool: &SqlitePool,
    tenant_id: Uuid,
    program_name: &str,
    name: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO program_tasks (id, tenant_id, program_name, name) VALUES (?, ?, ?, ?)
        ON CONFLICT(tenant_id, program_name, name) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(program_name)
    .bind(name)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_howtoguide(
    pool: &SqlitePool,
    tenant_id: Uuid,
    task_name: &str,
    title: &str,
    body: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO howtoguides (id, tenant_id, task_name, title, body) VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(tenant_id, task_name, title) DO UPDATE SET body = excluded.body
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(task_name)
    .bind(title)
    .bind(body)
    .execute(pool)
    .await?;
    Ok(())
}

/// Sub-task fields as the seeders see them
#[derive(Debug, Clone, Default)]
pub struct SubtaskUpsert {
    pub reference_id: String,
    pub program_name: String,
    pub task_name: String,
    pub name: String,
    pub migration_id: Option<String>,
}

pub async fn upsert_subtask(pool: &SqlitePool, tenant_id: Uuid, s: &SubtaskUpsert) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO subtasks (id, tenant_id, reference_id, program_name, task_name, name,
                              migration_id)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(tenant_id, reference_id) DO UPDATE SET
            program_name = excluded.program_name,
            task_name = excluded.task_name,
            name = excluded.name,
            migration_id = excluded.migration_id
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(&s.reference_id)
    .bind(&s.program_name)
    .bind(&s.task_name)
    .bind(&s.name)
    .bind(&s.migration_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Sub-task row as the migration sees it
#[derive(Debug, Clone)]
pub struct SubtaskRow {
    pub id: Uuid,
    pub reference_id: String,
    pub name: String,
    pub migration_id: Option<String>,
    pub assignee_user_id: Option<Uuid>,
    pub due_date: Option<String>,
    pub completion_date: Option<String>,
    pub action_item_id: Option<Uuid>,
}

pub async fn list_subtasks(pool: &SqlitePool, tenant_id: Uuid) -> Result<Vec<SubtaskRow>> {
    let rows = sqlx::query("SELECT * FROM subtasks WHERE tenant_id = ? ORDER BY reference_id")
        .bind(tenant_id.to_string())
        .fetch_all(pool)
        .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: String = row.get("id");
        let assignee: Option<String> = row.get("assignee_user_id");
        let action_item: Option<String> = row.get("action_item_id");
        out.push(SubtaskRow {
            id: parse_uuid(&id)?,
            reference_id: row.get("reference_id"),
            name: row.get("name"),
            migration_id: row.get("migration_id"),
            assignee_user_id: assignee.as_deref().map(parse_uuid).transpose()?,
            due_date: row.get("due_date"),
            completion_date: row.get("completion_date"),
            action_item_id: action_item.as_deref().map(parse_uuid).transpose()?,
        });
    }
    Ok(out)
}

/// Link a migrated sub-task to its new action item
pub async fn link_subtask_to_action_item(
    pool: &SqlitePool,
    subtask_id: Uuid,
    action_item_id: Uuid,
) -> Result<()> {
    sqlx::query("UPDATE subtasks SET action_item_id = ? WHERE id = ?")
        .bind(action_item_id.to_string())
        .bind(subtask_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tenants::{self, NewTenant};
    use polaris_common::db::init_in_memory;

    #[tokio::test]
    async fn subtask_upsert_keys_on_reference() {
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

        let mut s = SubtaskUpsert {
            reference_id: "ST-001".to_string(),
            program_name: "Security".to_string(),
            task_name: "Harden".to_string(),
            name: "Enable MFA".to_string(),
            migration_id: Some("m1".to_string()),
        };
        upsert_subtask(&pool, tenant.id, &s).await.unwrap();

        s.name = "Enable MFA everywhere".to_string();
        upsert_subtask(&pool, tenant.id, &s).await.unwrap();

        let subtasks = list_subtasks(&pool, tenant.id).await.unwrap();
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].name, "Enable MFA everywhere");
    }
}
