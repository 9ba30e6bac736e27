//! Policy, vendor, library, object-type, document, template and checklist
//! content operations

use polaris_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

pub async fn upsert_policy(
    pool: &SqlitePool,
    tenant_id: Uuid,
    name: &str,
    document_file: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO policies (id, tenant_id, name, document_file) VALUES (?, ?, ?, ?)
        ON CONFLICT(tenant_id, name) DO UPDATE SET document_file = excluded.document_file
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(name)
    .bind(document_file)
    .execute(pool)
    .await?;
    Ok(())
}

/// Upsert into the global known-vendor catalog
pub async fn upsert_vendor(pool: &SqlitePool, name: &str, logo_file: Option<&str>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO vendors (id, name, logo_file) VALUES (?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET logo_file = COALESCE(excluded.logo_file, logo_file)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(logo_file)
    .execute(pool)
    .await?;
    Ok(())
}

/// Known vendor names, canonical case, for inference matching
pub async fn known_vendor_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM vendors ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(names)
}

/// Bulk-create per-tenant vendor rows, skipping duplicates
pub async fn add_org_vendors(pool: &SqlitePool, tenant_id: Uuid, names: &[String]) -> Result<usize> {
    let mut added = 0;
    for name in names {
        let result = sqlx::query(
            r#"
            INSERT INTO org_vendors (id, tenant_id, vendor_name) VALUES (?, ?, ?)
            ON CONFLICT(tenant_id, vendor_name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(tenant_id.to_string())
        .bind(name)
        .execute(pool)
        .await?;
        added += result.rows_affected() as usize;
    }
    Ok(added)
}

pub async fn org_vendor_names(pool: &SqlitePool, tenant_id: Uuid) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT vendor_name FROM org_vendors WHERE tenant_id = ? ORDER BY vendor_name",
    )
    .bind(tenant_id.to_string())
    .fetch_all(pool)
    .await?;
    Ok(names)
}

pub async fn upsert_library_question(
    pool: &SqlitePool,
    tenant_id: Uuid,
    question: &str,
    answer: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO library_questions (id, tenant_id, question, answer) VALUES (?, ?, ?, ?)
        ON CONFLICT(tenant_id, question) DO UPDATE SET answer = excluded.answer
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(question)
    .bind(answer)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_object_type(
    pool: &SqlitePool,
    tenant_id: Uuid,
    name: &str,
    display_index: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO object_types (id, tenant_id, name, display_index) VALUES (?, ?, ?, ?)
        ON CONFLICT(tenant_id, name) DO UPDATE SET display_index = excluded.display_index
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(name)
    .bind(display_index)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_object_type_attribute(
    pool: &SqlitePool,
    tenant_id: Uuid,
    object_type_name: &str,
    name: &str,
    attr_type: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO object_type_attributes (id, tenant_id, object_type_name, name, attr_type)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(tenant_id, object_type_name, name) DO UPDATE SET attr_type = excluded.attr_type
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(object_type_name)
    .bind(name)
    .bind(attr_type)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_document(
    pool: &SqlitePool,
    tenant_id: Uuid,
    name: &str,
    file_name: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO documents (id, tenant_id, name, file_name) VALUES (?, ?, ?, ?)
        ON CONFLICT(tenant_id, name) DO UPDATE SET file_name = excluded.file_name
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(name)
    .bind(file_name)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_template(
    pool: &SqlitePool,
    tenant_id: Uuid,
    name: &str,
    file_name: Option<&str>,
    is_default: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO templates (id, tenant_id, name, file_name, is_default) VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(tenant_id, name) DO UPDATE SET
            file_name = excluded.file_name,
            is_default = excluded.is_default
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(name)
    .bind(file_name)
    .bind(is_default as i64)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn default_template_count(pool: &SqlitePool, tenant_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM templates WHERE tenant_id = ? AND is_default = 1",
    )
    .bind(tenant_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Checklist item resource: vendors and steps flow through the same
/// mutation, tagged rather than stringly switched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecklistResource {
    Vendor(String),
    Step(String),
}

impl ChecklistResource {
    pub fn kind(&self) -> &'static str {
        match self {
            ChecklistResource::Vendor(_) => "vendor",
            ChecklistResource::Step(_) => "step",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ChecklistResource::Vendor(id) | ChecklistResource::Step(id) => id,
        }
    }
}

pub async fn upsert_checklist(pool: &SqlitePool, tenant_id: Uuid, name: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO checklists (id, tenant_id, name) VALUES (?, ?, ?)
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

pub async fn upsert_checklist_item(
    pool: &SqlitePool,
    tenant_id: Uuid,
    checklist_name: &str,
    resource: &ChecklistResource,
    description: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO checklist_items
            (id, tenant_id, checklist_name, resource_kind, resource_id, description)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(tenant_id, checklist_name, resource_kind, resource_id)
            DO UPDATE SET description = excluded.description
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .bind(checklist_name)
    .bind(resource.kind())
    .bind(resource.id())
    .bind(description)
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
    async fn org_vendor_bulk_insert_skips_duplicates() {
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

        let added = add_org_vendors(
            &pool,
            tenant.id,
            &["Slack".to_string(), "GitHub".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(added, 2);

        let added = add_org_vendors(
            &pool,
            tenant.id,
            &["Slack".to_string(), "Datadog".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(added, 1);

        assert_eq!(org_vendor_names(&pool, tenant.id).await.unwrap().len(), 3);
    }

    #[test]
    fn checklist_resource_tags() {
        let v = ChecklistResource::Vendor("slack".to_string());
        let s = ChecklistResource::Step("revoke-access".to_string());
        assert_eq!(v.kind(), "vendor");
        assert_eq!(s.kind(), "step");
        assert_eq!(s.id(), "revoke-access");
    }
}
