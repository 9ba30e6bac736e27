//! Database initialization
//!
//! Creates the connection pool and the full schema. Every statement is
//! idempotent (CREATE TABLE IF NOT EXISTS), so startup doubles as the
//! migration path for fresh databases.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer; the seed engine and
    // the webhook handlers overlap constantly.
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// In-memory database for tests. A single connection keeps every query on
/// the same in-memory instance.
pub async fn init_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent - safe to call multiple times)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_tenants_table(pool).await?;
    create_onboarding_tables(pool).await?;
    create_users_table(pool).await?;
    create_feature_flags_table(pool).await?;
    create_seed_tables(pool).await?;
    create_migration_runs_table(pool).await?;
    create_api_tokens_table(pool).await?;
    create_task_runs_table(pool).await?;

    // Content tables owned by the seed/prescription/migration engines
    create_certification_tables(pool).await?;
    create_control_tables(pool).await?;
    create_program_tables(pool).await?;
    create_people_tables(pool).await?;
    create_library_tables(pool).await?;
    create_checklist_tables(pool).await?;
    create_evidence_table(pool).await?;
    create_audits_table(pool).await?;
    create_drives_table(pool).await?;
    create_blueprint_history_table(pool).await?;
    create_integration_connections_table(pool).await?;

    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_tenants_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenants (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            website TEXT UNIQUE,
            state TEXT NOT NULL DEFAULT 'ONBOARDING',
            tier TEXT,
            sfdc_id TEXT UNIQUE,
            csm_user_id TEXT,
            ca_user_id TEXT,
            contract_sign_date TEXT,
            is_internal INTEGER NOT NULL DEFAULT 0,
            billing_address TEXT,
            row_version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_onboarding_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS onboardings (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL UNIQUE REFERENCES tenants(id) ON DELETE CASCADE,
            state_v1 TEXT NOT NULL DEFAULT 'INIT',
            state_v2 TEXT NOT NULL DEFAULT 'questionnaire',
            period_ends TEXT,
            calendly_event_id TEXT,
            calendly_invitee_id TEXT,
            review_notified INTEGER NOT NULL DEFAULT 0,
            row_version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS onboarding_setup_steps (
            onboarding_id TEXT NOT NULL REFERENCES onboardings(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            UNIQUE(onboarding_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS onboarding_responses (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            questionary_id TEXT NOT NULL,
            typeform_response_id TEXT NOT NULL,
            response_json TEXT NOT NULL,
            submitted_by_user_id TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            tenant_id TEXT REFERENCES tenants(id) ON DELETE CASCADE,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            username TEXT,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            role TEXT NOT NULL DEFAULT 'Member',
            idp TEXT NOT NULL DEFAULT 'COGNITO',
            external_id TEXT,
            is_active INTEGER NOT NULL DEFAULT 0,
            last_login TEXT,
            invitation_sent_at TEXT,
            deleted_at TEXT,
            manager_user_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(idp, username)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_feature_flags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feature_flags (
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 0,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_seed_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seed_runs (
            id TEXT PRIMARY KEY,
            tenant_id TEXT REFERENCES tenants(id) ON DELETE CASCADE,
            profile_id TEXT,
            archive_path TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            status_detail TEXT NOT NULL DEFAULT '',
            created_by_user_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seed_profiles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            content_kind TEXT NOT NULL DEFAULT 'NONE',
            visible INTEGER NOT NULL DEFAULT 1,
            archive_path TEXT NOT NULL,
            default_base INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_migration_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migration_runs (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            frameworks TEXT NOT NULL DEFAULT '[]',
            mapping_path TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            status_detail TEXT NOT NULL DEFAULT '',
            mapped_subtasks TEXT,
            created_by_user_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_api_tokens_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_tokens (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            token_identifier TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(tenant_id, token_identifier)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_task_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_runs (
            id TEXT PRIMARY KEY,
            task_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'QUEUED',
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_certification_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS certification_sections (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            certification_name TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(tenant_id, certification_name, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS org_certifications (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS unlocked_certifications (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            certification_name TEXT NOT NULL,
            unlocked_at TEXT NOT NULL,
            UNIQUE(tenant_id, certification_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS archived_unlocked_certifications (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            certification_name TEXT NOT NULL,
            archived_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS certification_logos (
            id TEXT PRIMARY KEY,
            certification_name TEXT NOT NULL UNIQUE,
            logo_file TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_control_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS control_groups (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS controls (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            reference_id TEXT,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status TEXT,
            implementation_notes TEXT,
            owner_user_id TEXT,
            group_name TEXT,
            framework_tag TEXT,
            is_custom INTEGER NOT NULL DEFAULT 0,
            UNIQUE(tenant_id, reference_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS control_cert_sections (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            control_reference TEXT NOT NULL,
            certification_name TEXT NOT NULL,
            section_name TEXT NOT NULL,
            UNIQUE(tenant_id, control_reference, certification_name, section_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS action_items (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            reference_id TEXT,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status TEXT,
            assignee_user_id TEXT,
            due_date TEXT,
            completion_date TEXT,
            required_evidence TEXT,
            recurring_schedule TEXT,
            control_reference TEXT,
            UNIQUE(tenant_id, reference_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_program_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS programs (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS program_tasks (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            program_name TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(tenant_id, program_name, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subtasks (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            reference_id TEXT NOT NULL,
            program_name TEXT NOT NULL,
            task_name TEXT NOT NULL,
            name TEXT NOT NULL,
            migration_id TEXT,
            assignee_user_id TEXT,
            due_date TEXT,
            completion_date TEXT,
            action_item_id TEXT,
            UNIQUE(tenant_id, reference_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS howtoguides (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            task_name TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL DEFAULT '',
            UNIQUE(tenant_id, task_name, title)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_people_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trainings (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS officers (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            user_email TEXT,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS team_members (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            team_name TEXT NOT NULL,
            user_email TEXT NOT NULL,
            UNIQUE(tenant_id, team_name, user_email)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_library_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS policies (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            document_file TEXT,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Global known-vendor catalog; per-tenant rows live in org_vendors
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vendors (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            logo_file TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS org_vendors (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            vendor_name TEXT NOT NULL,
            UNIQUE(tenant_id, vendor_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS library_questions (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            question TEXT NOT NULL,
            answer TEXT NOT NULL DEFAULT '',
            UNIQUE(tenant_id, question)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS object_types (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            display_index INTEGER NOT NULL DEFAULT 0,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS object_type_attributes (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            object_type_name TEXT NOT NULL,
            name TEXT NOT NULL,
            attr_type TEXT NOT NULL DEFAULT 'text',
            UNIQUE(tenant_id, object_type_name, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            file_name TEXT,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS templates (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            file_name TEXT,
            is_default INTEGER NOT NULL DEFAULT 0,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_checklist_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checklists (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // resource_kind + resource_id encode the tagged resource variant
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checklist_items (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            checklist_name TEXT NOT NULL,
            resource_kind TEXT NOT NULL CHECK(resource_kind IN ('vendor', 'step')),
            resource_id TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            UNIQUE(tenant_id, checklist_name, resource_kind, resource_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_evidence_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evidence (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            owner_kind TEXT NOT NULL CHECK(owner_kind IN ('subtask', 'action_item', 'control')),
            owner_id TEXT NOT NULL,
            file_name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_audits_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audits (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            completion_date TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_drives_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS drives (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL UNIQUE REFERENCES tenants(id) ON DELETE CASCADE,
            root_key TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_blueprint_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blueprint_history (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            detail TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_integration_connections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS integration_connections (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            vendor_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Initialize default settings (only inserts missing keys)
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    let defaults: &[(&str, &str)] = &[
        ("invitation_expiration_days", "30"),
        ("database_max_lock_wait_ms", "5000"),
        ("task_worker_count", "4"),
    ];

    for (key, value) in defaults {
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(pool)
            .await?;
    }

    Ok(())
}
