//! Tenant store operations
//!
//! All tenant writes pass through here so the creation side effects and
//! the domain events stay in one place. On insert a tenant gets its
//! onboarding with the six setup steps, a default report template, a
//! drive namespace and the default feature flags.

use polaris_common::db::models::{Tenant, TenantState};
use polaris_common::events::{DomainEvent, TenantSource};
use polaris_common::{Error, Result};
use uuid::Uuid;

use crate::db;
use crate::db::tenants::{NewTenant, TenantPatch};
use crate::state::AppState;

pub const DEFAULT_REPORT_TEMPLATE: &str = "Compliance Report";

/// Create a tenant with all of its creation side effects
pub async fn create_tenant(
    state: &AppState,
    new: NewTenant,
    source: TenantSource,
) -> Result<Tenant> {
    let tenant = db::tenants::insert(&state.db, &new).await?;

    db::onboarding::create_for_tenant(&state.db, tenant.id).await?;

    db::content::library::upsert_template(
        &state.db,
        tenant.id,
        DEFAULT_REPORT_TEMPLATE,
        None,
        true,
    )
    .await?;

    let root_key = state.drive.ensure_namespace(tenant.id)?;
    db::content::misc::create_drive(&state.db, tenant.id, &root_key).await?;

    for (flag, enabled) in crate::flags::DEFAULT_TENANT_FLAGS {
        db::feature_flags::set(&state.db, tenant.id, flag, *enabled).await?;
    }

    tracing::info!(tenant_id = %tenant.id, name = %tenant.name, "Tenant created");

    state.events.emit_lossy(DomainEvent::TenantCreated {
        tenant_id: tenant.id,
        name: tenant.name.clone(),
        source,
        timestamp: chrono::Utc::now(),
    });

    Ok(tenant)
}

/// Partial update with event emission
pub async fn update_tenant(state: &AppState, id: Uuid, patch: &TenantPatch) -> Result<Tenant> {
    let tenant = db::tenants::update(&state.db, id, patch).await?;

    state.events.emit_lossy(DomainEvent::TenantUpdated {
        tenant_id: tenant.id,
        state: tenant.state.as_str().to_string(),
        timestamp: chrono::Utc::now(),
    });

    Ok(tenant)
}

/// Delete a tenant and its dependents. IdP users and blob storage go
/// first; the row delete then cascades to everything tenant-scoped.
pub async fn delete_tenant(state: &AppState, id: Uuid, actor: Option<Uuid>) -> Result<()> {
    let tenant = db::tenants::get(&state.db, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tenant {id}")))?;

    // IdP identities first: once the row is gone there is no record of
    // which back-end held them.
    let idp = state.idp.for_tenant(&state.db, id).await?;
    let usernames: Vec<Option<String>> =
        sqlx::query_scalar("SELECT username FROM users WHERE tenant_id = ?")
            .bind(id.to_string())
            .fetch_all(&state.db)
            .await?;
    for username in usernames.into_iter().flatten() {
        if let Err(e) = idp.delete_user(&username).await {
            tracing::warn!(tenant_id = %id, username = %username, error = %e,
                "IdP user deletion failed during tenant delete");
        }
    }

    db::content::misc::delete_integration_connections(&state.db, id).await?;
    state.drive.delete_namespace(id)?;
    db::tenants::delete(&state.db, id).await?;

    tracing::info!(tenant_id = %id, name = %tenant.name, "Tenant deleted");

    state.events.emit_lossy(DomainEvent::TenantDeleted {
        tenant_id: id,
        actor_user_id: actor,
        timestamp: chrono::Utc::now(),
    });

    Ok(())
}

pub async fn set_feature_flag(
    state: &AppState,
    tenant_id: Uuid,
    name: &str,
    enabled: bool,
) -> Result<()> {
    db::feature_flags::set(&state.db, tenant_id, name, enabled).await
}

/// Switch a tenant between identity back-ends. Admin-only: every user of
/// the tenant is re-created on the target back-end and handed a fresh
/// temporary password; the flag flips only after the users exist there.
pub async fn switch_idp_backend(state: &AppState, tenant_id: Uuid, use_okta: bool) -> Result<()> {
    let tenant = db::tenants::get(&state.db, tenant_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tenant {tenant_id}")))?;

    let current = state.idp.for_tenant(&state.db, tenant_id).await?;
    let target = state.idp.by_kind(if use_okta {
        polaris_common::db::models::IdpKind::Okta
    } else {
        polaris_common::db::models::IdpKind::Cognito
    });
    if current.kind() == target.kind() {
        return Ok(());
    }

    let users: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT id, username FROM users WHERE tenant_id = ? AND deleted_at IS NULL")
            .bind(tenant_id.to_string())
            .fetch_all(&state.db)
            .await?;

    for (user_id, old_username) in users {
        let user_id = db::tenants::parse_uuid(&user_id)?;
        let user = db::users::get(&state.db, user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))?;

        let issued = target
            .create_user(&crate::services::idp::CreateUserRequest {
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                email: user.email.clone(),
                tenant_name: tenant.name.clone(),
                groups: vec![user.role.as_str().to_string()],
            })
            .await?;
        db::users::set_username(&state.db, user.id, target.kind(), &issued.username).await?;

        if let Some(old_username) = old_username {
            if let Err(e) = current.delete_user(&old_username).await {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    username = %old_username,
                    error = %e,
                    "Old back-end user deletion failed during switch"
                );
            }
        }
    }

    db::feature_flags::set(&state.db, tenant_id, crate::flags::OKTA, use_okta).await?;
    tracing::info!(
        tenant_id = %tenant_id,
        target = target.kind().as_str(),
        "Identity back-end switched"
    );
    Ok(())
}

/// Activate a tenant when its onboarding completes
pub async fn activate_tenant(state: &AppState, tenant_id: Uuid) -> Result<Tenant> {
    update_tenant(
        state,
        tenant_id,
        &TenantPatch {
            state: Some(TenantState::Active),
            ..Default::default()
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskDispatcher;
    use polaris_common::db::init_in_memory;
    use tokio_util::sync::CancellationToken;

    async fn test_state() -> AppState {
        let pool = init_in_memory().await.unwrap();
        let tasks = TaskDispatcher::start(pool.clone(), 1, CancellationToken::new());
        AppState::for_tests(pool, tasks)
    }

    fn new_tenant(name: &str) -> NewTenant {
        NewTenant {
            name: name.to_string(),
            website: Some(format!("https://{}.example", name.to_lowercase())),
            tier: None,
            sfdc_id: None,
            csm_user_id: None,
            ca_user_id: None,
            contract_sign_date: None,
            is_internal: false,
        }
    }

    #[tokio::test]
    async fn creation_produces_template_drive_steps_and_flags() {
        let state = test_state().await;
        let tenant = create_tenant(&state, new_tenant("Acme"), TenantSource::Admin)
            .await
            .unwrap();

        // One default report template and one drive
        assert_eq!(
            db::content::library::default_template_count(&state.db, tenant.id)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            db::content::misc::drive_count(&state.db, tenant.id)
                .await
                .unwrap(),
            1
        );

        // Six setup steps via the auto-created onboarding
        let onboarding = db::onboarding::get_by_tenant(&state.db, tenant.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            db::onboarding::steps(&state.db, onboarding.id)
                .await
                .unwrap()
                .len(),
            6
        );

        // Default feature flags are present
        let flags = db::feature_flags::all_for_tenant(&state.db, tenant.id)
            .await
            .unwrap();
        assert_eq!(flags.len(), crate::flags::DEFAULT_TENANT_FLAGS.len());
    }

    #[tokio::test]
    async fn creation_emits_tenant_created() {
        let state = test_state().await;
        let mut rx = state.events.subscribe();

        create_tenant(&state, new_tenant("Acme"), TenantSource::CrmInbound)
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            DomainEvent::TenantCreated { name, source, .. } => {
                assert_eq!(name, "Acme");
                assert_eq!(source, TenantSource::CrmInbound);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn backend_switch_recreates_users_and_flips_the_flag() {
        use polaris_common::db::models::{IdpKind, UserRole};

        let state = test_state().await;
        let tenant = create_tenant(&state, new_tenant("Acme"), TenantSource::Admin)
            .await
            .unwrap();

        let user = db::users::insert(
            &state.db,
            &db::users::NewUser {
                tenant_id: Some(tenant.id),
                email: "ada@acme.example".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Li".to_string(),
                role: UserRole::Admin,
                idp: IdpKind::Cognito,
                is_active: true,
            },
        )
        .await
        .unwrap();
        let issued = state
            .idp
            .by_kind(IdpKind::Cognito)
            .create_user(&crate::services::idp::CreateUserRequest {
                first_name: "Ada".to_string(),
                last_name: "Li".to_string(),
                email: "ada@acme.example".to_string(),
                tenant_name: "Acme".to_string(),
                groups: vec![],
            })
            .await
            .unwrap();
        db::users::set_username(&state.db, user.id, IdpKind::Cognito, &issued.username)
            .await
            .unwrap();

        switch_idp_backend(&state, tenant.id, true).await.unwrap();

        assert!(
            db::feature_flags::is_enabled(&state.db, tenant.id, crate::flags::OKTA)
                .await
                .unwrap()
        );
        let switched = db::users::get(&state.db, user.id).await.unwrap().unwrap();
        assert_eq!(switched.idp, IdpKind::Okta);
        assert!(switched.username.is_some());

        // Re-running with the same target is a no-op
        switch_idp_backend(&state, tenant.id, true).await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_row_and_namespace() {
        let state = test_state().await;
        let tenant = create_tenant(&state, new_tenant("Acme"), TenantSource::Admin)
            .await
            .unwrap();
        assert!(state.drive.exists(tenant.id));

        delete_tenant(&state, tenant.id, None).await.unwrap();
        assert!(db::tenants::get(&state.db, tenant.id).await.unwrap().is_none());
        assert!(!state.drive.exists(tenant.id));
    }
}
