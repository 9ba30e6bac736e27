//! Inbound account reconciliation
//!
//! One decision tree for webhook deliveries and pulled accounts: a known
//! external id updates the tenant's base fields and reconciles the CSM
//! and CA references; an unknown id creates the tenant with its admin IdP
//! identities. Replaying a payload is a no-op by construction.

use polaris_common::db::models::{Tenant, User, UserRole};
use polaris_common::events::TenantSource;
use polaris_common::{Error, Result};
use uuid::Uuid;

use super::types::{map_account_status, status_allows_creation, CrmAccount};
use crate::db;
use crate::db::tenants::{NewTenant, TenantPatch};
use crate::services::idp::CreateUserRequest;
use crate::state::AppState;
use crate::tasks::RetryPolicy;

/// What processing one account did
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub tenant_id: Uuid,
    pub created: bool,
    pub status_lines: Vec<String>,
}

/// The inbound decision tree
pub async fn process_account(state: &AppState, account: &CrmAccount) -> Result<SyncOutcome> {
    match db::tenants::get_by_sfdc_id(&state.db, &account.sfdc_id).await? {
        Some(tenant) => update_existing(state, tenant, account).await,
        None => create_from_account(state, account).await,
    }
}

/// Known account: update only the fields the payload carries, then
/// reconcile the CSM/CA user references.
async fn update_existing(
    state: &AppState,
    tenant: Tenant,
    account: &CrmAccount,
) -> Result<SyncOutcome> {
    let mut status_lines = Vec::new();

    let mut patch = TenantPatch {
        name: account.name.clone().filter(|n| *n != tenant.name),
        website: account.website.clone(),
        contract_sign_date: account.contract_sign_date,
        ..Default::default()
    };

    if let Some(status) = &account.account_status {
        match map_account_status(status) {
            Some(target) if target != tenant.state => patch.state = Some(target),
            Some(_) => {}
            None => status_lines.push(format!(
                "Account {}: unknown account status '{status}'",
                account.sfdc_id
            )),
        }
    }

    let tenant = match crate::store::update_tenant(state, tenant.id, &patch).await {
        Ok(tenant) => tenant,
        Err(Error::InvalidTransition { from, to }) => {
            status_lines.push(format!(
                "Account {}: state change {from} -> {to} refused",
                account.sfdc_id
            ));
            db::tenants::get(&state.db, tenant.id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("tenant {}", tenant.id)))?
        }
        Err(e) => return Err(e),
    };

    // CSM/CA reconciliation: a changed reference also provisions the
    // plus-addressed IdP admin for the new person.
    if let Some(csm_email) = &account.csm_email {
        reconcile_reference(state, &tenant, csm_email, ReferenceKind::Csm, &mut status_lines)
            .await?;
    }
    if let Some(ca_email) = &account.ca_email {
        reconcile_reference(state, &tenant, ca_email, ReferenceKind::Ca, &mut status_lines)
            .await?;
    }

    Ok(SyncOutcome {
        tenant_id: tenant.id,
        created: false,
        status_lines,
    })
}

#[derive(Clone, Copy)]
enum ReferenceKind {
    Csm,
    Ca,
}

async fn reconcile_reference(
    state: &AppState,
    tenant: &Tenant,
    email: &str,
    kind: ReferenceKind,
    status_lines: &mut Vec<String>,
) -> Result<()> {
    let Some(user) = db::users::get_by_email(&state.db, email).await? else {
        status_lines.push(format!(
            "Account {}: no Polaris user for {email}",
            tenant.sfdc_id.as_deref().unwrap_or("?")
        ));
        return Ok(());
    };

    let current = match kind {
        ReferenceKind::Csm => tenant.csm_user_id,
        ReferenceKind::Ca => tenant.ca_user_id,
    };
    if current == Some(user.id) {
        return Ok(());
    }

    let patch = match kind {
        ReferenceKind::Csm => TenantPatch {
            csm_user_id: Some(user.id),
            ..Default::default()
        },
        ReferenceKind::Ca => TenantPatch {
            ca_user_id: Some(user.id),
            ..Default::default()
        },
    };
    crate::store::update_tenant(state, tenant.id, &patch).await?;

    provision_super_admin(state, tenant, &user).await?;
    Ok(())
}

/// Unknown account: validate, create the tenant, provision the CSM and
/// CA super-admin identities, schedule prescription and seeding.
async fn create_from_account(state: &AppState, account: &CrmAccount) -> Result<SyncOutcome> {
    let mut missing = Vec::new();
    if account.name.is_none() {
        missing.push("Name");
    }
    if account.website.is_none() {
        missing.push("Website");
    }
    if account.csm_email.is_none() {
        missing.push("Customer_Success_Manager__r");
    }
    if account.ca_email.is_none() {
        missing.push("Compliance_Architect__r");
    }
    if account.account_status.is_none() {
        missing.push("Account_Status__c");
    }
    if !missing.is_empty() {
        return Err(Error::Validation(format!(
            "Account {}: missing required fields: {}",
            account.sfdc_id,
            missing.join(", ")
        )));
    }

    let status = account.account_status.as_deref().expect("checked above");
    if !status_allows_creation(status) {
        return Err(Error::Validation(format!(
            "Account {}: unknown account status '{status}'",
            account.sfdc_id
        )));
    }

    let csm_email = account.csm_email.as_deref().expect("checked above");
    let ca_email = account.ca_email.as_deref().expect("checked above");

    let csm = db::users::get_by_email(&state.db, csm_email)
        .await?
        .ok_or_else(|| {
            Error::Validation(format!(
                "Account {}: no Polaris user for {csm_email}",
                account.sfdc_id
            ))
        })?;
    let ca = db::users::get_by_email(&state.db, ca_email)
        .await?
        .ok_or_else(|| {
            Error::Validation(format!(
                "Account {}: no Polaris user for {ca_email}",
                account.sfdc_id
            ))
        })?;

    let tenant = crate::store::create_tenant(
        state,
        NewTenant {
            name: account.name.clone().expect("checked above"),
            website: account.website.clone(),
            tier: None,
            sfdc_id: Some(account.sfdc_id.clone()),
            csm_user_id: Some(csm.id),
            ca_user_id: Some(ca.id),
            contract_sign_date: account.contract_sign_date,
            is_internal: false,
        },
        TenantSource::CrmInbound,
    )
    .await?;

    provision_super_admin(state, &tenant, &csm).await?;
    provision_super_admin(state, &tenant, &ca).await?;

    // Prescription applies synchronously; seeding runs in the background
    crate::prescription::run_prescription(state, tenant.id).await?;
    schedule_base_seed(state, &tenant).await?;

    let message = format!(
        "Organization '{}' created from Salesforce account {}",
        tenant.name, account.sfdc_id
    );
    if let Err(e) = state.slack.post_message(&message).await {
        tracing::warn!(tenant_id = %tenant.id, error = %e, "Creation Slack post failed");
    }

    Ok(SyncOutcome {
        tenant_id: tenant.id,
        created: true,
        status_lines: Vec::new(),
    })
}

/// Tenant-scoped super-admin identity for a CSM or CA, addressed with a
/// plus suffix so one person can hold one login per organization.
/// Idempotent: an existing store user with the derived email is left as
/// is, which keeps webhook replays from re-creating IdP users.
async fn provision_super_admin(state: &AppState, tenant: &Tenant, source: &User) -> Result<()> {
    let email = plus_address(&source.email, &tenant.name);
    if db::users::get_by_email(&state.db, &email).await?.is_some() {
        return Ok(());
    }

    let idp = state.idp.for_tenant(&state.db, tenant.id).await?;
    let admin = db::users::insert(
        &state.db,
        &db::users::NewUser {
            tenant_id: Some(tenant.id),
            email: email.clone(),
            first_name: source.first_name.clone(),
            last_name: source.last_name.clone(),
            role: UserRole::SuperAdmin,
            idp: idp.kind(),
            is_active: false,
        },
    )
    .await?;

    let issued = idp
        .create_user(&CreateUserRequest {
            first_name: source.first_name.clone(),
            last_name: source.last_name.clone(),
            email: email.clone(),
            tenant_name: tenant.name.clone(),
            groups: vec![UserRole::SuperAdmin.as_str().to_string()],
        })
        .await?;

    db::users::set_username(&state.db, admin.id, idp.kind(), &issued.username).await?;
    db::users::record_invitation_sent(&state.db, admin.id).await?;

    tracing::info!(
        tenant_id = %tenant.id,
        email = %email,
        idp = idp.kind().as_str(),
        "Super-admin identity provisioned"
    );
    Ok(())
}

/// Queue the default base seed for a new tenant, when one is configured
async fn schedule_base_seed(state: &AppState, tenant: &Tenant) -> Result<()> {
    let Some(profile) = db::seeds::get_default_base(&state.db).await? else {
        tracing::info!(tenant_id = %tenant.id, "No default base profile; seed skipped");
        return Ok(());
    };

    let run = db::seeds::create_run(
        &state.db,
        Some(tenant.id),
        Some(profile.id),
        &profile.archive_path,
        polaris_common::db::models::RunStatus::Pending,
        None,
    )
    .await?;

    let task_state = state.clone();
    let run_id = run.id;
    state
        .tasks
        .dispatch("seed_new_tenant", RetryPolicy::no_retry(), move || {
            let state = task_state.clone();
            async move { crate::seed::dispatch_seed(&state, run_id).await }
        })
        .await?;
    Ok(())
}

/// "csm@x" + "Acme Corp" -> "csm+acmecorp@x"
pub fn plus_address(email: &str, tenant_name: &str) -> String {
    let slug: String = tenant_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();

    match email.split_once('@') {
        Some((local, domain)) => format!("{local}+{slug}@{domain}"),
        None => format!("{email}+{slug}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_addressing_slugs_the_tenant_name() {
        assert_eq!(plus_address("csm@x", "Acme"), "csm+acme@x");
        assert_eq!(plus_address("ca@x.example", "Acme Corp!"), "ca+acmecorp@x.example");
    }
}
