//! Questionnaire submission
//!
//! Submitting the onboarding questionnaire stores the capture, advances
//! the v2 machine, infers organization vendors from the answers, kicks
//! off user invitations for the contact fields, and queues a CRM
//! enrichment pull for the tenant.

use polaris_common::db::models::UserRole;
use polaris_common::{Error, Result};
use uuid::Uuid;

use super::machine::{self, EventV2};
use super::vendors::{filter_known, infer_vendor_names, Answer};
use crate::db;
use crate::services::idp::CreateUserRequest;
use crate::state::AppState;
use crate::tasks::RetryPolicy;

/// Contact fields whose answers receive an invitation
const INVITE_KEYS: &[&str] = &[
    "security_lead_email",
    "engineering_lead_email",
    "hr_lead_email",
];

#[derive(Debug, Clone)]
pub struct QuestionnaireSubmission {
    pub questionary_id: String,
    pub typeform_response_id: String,
    pub answers: Vec<Answer>,
    pub submitted_by: Option<Uuid>,
}

/// Handle one questionnaire submission end to end
pub async fn submit_questionnaire(
    state: &AppState,
    tenant_id: Uuid,
    submission: QuestionnaireSubmission,
) -> Result<usize> {
    let onboarding = db::onboarding::get_by_tenant(&state.db, tenant_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("onboarding for tenant {tenant_id}")))?;

    // Captures are append-only; every submission is stored
    let response_json = serde_json::to_value(&submission.answers)
        .map_err(|e| Error::Internal(format!("answer serialization: {e}")))?;
    db::onboarding::insert_response(
        &state.db,
        tenant_id,
        &submission.questionary_id,
        &submission.typeform_response_id,
        &response_json,
        submission.submitted_by,
    )
    .await?;

    // A tenant re-submitting after moving on keeps the capture; the
    // machine stays where it is.
    match machine::apply_v2(state, onboarding.id, EventV2::QuestionnaireSubmitted).await {
        Ok(_) => {}
        Err(Error::InvalidTransition { .. }) => {
            tracing::debug!(tenant_id = %tenant_id, "Questionnaire re-submitted past its state");
        }
        Err(e) => return Err(e),
    }

    // Vendor inference against the known catalog
    let candidates = infer_vendor_names(&submission.answers);
    let known = db::content::library::known_vendor_names(&state.db).await?;
    let matched = filter_known(&candidates, &known);
    let added = db::content::library::add_org_vendors(&state.db, tenant_id, &matched).await?;
    tracing::info!(
        tenant_id = %tenant_id,
        candidates = candidates.len(),
        added,
        "Vendor inference finished"
    );

    // Invitations for the contact fields run in the background
    let invite_emails: Vec<String> = submission
        .answers
        .iter()
        .filter_map(|a| match a {
            Answer::Email { field_ref, email } if INVITE_KEYS.contains(&field_ref.as_str()) => {
                Some(email.clone())
            }
            _ => None,
        })
        .collect();

    if !invite_emails.is_empty() {
        let task_state = state.clone();
        state
            .tasks
            .dispatch("onboarding_invitations", RetryPolicy::default(), move || {
                let state = task_state.clone();
                let emails = invite_emails.clone();
                async move { invite_contacts(&state, tenant_id, &emails).await }
            })
            .await?;
    }

    // CRM enrichment pull, if the tenant is linked to an account
    let tenant = db::tenants::get(&state.db, tenant_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tenant {tenant_id}")))?;
    if tenant.sfdc_id.is_some() && state.crm.is_some() {
        let task_state = state.clone();
        state
            .tasks
            .dispatch("crm_enrichment_pull", RetryPolicy::crm_sync(), move || {
                let state = task_state.clone();
                async move { crate::crm::outbound::enrich_tenant(&state, tenant_id).await }
            })
            .await?;
    }

    Ok(added)
}

/// Create store users and IdP identities for questionnaire contacts
async fn invite_contacts(state: &AppState, tenant_id: Uuid, emails: &[String]) -> Result<()> {
    let tenant = db::tenants::get(&state.db, tenant_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tenant {tenant_id}")))?;
    let idp = state.idp.for_tenant(&state.db, tenant_id).await?;

    for email in emails {
        let user = match db::users::get_by_email(&state.db, email).await? {
            Some(user) => user,
            None => {
                db::users::insert(
                    &state.db,
                    &db::users::NewUser {
                        tenant_id: Some(tenant_id),
                        email: email.clone(),
                        first_name: String::new(),
                        last_name: String::new(),
                        role: UserRole::Admin,
                        idp: idp.kind(),
                        is_active: false,
                    },
                )
                .await?
            }
        };

        if user.username.is_none() {
            let issued = idp
                .create_user(&CreateUserRequest {
                    first_name: user.first_name.clone(),
                    last_name: user.last_name.clone(),
                    email: email.clone(),
                    tenant_name: tenant.name.clone(),
                    groups: vec![UserRole::Admin.as_str().to_string()],
                })
                .await?;
            db::users::set_username(&state.db, user.id, idp.kind(), &issued.username).await?;
        }

        db::users::record_invitation_sent(&state.db, user.id).await?;
        tracing::info!(tenant_id = %tenant_id, email = %email, "Onboarding invitation sent");
    }

    Ok(())
}
