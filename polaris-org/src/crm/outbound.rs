//! Outbound synchronization
//!
//! The periodic pull obtains an access token, fetches accounts the CRM
//! marked ready-to-sync, runs the inbound decision tree per account, and
//! pushes `{polarisID, salesforceID}` pairs for the accounts that became
//! tenants in this run. Failures surface through the task dispatcher's
//! retry policy (two automatic retries) and end up in Slack.

use polaris_common::events::DomainEvent;
use polaris_common::{Error, Result};
use uuid::Uuid;

use super::inbound;
use super::types::SalesforceAccountPayload;
use crate::db;
use crate::services::crm::BackReference;
use crate::state::AppState;

/// Body of the periodic sync task
pub async fn sync_salesforce(state: &AppState) -> Result<()> {
    let Some(crm) = state.crm.as_ref() else {
        tracing::info!("Salesforce client not configured; sync skipped");
        return Ok(());
    };

    let raw_accounts = crm.fetch_ready_accounts().await?;
    let known_ids = db::tenants::known_sfdc_ids(&state.db).await?;
    tracing::info!(
        pulled = raw_accounts.len(),
        known = known_ids.len(),
        "Salesforce sync pulled accounts"
    );

    let mut status_lines: Vec<String> = Vec::new();
    let mut back_references: Vec<BackReference> = Vec::new();
    let mut synced = 0usize;
    let mut failed = 0usize;

    for raw in raw_accounts {
        let payload: SalesforceAccountPayload = match serde_json::from_value(raw) {
            Ok(payload) => payload,
            Err(e) => {
                failed += 1;
                status_lines.push(format!("Unreadable account payload: {e}"));
                continue;
            }
        };
        let Some(account) = payload.normalize() else {
            failed += 1;
            status_lines.push("Account payload missing Account_ID_18_char__c".to_string());
            continue;
        };

        let was_known = known_ids.contains(&account.sfdc_id);
        match inbound::process_account(state, &account).await {
            Ok(outcome) => {
                synced += 1;
                status_lines.extend(outcome.status_lines);
                // Back-references go out only for accounts Polaris did
                // not know before this run
                if outcome.created && !was_known {
                    back_references.push(BackReference {
                        polaris_id: outcome.tenant_id.to_string(),
                        salesforce_id: account.sfdc_id.clone(),
                    });
                }
            }
            Err(Error::Validation(line)) => {
                failed += 1;
                status_lines.push(line);
            }
            Err(e) => return Err(e),
        }
    }

    crm.push_back_references(&back_references).await?;

    if !status_lines.is_empty() {
        if let Err(e) = state
            .slack
            .post_error_block("Salesforce sync issues", &status_lines)
            .await
        {
            tracing::warn!(error = %e, "Sync error block post failed");
        }
    }

    state.events.emit_lossy(DomainEvent::CrmSyncFinished {
        synced,
        failed,
        timestamp: chrono::Utc::now(),
    });

    tracing::info!(synced, failed, created = back_references.len(), "Salesforce sync finished");
    Ok(())
}

/// Enrichment pull for one tenant: fetch its account and re-run the
/// update path. Queued after questionnaire submission.
pub async fn enrich_tenant(state: &AppState, tenant_id: Uuid) -> Result<()> {
    let Some(crm) = state.crm.as_ref() else {
        return Ok(());
    };

    let tenant = db::tenants::get(&state.db, tenant_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tenant {tenant_id}")))?;
    let Some(sfdc_id) = tenant.sfdc_id.as_deref() else {
        return Ok(());
    };

    let Some(raw) = crm.fetch_account(sfdc_id).await? else {
        tracing::warn!(tenant_id = %tenant_id, sfdc_id, "Enrichment pull found no account");
        return Ok(());
    };

    let payload: SalesforceAccountPayload = serde_json::from_value(raw)
        .map_err(|e| Error::external("salesforce", format!("unreadable account: {e}")))?;
    let Some(account) = payload.normalize() else {
        return Ok(());
    };

    let outcome = inbound::process_account(state, &account).await?;
    for line in outcome.status_lines {
        tracing::warn!(tenant_id = %tenant_id, line = %line, "Enrichment status");
    }
    Ok(())
}
