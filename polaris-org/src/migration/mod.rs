//! Migration engine
//!
//! One-shot conversion of a tenant from the legacy Playbooks content
//! model to My Compliance. Steps run strictly in order and a step failure
//! aborts the run as FAILED, preserving the progress lines accumulated so
//! far. The run holds the tenant's advisory lock throughout, making it
//! mutually exclusive with seed runs and with other migrations of the
//! same tenant.

pub mod mapping;

use polaris_common::db::models::{MigrationRun, RunStatus};
use polaris_common::events::DomainEvent;
use polaris_common::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use crate::db;
use crate::db::content::misc::EvidenceOwner;
use crate::db::content::{certifications, controls, misc, programs};
use crate::state::AppState;

/// Execute a queued migration run
pub async fn run_migration(state: &AppState, migration_id: Uuid) -> Result<()> {
    let run = db::migration_runs::get(&state.db, migration_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("migration run {migration_id}")))?;

    let tenant = db::tenants::get(&state.db, run.tenant_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tenant {}", run.tenant_id)))?;

    // Serializes against seeds and concurrent migrations of this tenant
    let _guard = state.locks.acquire(run.tenant_id).await;

    db::migration_runs::set_status(&state.db, run.id, RunStatus::InProgress, "").await?;
    tracing::info!(
        migration_id = %run.id,
        tenant_id = %run.tenant_id,
        frameworks = ?run.frameworks,
        "Migration started"
    );

    let mut detail: Vec<String> = Vec::new();
    let default_owner = run.created_by_user_id.or(tenant.csm_user_id);

    let outcome = execute_steps(state, &run, default_owner, &mut detail).await;

    let (status, mapped) = match outcome {
        Ok(mapped) => (RunStatus::Done, Some(mapped)),
        Err(e) => {
            detail.push(format!("Migration aborted: {e}"));
            (RunStatus::Failed, None)
        }
    };

    db::migration_runs::set_status(&state.db, run.id, status, &detail.join("\n")).await?;
    if let Some(mapped) = &mapped {
        db::migration_runs::set_mapped_subtasks(&state.db, run.id, mapped).await?;
    }

    tracing::info!(
        migration_id = %run.id,
        status = status.as_str(),
        mapped = mapped.as_deref().unwrap_or("-"),
        "Migration finished"
    );

    // Delivered to the initiator as an alert by the transport layer
    state.events.emit_lossy(DomainEvent::MigrationFinished {
        migration_id: run.id,
        tenant_id: run.tenant_id,
        status: status.as_str().to_string(),
        mapped_subtasks: mapped.unwrap_or_default(),
        initiator_user_id: run.created_by_user_id,
        timestamp: chrono::Utc::now(),
    });

    Ok(())
}

/// The eight ordered steps. Returns the "mapped/total" counter.
async fn execute_steps(
    state: &AppState,
    run: &MigrationRun,
    default_owner: Option<Uuid>,
    detail: &mut Vec<String>,
) -> Result<String> {
    let tenant_id = run.tenant_id;

    // 1. Archive currently-unlocked certifications
    let archived = certifications::archive_unlocked(&state.db, tenant_id).await?;
    detail.push(format!("Archived {archived} unlocked certifications"));

    // 2. Migrate legacy custom controls to the new representation
    let legacy = controls::legacy_controls(&state.db, tenant_id).await?;
    let mut custom_index = controls::custom_control_count(&state.db, tenant_id).await? as usize;
    let mut migrated_custom = 0usize;
    for control in legacy.iter().filter(|c| c.is_custom) {
        let reference = format!("CTRL-CUSTOM-{custom_index:03}");
        custom_index += 1;
        controls::set_control_reference(&state.db, control.id, &reference).await?;
        migrated_custom += 1;
    }
    detail.push(format!("Migrated {migrated_custom} custom controls"));

    // 3. Delete legacy playbooks controls with no notes and no evidence
    let legacy = controls::legacy_controls(&state.db, tenant_id).await?;
    let mut deleted = 0usize;
    for control in legacy.iter().filter(|c| !c.is_custom) {
        let has_notes = control
            .implementation_notes
            .as_deref()
            .map(|n| !n.trim().is_empty())
            .unwrap_or(false);
        if has_notes {
            continue;
        }
        if misc::evidence_exists(&state.db, EvidenceOwner::Control, control.id).await? {
            continue;
        }
        controls::delete_control(&state.db, control.id).await?;
        deleted += 1;
    }
    detail.push(format!("Deleted {deleted} legacy controls"));

    // 4. Unlock the requested frameworks
    for framework in &run.frameworks {
        certifications::unlock(&state.db, tenant_id, framework).await?;
    }
    detail.push(format!("Unlocked {} frameworks", run.frameworks.len()));

    // 5. Apply the per-framework seed profile, synchronously, alerts off
    for framework in &run.frameworks {
        match db::seeds::get_profile_by_name(&state.db, framework).await? {
            Some(profile) => {
                let child = db::seeds::create_run(
                    &state.db,
                    Some(tenant_id),
                    Some(profile.id),
                    &profile.archive_path,
                    RunStatus::Pending,
                    run.created_by_user_id,
                )
                .await?;
                crate::seed::engine::run_seed_for_tenant_locked(state, &child, tenant_id).await?;
                detail.push(format!("Applied seed profile '{framework}'"));
            }
            None => {
                detail.push(format!("No seed profile found for framework '{framework}'"));
            }
        }
    }

    // 6. Toggle the tenant's feature flags onto the new model
    for flag in crate::flags::MY_COMPLIANCE_MIGRATION_FLAGS {
        db::feature_flags::set(&state.db, tenant_id, flag, true).await?;
    }
    db::feature_flags::delete(&state.db, tenant_id, crate::flags::PLAYBOOKS).await?;

    // 7. Map legacy sub-tasks onto their new action items
    let mapping = mapping::load_mapping(Path::new(&run.mapping_path))?;
    let mapped = map_subtasks(state, tenant_id, &mapping, detail).await?;

    // 8. Close out controls in the selected frameworks
    let completion_date = misc::latest_audit_completion(&state.db, tenant_id).await?;
    let framework_controls =
        controls::controls_in_frameworks(&state.db, tenant_id, &run.frameworks).await?;
    for control in &framework_controls {
        if let Some(reference) = &control.reference_id {
            let unset =
                controls::unset_action_items_for_control(&state.db, tenant_id, reference).await?;
            for item in unset {
                controls::complete_action_item(&state.db, item, completion_date.as_deref())
                    .await?;
            }
        }
        controls::set_control_status_if_unset(&state.db, control.id, "Implemented").await?;
        if let Some(owner) = default_owner {
            controls::set_control_owner_if_unset(&state.db, control.id, owner).await?;
        }
    }
    detail.push(format!(
        "Closed out {} framework controls",
        framework_controls.len()
    ));

    Ok(mapped)
}

/// Step 7: look up each sub-task's migration id in the mapping, copy its
/// assignment fields and evidence onto the action item, link the two.
/// Unmapped sub-tasks are recorded; the counter is "mapped/total".
async fn map_subtasks(
    state: &AppState,
    tenant_id: Uuid,
    mapping: &HashMap<String, String>,
    detail: &mut Vec<String>,
) -> Result<String> {
    let subtasks = programs::list_subtasks(&state.db, tenant_id).await?;
    let total = subtasks.len();
    let mut mapped = 0usize;

    for subtask in &subtasks {
        let Some(migration_id) = subtask.migration_id.as_deref() else {
            detail.push(format!(
                "Subtask with id {} has no migration_id",
                subtask.id
            ));
            continue;
        };

        let Some(reference) = mapping.get(migration_id) else {
            detail.push(format!(
                "Subtask with id {} and migration_id {migration_id} was not found in mapping file",
                subtask.id
            ));
            continue;
        };

        let Some(action_item_id) =
            controls::action_item_id_by_reference(&state.db, tenant_id, reference).await?
        else {
            detail.push(format!(
                "Subtask with id {} maps to unknown action item {reference}",
                subtask.id
            ));
            continue;
        };

        let has_evidence =
            misc::evidence_exists(&state.db, EvidenceOwner::Subtask, subtask.id).await?;
        if has_evidence {
            misc::copy_evidence(
                &state.db,
                tenant_id,
                (EvidenceOwner::Subtask, subtask.id),
                (EvidenceOwner::ActionItem, action_item_id),
            )
            .await?;
        }

        controls::update_action_item_assignment(
            &state.db,
            action_item_id,
            subtask.assignee_user_id,
            subtask.due_date.as_deref(),
            subtask.completion_date.as_deref(),
            has_evidence.then_some("Yes"),
        )
        .await?;

        programs::link_subtask_to_action_item(&state.db, subtask.id, action_item_id).await?;
        mapped += 1;
    }

    Ok(format!("{mapped}/{total}"))
}
