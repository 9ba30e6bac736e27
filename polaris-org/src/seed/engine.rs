//! Seed run orchestration

use polaris_common::db::models::{RunStatus, SeedRun};
use polaris_common::events::DomainEvent;
use polaris_common::{Error, Result};
use std::path::Path;
use uuid::Uuid;

use super::archive::SeedArchive;
use super::naming::{detect_archive_kind, ArchiveKind, CertNaming};
use super::sheets::{process_sheet, SHEET_ORDER};
use crate::db;
use crate::state::AppState;

/// Reserved target name that fans one archive out to every My Compliance
/// tenant instead of a single organization.
pub const BULK_TARGET_SENTINEL: &str = "My Compliance Organizations Upsert";

/// Create a seed run for a named target. The reserved sentinel produces
/// a bulk run (no tenant); any other name must resolve to a tenant.
pub async fn create_seed_for_target(
    state: &AppState,
    target_name: &str,
    archive_path: &str,
    created_by: Option<Uuid>,
) -> Result<SeedRun> {
    if target_name == BULK_TARGET_SENTINEL {
        return db::seeds::create_run(
            &state.db,
            None,
            None,
            archive_path,
            RunStatus::Pending,
            created_by,
        )
        .await;
    }

    let tenant = db::tenants::get_by_name(&state.db, target_name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tenant named {target_name}")))?;
    db::seeds::create_run(
        &state.db,
        Some(tenant.id),
        None,
        archive_path,
        RunStatus::Pending,
        created_by,
    )
    .await
}

/// Entry point for a queued seed run: single-tenant or bulk, decided by
/// whether the run carries a tenant.
pub async fn dispatch_seed(state: &AppState, run_id: Uuid) -> Result<()> {
    let run = db::seeds::get_run(&state.db, run_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("seed run {run_id}")))?;

    match run.tenant_id {
        Some(tenant_id) => run_seed_for_tenant(state, &run, tenant_id, true).await,
        None => run_bulk_seed(state, &run).await,
    }
}

/// Run one seed against one tenant. Holds the tenant's advisory lock for
/// the whole run so concurrent seeds (and migrations) queue behind it.
pub async fn run_seed_for_tenant(
    state: &AppState,
    run: &SeedRun,
    tenant_id: Uuid,
    alerts: bool,
) -> Result<()> {
    let _guard = state.locks.acquire(tenant_id).await;

    db::seeds::set_run_status(&state.db, run.id, RunStatus::InProgress, "").await?;
    tracing::info!(seed_id = %run.id, tenant_id = %tenant_id, "Seed run started");

    let outcome = seed_tenant(state, run, tenant_id).await;

    let (status, detail) = match outcome {
        Ok(errors) => (RunStatus::Done, errors.join("\n")),
        Err(e) => (RunStatus::Failed, e.to_string()),
    };

    db::seeds::set_run_status(&state.db, run.id, status, &detail).await?;

    let error_count = if detail.is_empty() {
        0
    } else {
        detail.lines().count()
    };
    tracing::info!(
        seed_id = %run.id,
        tenant_id = %tenant_id,
        status = status.as_str(),
        error_count,
        "Seed run finished"
    );

    if alerts {
        finalize_alerts(state, run, Some(tenant_id), status, error_count).await;
    }

    Ok(())
}

/// Seed variant for callers that already hold the tenant's advisory lock
/// (the migration engine). Identical semantics, no lock acquisition.
pub async fn run_seed_for_tenant_locked(
    state: &AppState,
    run: &SeedRun,
    tenant_id: Uuid,
) -> Result<()> {
    db::seeds::set_run_status(&state.db, run.id, RunStatus::InProgress, "").await?;

    let outcome = seed_tenant(state, run, tenant_id).await;
    let (status, detail) = match outcome {
        Ok(errors) => (RunStatus::Done, errors.join("\n")),
        Err(e) => (RunStatus::Failed, e.to_string()),
    };
    db::seeds::set_run_status(&state.db, run.id, status, &detail).await?;

    if status == RunStatus::Failed {
        return Err(Error::Internal(format!("seed run {} failed: {detail}", run.id)));
    }
    Ok(())
}

/// The sheet loop. Returns accumulated row errors; Err is reserved for
/// run-fatal conditions (unreadable archive, missing sub-task reference).
async fn seed_tenant(state: &AppState, run: &SeedRun, tenant_id: Uuid) -> Result<Vec<String>> {
    let archive = SeedArchive::open(Path::new(&run.archive_path))?;

    let kind = detect_archive_kind(archive.sheet("controls"));
    let naming = CertNaming::for_kind(kind);

    let mut errors = Vec::new();
    if kind == ArchiveKind::Ambiguous {
        errors.push(
            "Warning: archive mixes My Compliance and playbooks control references; \
             certification names preserved verbatim"
                .to_string(),
        );
    }

    for sheet in SHEET_ORDER {
        let Some(records) = archive.sheet(sheet) else {
            continue;
        };
        process_sheet(state, tenant_id, &archive, sheet, records, &naming, &mut errors).await?;
    }

    Ok(errors)
}

/// Bulk mode: clone the parent run per resolved tenant, each with
/// UPDATING status, and run them sequentially under their own locks.
async fn run_bulk_seed(state: &AppState, parent: &SeedRun) -> Result<()> {
    db::seeds::set_run_status(&state.db, parent.id, RunStatus::InProgress, "").await?;

    // My Compliance organizations: active tenants off the playbooks model
    let targets = db::tenants::active_without_flag(&state.db, crate::flags::PLAYBOOKS).await?;
    tracing::info!(
        seed_id = %parent.id,
        targets = targets.len(),
        "Bulk seed resolved targets"
    );

    let mut summary = Vec::new();
    for tenant in &targets {
        let child = db::seeds::create_run(
            &state.db,
            Some(tenant.id),
            parent.profile_id,
            &parent.archive_path,
            RunStatus::Updating,
            parent.created_by_user_id,
        )
        .await?;

        if let Err(e) = run_seed_for_tenant(state, &child, tenant.id, false).await {
            summary.push(format!("Error seeding organization {}: {e}", tenant.name));
        }
    }

    let status = RunStatus::Done;
    db::seeds::set_run_status(&state.db, parent.id, status, &summary.join("\n")).await?;
    finalize_alerts(state, parent, None, status, summary.len()).await;

    Ok(())
}

/// Completion side effects: Slack note to the creator, dashboard alert
/// via the event bus, and monitor re-evaluation for active tenants.
async fn finalize_alerts(
    state: &AppState,
    run: &SeedRun,
    tenant_id: Option<Uuid>,
    status: RunStatus,
    error_count: usize,
) {
    state.events.emit_lossy(DomainEvent::SeedRunFinished {
        seed_id: run.id,
        tenant_id,
        status: status.as_str().to_string(),
        error_count,
        timestamp: chrono::Utc::now(),
    });

    let message = match tenant_id {
        Some(tenant_id) => format!(
            "Seeding finished: run {} for organization {tenant_id} ({}, {error_count} issue lines)",
            run.id,
            status.as_str()
        ),
        None => format!(
            "Seeding finished: bulk run {} ({}, {error_count} issue lines)",
            run.id,
            status.as_str()
        ),
    };
    if let Err(e) = state.slack.post_message(&message).await {
        tracing::warn!(seed_id = %run.id, error = %e, "Seed completion Slack post failed");
    }

    // Monitor reconciliation consumes the event downstream; active
    // tenants are the only ones monitored.
    if let Some(tenant_id) = tenant_id {
        if let Ok(Some(tenant)) = db::tenants::get(&state.db, tenant_id).await {
            if tenant.state == polaris_common::db::models::TenantState::Active {
                tracing::info!(tenant_id = %tenant_id, "Monitors queued for re-evaluation");
            }
        }
    }
}
