//! Integration tests for the My Compliance migration

mod common;

use polaris_common::db::models::RunStatus;
use polaris_org::db;
use polaris_org::db::content::controls::{ActionItemUpsert, ControlUpsert};
use polaris_org::db::content::misc::EvidenceOwner;
use polaris_org::db::content::programs::SubtaskUpsert;
use polaris_org::db::content::{certifications, controls, misc, programs};
use polaris_org::migration;
use polaris_org::state::AppState;
use uuid::Uuid;

async fn tenant(state: &AppState) -> Uuid {
    db::tenants::insert(
        &state.db,
        &db::tenants::NewTenant {
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
    .unwrap()
    .id
}

async fn seed_subtask(state: &AppState, tid: Uuid, reference: &str, migration_id: &str) -> Uuid {
    programs::upsert_subtask(
        &state.db,
        tid,
        &SubtaskUpsert {
            reference_id: reference.to_string(),
            program_name: "Security".to_string(),
            task_name: "Harden".to_string(),
            name: format!("Subtask {reference}"),
            migration_id: Some(migration_id.to_string()),
        },
    )
    .await
    .unwrap();
    let subtasks = programs::list_subtasks(&state.db, tid).await.unwrap();
    subtasks
        .into_iter()
        .find(|s| s.reference_id == reference)
        .unwrap()
        .id
}

async fn seed_action_item(state: &AppState, tid: Uuid, reference: &str) {
    controls::upsert_action_item(
        &state.db,
        tid,
        &ActionItemUpsert {
            reference_id: reference.to_string(),
            name: format!("Action {reference}"),
            description: String::new(),
            recurring_schedule: None,
            required_evidence: None,
            control_reference: None,
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn migration_maps_subtasks_and_reports_unmapped() {
    let state = common::test_state().await;
    let tid = tenant(&state).await;
    let dir = tempfile::tempdir().unwrap();

    // Three legacy sub-tasks, a mapping that covers only the first two
    seed_subtask(&state, tid, "ST-001", "m1").await;
    let with_evidence = seed_subtask(&state, tid, "ST-002", "m2").await;
    seed_subtask(&state, tid, "ST-003", "m3").await;
    seed_action_item(&state, tid, "LAI-001").await;
    seed_action_item(&state, tid, "LAI-002").await;

    misc::add_evidence(&state.db, tid, EvidenceOwner::Subtask, with_evidence, "proof.png")
        .await
        .unwrap();

    let mapping =
        common::build_mapping_xlsx(dir.path(), "mapping.xlsx", &[("m1", "LAI-001"), ("m2", "LAI-002")]);

    let run = db::migration_runs::create(
        &state.db,
        tid,
        &["SOC 2 Type 1".to_string()],
        mapping.to_str().unwrap(),
        None,
    )
    .await
    .unwrap();

    migration::run_migration(&state, run.id).await.unwrap();

    let finished = db::migration_runs::get(&state.db, run.id).await.unwrap().unwrap();
    assert_eq!(finished.status, RunStatus::Done);
    assert_eq!(finished.mapped_subtasks.as_deref(), Some("2/3"));
    assert!(
        finished.status_detail.contains("migration_id m3")
            && finished.status_detail.contains("not found in mapping file"),
        "detail: {}",
        finished.status_detail
    );

    // Mapped sub-tasks are linked; evidence forced requiredEvidence=Yes
    let subtasks = programs::list_subtasks(&state.db, tid).await.unwrap();
    let st2 = subtasks.iter().find(|s| s.reference_id == "ST-002").unwrap();
    assert!(st2.action_item_id.is_some());

    let required: Option<String> = sqlx::query_scalar(
        "SELECT required_evidence FROM action_items WHERE tenant_id = ? AND reference_id = 'LAI-002'",
    )
    .bind(tid.to_string())
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(required.as_deref(), Some("Yes"));

    let st3 = subtasks.iter().find(|s| s.reference_id == "ST-003").unwrap();
    assert!(st3.action_item_id.is_none());

    // Frameworks unlocked, flags flipped
    assert_eq!(
        certifications::unlocked_names(&state.db, tid).await.unwrap(),
        vec!["SOC 2 Type 1"]
    );
    assert!(
        db::feature_flags::is_enabled(&state.db, tid, polaris_org::flags::NEW_CONTROLS)
            .await
            .unwrap()
    );
    assert!(
        !db::feature_flags::is_enabled(&state.db, tid, polaris_org::flags::PLAYBOOKS)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn migration_archives_unlocked_and_prunes_bare_legacy_controls() {
    let state = common::test_state().await;
    let tid = tenant(&state).await;
    let dir = tempfile::tempdir().unwrap();

    certifications::unlock(&state.db, tid, "SOC 2 Type 1").await.unwrap();

    // A bare legacy control and one with implementation notes
    controls::upsert_control(
        &state.db,
        tid,
        &ControlUpsert {
            reference_id: None,
            name: "Bare legacy".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    controls::upsert_control(
        &state.db,
        tid,
        &ControlUpsert {
            reference_id: None,
            name: "Documented legacy".to_string(),
            implementation_notes: Some("We do this manually".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let mapping = common::build_mapping_xlsx(dir.path(), "mapping.xlsx", &[]);
    let run = db::migration_runs::create(
        &state.db,
        tid,
        &["ISO 27001".to_string()],
        mapping.to_str().unwrap(),
        None,
    )
    .await
    .unwrap();

    migration::run_migration(&state, run.id).await.unwrap();

    // Old unlock rows moved to the archive table
    let archived: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM archived_unlocked_certifications WHERE tenant_id = ?",
    )
    .bind(tid.to_string())
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(archived, 1);
    assert_eq!(
        certifications::unlocked_names(&state.db, tid).await.unwrap(),
        vec!["ISO 27001"]
    );

    // The bare control is gone; the documented one survives
    let names: Vec<String> =
        sqlx::query_scalar("SELECT name FROM controls WHERE tenant_id = ? ORDER BY name")
            .bind(tid.to_string())
            .fetch_all(&state.db)
            .await
            .unwrap();
    assert_eq!(names, vec!["Documented legacy"]);
}

#[tokio::test]
async fn migration_closes_out_framework_controls() {
    let state = common::test_state().await;
    let tid = tenant(&state).await;
    let dir = tempfile::tempdir().unwrap();

    controls::upsert_control(
        &state.db,
        tid,
        &ControlUpsert {
            reference_id: Some("CTRL-001".to_string()),
            name: "Enforce MFA".to_string(),
            framework_tag: Some("SOC 2 Type 1".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    controls::upsert_action_item(
        &state.db,
        tid,
        &ActionItemUpsert {
            reference_id: "LAI-001".to_string(),
            name: "Enable MFA".to_string(),
            description: String::new(),
            recurring_schedule: None,
            required_evidence: None,
            control_reference: Some("CTRL-001".to_string()),
        },
    )
    .await
    .unwrap();

    misc::insert_audit(&state.db, tid, "SOC 2 audit", Some("2024-03-01")).await.unwrap();

    let mapping = common::build_mapping_xlsx(dir.path(), "mapping.xlsx", &[]);
    let run = db::migration_runs::create(
        &state.db,
        tid,
        &["SOC 2 Type 1".to_string()],
        mapping.to_str().unwrap(),
        None,
    )
    .await
    .unwrap();

    migration::run_migration(&state, run.id).await.unwrap();

    let (status, completion): (Option<String>, Option<String>) = sqlx::query_as(
        "SELECT status, completion_date FROM action_items WHERE tenant_id = ? AND reference_id = 'LAI-001'",
    )
    .bind(tid.to_string())
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(status.as_deref(), Some("Completed"));
    assert_eq!(completion.as_deref(), Some("2024-03-01"));

    let control_status: Option<String> = sqlx::query_scalar(
        "SELECT status FROM controls WHERE tenant_id = ? AND reference_id = 'CTRL-001'",
    )
    .bind(tid.to_string())
    .fetch_one(&state.db)
    .await
    .unwrap();
    assert_eq!(control_status.as_deref(), Some("Implemented"));
}

#[tokio::test]
async fn unreadable_mapping_fails_the_run_with_partial_progress() {
    let state = common::test_state().await;
    let tid = tenant(&state).await;

    certifications::unlock(&state.db, tid, "SOC 2 Type 1").await.unwrap();

    let run = db::migration_runs::create(
        &state.db,
        tid,
        &["SOC 2 Type 1".to_string()],
        "/nonexistent/mapping.xlsx",
        None,
    )
    .await
    .unwrap();

    migration::run_migration(&state, run.id).await.unwrap();

    let finished = db::migration_runs::get(&state.db, run.id).await.unwrap().unwrap();
    assert_eq!(finished.status, RunStatus::Failed);
    // Steps before the failure left their progress lines behind
    assert!(finished.status_detail.contains("Archived 1 unlocked certifications"));
    assert!(finished.status_detail.contains("Migration aborted"));
    assert!(finished.mapped_subtasks.is_none());
}
