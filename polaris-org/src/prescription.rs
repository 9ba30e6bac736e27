//! Prescription engine
//!
//! Applies the static baseline blueprint to a freshly-created tenant:
//! trainings, officers, teams, object types and their attributes,
//! checklists and library questions. Phases collect errors without
//! aborting the phases after them; the outcome lands in blueprint_history.
//! Every phase upserts on (tenant, name), so re-running is harmless.

use polaris_common::db::models::BlueprintStatus;
use polaris_common::events::DomainEvent;
use polaris_common::Result;
use uuid::Uuid;

use crate::db::content::library::ChecklistResource;
use crate::db::content::{library, misc, people};
use crate::state::AppState;

const BASELINE_TRAININGS: &[&str] = &[
    "Security Awareness",
    "Data Privacy Fundamentals",
    "Incident Response Basics",
];

const BASELINE_OFFICERS: &[&str] = &["Security Officer", "Privacy Officer", "Compliance Officer"];

const BASELINE_TEAMS: &[&str] = &["Engineering", "Operations", "People"];

const BASELINE_OBJECT_TYPES: &[(&str, &[(&str, &str)])] = &[
    (
        "Device",
        &[
            ("Serial Number", "text"),
            ("Owner", "email"),
            ("Encrypted", "boolean"),
        ],
    ),
    ("Repository", &[("URL", "text"), ("Visibility", "choice")]),
    ("Personnel", &[("Start Date", "date"), ("Manager", "email")]),
];

const BASELINE_CHECKLIST: &str = "Offboarding";

const BASELINE_CHECKLIST_STEPS: &[&str] = &[
    "Revoke repository access",
    "Collect company devices",
    "Disable SSO account",
];

const BASELINE_LIBRARY_QUESTIONS: &[&str] = &[
    "Do you encrypt data at rest?",
    "Do you have a documented incident response plan?",
    "Is multi-factor authentication enforced for all employees?",
];

/// Apply the baseline blueprint. Returns the recorded status.
pub async fn run_prescription(state: &AppState, tenant_id: Uuid) -> Result<BlueprintStatus> {
    let mut errors: Vec<String> = Vec::new();
    // Errors accumulated at each phase boundary, for the final status
    let mut phase_marks: Vec<usize> = Vec::new();

    // Phase: trainings
    for name in BASELINE_TRAININGS {
        if let Err(e) = people::upsert_training(&state.db, tenant_id, name).await {
            errors.push(format!("training '{name}': {e}"));
        }
    }
    phase_marks.push(errors.len());

    // Phase: officers
    for name in BASELINE_OFFICERS {
        if let Err(e) = people::upsert_officer(&state.db, tenant_id, name, None).await {
            errors.push(format!("officer '{name}': {e}"));
        }
    }
    phase_marks.push(errors.len());

    // Phase: teams
    for name in BASELINE_TEAMS {
        if let Err(e) = people::upsert_team(&state.db, tenant_id, name).await {
            errors.push(format!("team '{name}': {e}"));
        }
    }
    phase_marks.push(errors.len());

    // Phase: object types and attributes
    for (index, (name, attributes)) in BASELINE_OBJECT_TYPES.iter().enumerate() {
        if let Err(e) = library::upsert_object_type(&state.db, tenant_id, name, index as i64).await
        {
            errors.push(format!("object type '{name}': {e}"));
            continue;
        }
        for (attr, attr_type) in *attributes {
            if let Err(e) =
                library::upsert_object_type_attribute(&state.db, tenant_id, name, attr, attr_type)
                    .await
            {
                errors.push(format!("object type attribute '{name}.{attr}': {e}"));
            }
        }
    }
    phase_marks.push(errors.len());

    // Phase: checklist
    if let Err(e) = library::upsert_checklist(&state.db, tenant_id, BASELINE_CHECKLIST).await {
        errors.push(format!("checklist '{BASELINE_CHECKLIST}': {e}"));
    } else {
        for step in BASELINE_CHECKLIST_STEPS {
            let resource = ChecklistResource::Step(step.to_string());
            if let Err(e) = library::upsert_checklist_item(
                &state.db,
                tenant_id,
                BASELINE_CHECKLIST,
                &resource,
                step,
            )
            .await
            {
                errors.push(format!("checklist step '{step}': {e}"));
            }
        }
    }
    phase_marks.push(errors.len());

    // Phase: library questions
    for question in BASELINE_LIBRARY_QUESTIONS {
        if let Err(e) = library::upsert_library_question(&state.db, tenant_id, question, "").await {
            errors.push(format!("library question '{question}': {e}"));
        }
    }
    phase_marks.push(errors.len());

    let status = blueprint_status(&phase_marks);
    misc::record_blueprint_result(&state.db, tenant_id, status, &errors.join("\n")).await?;

    tracing::info!(
        tenant_id = %tenant_id,
        status = status.as_str(),
        errors = errors.len(),
        "Prescription finished"
    );

    state.events.emit_lossy(DomainEvent::PrescriptionFinished {
        tenant_id,
        status: status.as_str().to_string(),
        error_count: errors.len(),
        timestamp: chrono::Utc::now(),
    });

    Ok(status)
}

/// Success when no phase errored, Failed when every phase did,
/// PartialComplete otherwise.
fn blueprint_status(phase_marks: &[usize]) -> BlueprintStatus {
    let mut previous = 0usize;
    let mut errored_phases = 0usize;
    for mark in phase_marks {
        if *mark > previous {
            errored_phases += 1;
        }
        previous = *mark;
    }

    if errored_phases == 0 {
        BlueprintStatus::Success
    } else if errored_phases == phase_marks.len() {
        BlueprintStatus::Failed
    } else {
        BlueprintStatus::PartialComplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tenants::{self, NewTenant};
    use crate::tasks::TaskDispatcher;
    use polaris_common::db::init_in_memory;
    use tokio_util::sync::CancellationToken;

    async fn test_state() -> AppState {
        let pool = init_in_memory().await.unwrap();
        let tasks = TaskDispatcher::start(pool.clone(), 1, CancellationToken::new());
        AppState::for_tests(pool, tasks)
    }

    async fn tenant(state: &AppState) -> Uuid {
        tenants::insert(
            &state.db,
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
        .unwrap()
        .id
    }

    #[test]
    fn status_classification() {
        assert_eq!(blueprint_status(&[0, 0, 0]), BlueprintStatus::Success);
        assert_eq!(blueprint_status(&[1, 1, 2]), BlueprintStatus::PartialComplete);
        assert_eq!(blueprint_status(&[1, 2, 3]), BlueprintStatus::Failed);
    }

    #[tokio::test]
    async fn prescription_succeeds_and_records_history() {
        let state = test_state().await;
        let tid = tenant(&state).await;

        let status = run_prescription(&state, tid).await.unwrap();
        assert_eq!(status, BlueprintStatus::Success);

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM blueprint_history WHERE tenant_id = ? AND status = 'SUCCESS'",
        )
        .bind(tid.to_string())
        .fetch_one(&state.db)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn prescription_is_idempotent() {
        let state = test_state().await;
        let tid = tenant(&state).await;

        run_prescription(&state, tid).await.unwrap();
        run_prescription(&state, tid).await.unwrap();

        let trainings: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM trainings WHERE tenant_id = ?")
                .bind(tid.to_string())
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(trainings, BASELINE_TRAININGS.len() as i64);

        let checklist_items: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM checklist_items WHERE tenant_id = ?")
                .bind(tid.to_string())
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(checklist_items, BASELINE_CHECKLIST_STEPS.len() as i64);
    }
}
