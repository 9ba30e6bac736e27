//! Setup step completion and readiness evaluation

use polaris_common::db::models::{Onboarding, OnboardingStateV1, OnboardingStateV2, SetupStepName};
use polaris_common::events::DomainEvent;
use polaris_common::{Error, Result};
use uuid::Uuid;

use super::machine::{self, EventV1, EventV2};
use crate::db;
use crate::state::AppState;

/// Toggle one of the six setup steps. Re-submitting the current value is
/// a no-op. Completing the sixth step raises the ready state on whichever
/// machine is positioned for it.
pub async fn complete_setup_step(
    state: &AppState,
    onboarding_id: Uuid,
    name: SetupStepName,
    completed: bool,
) -> Result<Onboarding> {
    let step = db::onboarding::get_step(&state.db, onboarding_id, name).await?;
    if step.completed == completed {
        return db::onboarding::get(&state.db, onboarding_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("onboarding {onboarding_id}")));
    }

    db::onboarding::set_step(&state.db, onboarding_id, name, completed).await?;

    state.events.emit_lossy(DomainEvent::SetupStepCompleted {
        onboarding_id,
        step: name.as_str().to_string(),
        completed,
        timestamp: chrono::Utc::now(),
    });

    let onboarding = db::onboarding::get(&state.db, onboarding_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("onboarding {onboarding_id}")))?;

    if completed && all_steps_completed(state, onboarding_id).await? {
        return raise_ready(state, &onboarding).await;
    }

    Ok(onboarding)
}

pub async fn all_steps_completed(state: &AppState, onboarding_id: Uuid) -> Result<bool> {
    Ok(db::onboarding::completed_step_count(&state.db, onboarding_id).await?
        == SetupStepName::ALL.len() as i64)
}

/// Readiness: v1 moves review -> ready; v2 moves either meeting-adjacent
/// state -> ready. A machine that is not positioned for it stays put.
async fn raise_ready(state: &AppState, onboarding: &Onboarding) -> Result<Onboarding> {
    let mut current = onboarding.clone();

    if current.state_v1 == OnboardingStateV1::Review {
        current = machine::apply_v1(state, current.id, EventV1::AllStepsCompleted).await?;
    }

    if matches!(
        current.state_v2,
        OnboardingStateV2::ArchitectMeeting | OnboardingStateV2::AutomateCompliance
    ) {
        current = machine::apply_v2(state, current.id, EventV2::AllStepsCompleted).await?;
    }

    Ok(current)
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

    async fn onboarding(state: &AppState) -> Onboarding {
        let tenant = tenants::insert(
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
        .unwrap();
        db::onboarding::create_for_tenant(&state.db, tenant.id)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn resubmitting_same_value_is_a_noop() {
        let state = test_state().await;
        let ob = onboarding(&state).await;

        let before = db::onboarding::get(&state.db, ob.id).await.unwrap().unwrap();
        complete_setup_step(&state, ob.id, SetupStepName::ControlPrescription, false)
            .await
            .unwrap();
        let after = db::onboarding::get(&state.db, ob.id).await.unwrap().unwrap();
        assert_eq!(before.row_version, after.row_version);
    }

    #[tokio::test]
    async fn completing_all_six_raises_ready_from_review() {
        let state = test_state().await;
        let ob = onboarding(&state).await;

        machine::apply_v1(&state, ob.id, EventV1::Enroll).await.unwrap();
        machine::apply_v1(&state, ob.id, EventV1::EnterReview)
            .await
            .unwrap();

        let mut current = ob.clone();
        for step in SetupStepName::ALL {
            current = complete_setup_step(&state, ob.id, step, true).await.unwrap();
        }
        assert_eq!(current.state_v1, OnboardingStateV1::Ready);
    }

    #[tokio::test]
    async fn five_completed_steps_do_not_raise_ready() {
        let state = test_state().await;
        let ob = onboarding(&state).await;

        machine::apply_v1(&state, ob.id, EventV1::Enroll).await.unwrap();
        machine::apply_v1(&state, ob.id, EventV1::EnterReview)
            .await
            .unwrap();

        let mut current = ob.clone();
        for step in SetupStepName::ALL.iter().take(5) {
            current = complete_setup_step(&state, ob.id, *step, true).await.unwrap();
        }
        assert_eq!(current.state_v1, OnboardingStateV1::Review);
    }

    #[tokio::test]
    async fn v2_ready_raised_from_automate_compliance() {
        let state = test_state().await;
        let ob = onboarding(&state).await;

        machine::apply_v2(&state, ob.id, EventV2::QuestionnaireSubmitted)
            .await
            .unwrap();
        machine::apply_v2(&state, ob.id, EventV2::MeetingBooked)
            .await
            .unwrap();

        let mut current = ob.clone();
        for step in SetupStepName::ALL {
            current = complete_setup_step(&state, ob.id, step, true).await.unwrap();
        }
        assert_eq!(current.state_v2, OnboardingStateV2::Ready);
    }
}
