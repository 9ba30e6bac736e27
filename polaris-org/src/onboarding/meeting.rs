//! Architect meeting booking and validation

use polaris_common::db::models::Onboarding;
use polaris_common::{Error, Result};
use uuid::Uuid;

use super::machine::{self, EventV2};
use crate::db;
use crate::services::scheduler::MeetingStatus;
use crate::state::AppState;

/// Persist the booked meeting identifiers and advance past the meeting
/// state. Re-booking while already advanced just updates the identifiers.
pub async fn book_meeting(
    state: &AppState,
    onboarding_id: Uuid,
    event_id: &str,
    invitee_id: &str,
) -> Result<Onboarding> {
    db::onboarding::set_meeting(&state.db, onboarding_id, Some(event_id), Some(invitee_id))
        .await?;

    machine::apply_v2(state, onboarding_id, EventV2::MeetingBooked).await
}

/// Ask the scheduling provider whether the booked meeting still stands.
/// A cancelled event reverts the v2 state to the meeting step and clears
/// both identifiers.
pub async fn validate_meeting(state: &AppState, onboarding_id: Uuid) -> Result<MeetingStatus> {
    let onboarding = db::onboarding::get(&state.db, onboarding_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("onboarding {onboarding_id}")))?;

    let (Some(event_id), Some(invitee_id)) = (
        onboarding.calendly_event_id.as_deref(),
        onboarding.calendly_invitee_id.as_deref(),
    ) else {
        return Err(Error::Validation(
            "onboarding has no scheduled meeting".to_string(),
        ));
    };

    let status = state.scheduler.event_status(event_id, invitee_id).await?;

    if status == MeetingStatus::Cancelled {
        tracing::info!(
            onboarding_id = %onboarding_id,
            event_id = %event_id,
            "Architect meeting cancelled externally; reverting"
        );
        db::onboarding::set_meeting(&state.db, onboarding_id, None, None).await?;
        machine::apply_v2(state, onboarding_id, EventV2::MeetingCancelled).await?;
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tenants::{self, NewTenant};
    use crate::services::scheduler::{LocalScheduler, SchedulerClient};
    use crate::tasks::TaskDispatcher;
    use polaris_common::db::init_in_memory;
    use polaris_common::db::models::OnboardingStateV2;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    async fn test_state_with_scheduler(scheduler: LocalScheduler) -> AppState {
        let pool = init_in_memory().await.unwrap();
        let tasks = TaskDispatcher::start(pool.clone(), 1, CancellationToken::new());
        let mut state = AppState::for_tests(pool, tasks);
        state.scheduler = Arc::new(SchedulerClient::Local(scheduler));
        state
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
        let ob = db::onboarding::create_for_tenant(&state.db, tenant.id)
            .await
            .unwrap();
        machine::apply_v2(state, ob.id, EventV2::QuestionnaireSubmitted)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn booking_stores_ids_and_advances() {
        let state = test_state_with_scheduler(LocalScheduler::new()).await;
        let ob = onboarding(&state).await;

        let after = book_meeting(&state, ob.id, "E", "I").await.unwrap();
        assert_eq!(after.state_v2, OnboardingStateV2::AutomateCompliance);
        assert_eq!(after.calendly_event_id.as_deref(), Some("E"));
        assert_eq!(after.calendly_invitee_id.as_deref(), Some("I"));
    }

    #[tokio::test]
    async fn cancellation_reverts_state_and_clears_ids() {
        let scheduler = LocalScheduler::new();
        scheduler.set_status("E", "I", MeetingStatus::Cancelled);
        let state = test_state_with_scheduler(scheduler).await;
        let ob = onboarding(&state).await;

        book_meeting(&state, ob.id, "E", "I").await.unwrap();
        let status = validate_meeting(&state, ob.id).await.unwrap();
        assert_eq!(status, MeetingStatus::Cancelled);

        let after = db::onboarding::get(&state.db, ob.id).await.unwrap().unwrap();
        assert_eq!(after.state_v2, OnboardingStateV2::ArchitectMeeting);
        assert!(after.calendly_event_id.is_none());
        assert!(after.calendly_invitee_id.is_none());
    }

    #[tokio::test]
    async fn active_meeting_stays_put() {
        let state = test_state_with_scheduler(LocalScheduler::new()).await;
        let ob = onboarding(&state).await;

        book_meeting(&state, ob.id, "E", "I").await.unwrap();
        let status = validate_meeting(&state, ob.id).await.unwrap();
        assert_eq!(status, MeetingStatus::Active);

        let after = db::onboarding::get(&state.db, ob.id).await.unwrap().unwrap();
        assert_eq!(after.state_v2, OnboardingStateV2::AutomateCompliance);
        assert_eq!(after.calendly_event_id.as_deref(), Some("E"));
    }

    #[tokio::test]
    async fn validating_without_booking_is_an_error() {
        let state = test_state_with_scheduler(LocalScheduler::new()).await;
        let ob = onboarding(&state).await;
        let err = validate_meeting(&state, ob.id).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
