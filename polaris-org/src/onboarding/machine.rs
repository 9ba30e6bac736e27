//! Transition tables and event application
//!
//! Both machines are explicit (state, event) -> state tables with side
//! effects on entry. State writes go through the version-guarded update;
//! a lost write reloads and retries, so concurrent transitions serialize
//! per onboarding.

use polaris_common::db::models::{Onboarding, OnboardingStateV1, OnboardingStateV2};
use polaris_common::events::DomainEvent;
use polaris_common::{Error, Result};
use serde_json::json;
use uuid::Uuid;

use crate::db;
use crate::state::AppState;

const CX_SUPPORT_EMAIL: &str = "cx-support@polaris.example";
const TRANSITION_RETRIES: u32 = 5;

/// Events of the original onboarding model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventV1 {
    Enroll,
    MoveBack,
    EnterReview,
    AllStepsCompleted,
    Complete,
}

impl EventV1 {
    fn target(&self) -> OnboardingStateV1 {
        match self {
            EventV1::Enroll => OnboardingStateV1::Enrolled,
            EventV1::MoveBack => OnboardingStateV1::Init,
            EventV1::EnterReview => OnboardingStateV1::Review,
            EventV1::AllStepsCompleted => OnboardingStateV1::Ready,
            EventV1::Complete => OnboardingStateV1::Completed,
        }
    }
}

/// (state, event) -> next state; anything absent is forbidden
fn next_v1(current: OnboardingStateV1, event: EventV1) -> Option<OnboardingStateV1> {
    use OnboardingStateV1::*;
    match (current, event) {
        (Init, EventV1::Enroll) => Some(Enrolled),
        // Backwards movement is only allowed before review
        (Enrolled, EventV1::MoveBack) => Some(Init),
        (Enrolled, EventV1::EnterReview) => Some(Review),
        (Review, EventV1::AllStepsCompleted) => Some(Ready),
        (Ready, EventV1::Complete) => Some(Completed),
        _ => None,
    }
}

/// Events of the v2 onboarding model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventV2 {
    QuestionnaireSubmitted,
    MeetingBooked,
    MeetingCancelled,
    AllStepsCompleted,
    Complete,
}

impl EventV2 {
    fn target(&self) -> OnboardingStateV2 {
        match self {
            EventV2::QuestionnaireSubmitted => OnboardingStateV2::ArchitectMeeting,
            EventV2::MeetingBooked => OnboardingStateV2::AutomateCompliance,
            EventV2::MeetingCancelled => OnboardingStateV2::ArchitectMeeting,
            EventV2::AllStepsCompleted => OnboardingStateV2::Ready,
            EventV2::Complete => OnboardingStateV2::Completed,
        }
    }
}

fn next_v2(current: OnboardingStateV2, event: EventV2) -> Option<OnboardingStateV2> {
    use OnboardingStateV2::*;
    match (current, event) {
        (Questionnaire, EventV2::QuestionnaireSubmitted) => Some(ArchitectMeeting),
        (ArchitectMeeting, EventV2::MeetingBooked) => Some(AutomateCompliance),
        // Step completion raises ready from either meeting-adjacent state
        (ArchitectMeeting, EventV2::AllStepsCompleted) => Some(Ready),
        (AutomateCompliance, EventV2::AllStepsCompleted) => Some(Ready),
        // External cancellation is the one sanctioned reversion
        (AutomateCompliance, EventV2::MeetingCancelled) => Some(ArchitectMeeting),
        (Ready, EventV2::Complete) => Some(Completed),
        _ => None,
    }
}

/// Apply a v1 event with optimistic concurrency. Re-applying an event
/// whose target is the current state is a no-op.
pub async fn apply_v1(
    state: &AppState,
    onboarding_id: Uuid,
    event: EventV1,
) -> Result<Onboarding> {
    for _ in 0..TRANSITION_RETRIES {
        let onboarding = db::onboarding::get(&state.db, onboarding_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("onboarding {onboarding_id}")))?;

        if onboarding.state_v1 == event.target() {
            return Ok(onboarding);
        }

        let Some(target) = next_v1(onboarding.state_v1, event) else {
            return Err(Error::InvalidTransition {
                from: onboarding.state_v1.as_str().to_string(),
                to: event.target().as_str().to_string(),
            });
        };

        let won =
            db::onboarding::set_state_v1(&state.db, onboarding_id, target, onboarding.row_version)
                .await?;
        if !won {
            continue; // Lost the version race; reload and retry
        }

        state.events.emit_lossy(DomainEvent::OnboardingStateChanged {
            tenant_id: onboarding.tenant_id,
            onboarding_id,
            old_state: onboarding.state_v1.as_str().to_string(),
            new_state: target.as_str().to_string(),
            timestamp: chrono::Utc::now(),
        });

        on_enter_v1(state, &onboarding, target).await?;

        return db::onboarding::get(&state.db, onboarding_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("onboarding {onboarding_id}")));
    }

    Err(Error::Internal(format!(
        "onboarding {onboarding_id} transition kept losing the version race"
    )))
}

/// Apply a v2 event with optimistic concurrency; same retry discipline.
pub async fn apply_v2(
    state: &AppState,
    onboarding_id: Uuid,
    event: EventV2,
) -> Result<Onboarding> {
    for _ in 0..TRANSITION_RETRIES {
        let onboarding = db::onboarding::get(&state.db, onboarding_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("onboarding {onboarding_id}")))?;

        if onboarding.state_v2 == event.target() {
            return Ok(onboarding);
        }

        let Some(target) = next_v2(onboarding.state_v2, event) else {
            return Err(Error::InvalidTransition {
                from: onboarding.state_v2.as_str().to_string(),
                to: event.target().as_str().to_string(),
            });
        };

        let won =
            db::onboarding::set_state_v2(&state.db, onboarding_id, target, onboarding.row_version)
                .await?;
        if !won {
            continue;
        }

        state.events.emit_lossy(DomainEvent::OnboardingStateV2Changed {
            tenant_id: onboarding.tenant_id,
            onboarding_id,
            old_state: onboarding.state_v2.as_str().to_string(),
            new_state: target.as_str().to_string(),
            timestamp: chrono::Utc::now(),
        });

        return db::onboarding::get(&state.db, onboarding_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("onboarding {onboarding_id}")));
    }

    Err(Error::Internal(format!(
        "onboarding {onboarding_id} transition kept losing the version race"
    )))
}

/// Entry side effects of the v1 machine
async fn on_enter_v1(
    state: &AppState,
    onboarding: &Onboarding,
    entered: OnboardingStateV1,
) -> Result<()> {
    match entered {
        OnboardingStateV1::Review => notify_review_entered(state, onboarding).await,
        OnboardingStateV1::Ready => notify_ready(state, onboarding).await,
        OnboardingStateV1::Completed => {
            crate::store::activate_tenant(state, onboarding.tenant_id).await?;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Entering review emails CSM, CA and CX-support once, and only when no
/// setup step has been completed yet.
async fn notify_review_entered(state: &AppState, onboarding: &Onboarding) -> Result<()> {
    if db::onboarding::review_notified(&state.db, onboarding.id).await? {
        return Ok(());
    }
    if db::onboarding::completed_step_count(&state.db, onboarding.id).await? > 0 {
        return Ok(());
    }

    let tenant = db::tenants::get(&state.db, onboarding.tenant_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tenant {}", onboarding.tenant_id)))?;

    let mut recipients = vec![CX_SUPPORT_EMAIL.to_string()];
    for user_id in [tenant.csm_user_id, tenant.ca_user_id].into_iter().flatten() {
        if let Some(user) = db::users::get(&state.db, user_id).await? {
            recipients.push(user.email);
        }
    }

    for recipient in recipients {
        if let Err(e) = state
            .mailer
            .send(
                &recipient,
                "onboarding_review_entered",
                json!({ "organization": tenant.name }),
            )
            .await
        {
            tracing::warn!(tenant_id = %tenant.id, error = %e, "Review notification failed");
        }
    }

    db::onboarding::mark_review_notified(&state.db, onboarding.id).await?;
    Ok(())
}

/// All steps done: every organization admin hears about it
async fn notify_ready(state: &AppState, onboarding: &Onboarding) -> Result<()> {
    let tenant = db::tenants::get(&state.db, onboarding.tenant_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tenant {}", onboarding.tenant_id)))?;

    for admin in db::users::admins_of_tenant(&state.db, tenant.id).await? {
        if let Err(e) = state
            .mailer
            .send(
                &admin.email,
                "onboarding_ready",
                json!({ "organization": tenant.name }),
            )
            .await
        {
            tracing::warn!(tenant_id = %tenant.id, error = %e, "Ready notification failed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_table_forbids_backward_after_review() {
        use OnboardingStateV1::*;
        assert_eq!(next_v1(Init, EventV1::Enroll), Some(Enrolled));
        assert_eq!(next_v1(Enrolled, EventV1::MoveBack), Some(Init));
        assert_eq!(next_v1(Review, EventV1::MoveBack), None);
        assert_eq!(next_v1(Ready, EventV1::EnterReview), None);
        assert_eq!(next_v1(Completed, EventV1::Complete), None);
    }

    #[test]
    fn v2_table_allows_ready_from_both_meeting_states() {
        use OnboardingStateV2::*;
        assert_eq!(
            next_v2(ArchitectMeeting, EventV2::AllStepsCompleted),
            Some(Ready)
        );
        assert_eq!(
            next_v2(AutomateCompliance, EventV2::AllStepsCompleted),
            Some(Ready)
        );
        assert_eq!(
            next_v2(AutomateCompliance, EventV2::MeetingCancelled),
            Some(ArchitectMeeting)
        );
        assert_eq!(next_v2(Questionnaire, EventV2::MeetingBooked), None);
        assert_eq!(next_v2(Ready, EventV2::MeetingCancelled), None);
    }
}
