//! Shared row models and persisted enums
//!
//! Enum values are persisted as the exact strings the external interfaces
//! use ("ONBOARDING", "architect_meeting", ...). Parsing is strict: an
//! unknown string is a validation error, never a silent default.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantState {
    Onboarding,
    Active,
    Trial,
    Deactivated,
}

impl TenantState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantState::Onboarding => "ONBOARDING",
            TenantState::Active => "ACTIVE",
            TenantState::Trial => "TRIAL",
            TenantState::Deactivated => "DEACTIVATED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ONBOARDING" => Ok(TenantState::Onboarding),
            "ACTIVE" => Ok(TenantState::Active),
            "TRIAL" => Ok(TenantState::Trial),
            "DEACTIVATED" => Ok(TenantState::Deactivated),
            other => Err(Error::Validation(format!("unknown tenant state: {other}"))),
        }
    }
}

/// Onboarding state, original model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnboardingStateV1 {
    Init,
    Enrolled,
    Review,
    Ready,
    Completed,
}

impl OnboardingStateV1 {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingStateV1::Init => "INIT",
            OnboardingStateV1::Enrolled => "ENROLLED",
            OnboardingStateV1::Review => "REVIEW",
            OnboardingStateV1::Ready => "READY",
            OnboardingStateV1::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "INIT" => Ok(OnboardingStateV1::Init),
            "ENROLLED" => Ok(OnboardingStateV1::Enrolled),
            "REVIEW" => Ok(OnboardingStateV1::Review),
            "READY" => Ok(OnboardingStateV1::Ready),
            "COMPLETED" => Ok(OnboardingStateV1::Completed),
            other => Err(Error::Validation(format!(
                "unknown onboarding state: {other}"
            ))),
        }
    }

    /// Position in the forward sequence, for monotonicity checks
    pub fn ordinal(&self) -> u8 {
        match self {
            OnboardingStateV1::Init => 0,
            OnboardingStateV1::Enrolled => 1,
            OnboardingStateV1::Review => 2,
            OnboardingStateV1::Ready => 3,
            OnboardingStateV1::Completed => 4,
        }
    }
}

/// Onboarding state, newer model running in parallel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnboardingStateV2 {
    Questionnaire,
    ArchitectMeeting,
    AutomateCompliance,
    Ready,
    Completed,
}

impl OnboardingStateV2 {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingStateV2::Questionnaire => "questionnaire",
            OnboardingStateV2::ArchitectMeeting => "architect_meeting",
            OnboardingStateV2::AutomateCompliance => "automate_compliance",
            OnboardingStateV2::Ready => "ready",
            OnboardingStateV2::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "questionnaire" => Ok(OnboardingStateV2::Questionnaire),
            "architect_meeting" => Ok(OnboardingStateV2::ArchitectMeeting),
            "automate_compliance" => Ok(OnboardingStateV2::AutomateCompliance),
            "ready" => Ok(OnboardingStateV2::Ready),
            "completed" => Ok(OnboardingStateV2::Completed),
            other => Err(Error::Validation(format!(
                "unknown onboarding v2 state: {other}"
            ))),
        }
    }

    pub fn ordinal(&self) -> u8 {
        match self {
            OnboardingStateV2::Questionnaire => 0,
            OnboardingStateV2::ArchitectMeeting => 1,
            OnboardingStateV2::AutomateCompliance => 2,
            OnboardingStateV2::Ready => 3,
            OnboardingStateV2::Completed => 4,
        }
    }
}

/// The six fixed setup steps every onboarding carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetupStepName {
    ControlPrescription,
    DocumentationReview,
    OperationalMaturityReview,
    SelectCertifications,
    SeedRelevantDocuments,
    RoadmapConfiguration,
}

impl SetupStepName {
    pub const ALL: [SetupStepName; 6] = [
        SetupStepName::ControlPrescription,
        SetupStepName::DocumentationReview,
        SetupStepName::OperationalMaturityReview,
        SetupStepName::SelectCertifications,
        SetupStepName::SeedRelevantDocuments,
        SetupStepName::RoadmapConfiguration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SetupStepName::ControlPrescription => "control_prescription",
            SetupStepName::DocumentationReview => "documentation_review",
            SetupStepName::OperationalMaturityReview => "operational_maturity_review",
            SetupStepName::SelectCertifications => "select_certifications",
            SetupStepName::SeedRelevantDocuments => "seed_relevant_documents",
            SetupStepName::RoadmapConfiguration => "roadmap_configuration",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "control_prescription" => Ok(SetupStepName::ControlPrescription),
            "documentation_review" => Ok(SetupStepName::DocumentationReview),
            "operational_maturity_review" => Ok(SetupStepName::OperationalMaturityReview),
            "select_certifications" => Ok(SetupStepName::SelectCertifications),
            "seed_relevant_documents" => Ok(SetupStepName::SeedRelevantDocuments),
            "roadmap_configuration" => Ok(SetupStepName::RoadmapConfiguration),
            other => Err(Error::Validation(format!("unknown setup step: {other}"))),
        }
    }
}

/// User roles across the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    SuperAdmin,
    Admin,
    Member,
    Viewer,
    Concierge,
    Auditor,
    AuditorAdmin,
    Partner,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::SuperAdmin => "SuperAdmin",
            UserRole::Admin => "Admin",
            UserRole::Member => "Member",
            UserRole::Viewer => "Viewer",
            UserRole::Concierge => "Concierge",
            UserRole::Auditor => "Auditor",
            UserRole::AuditorAdmin => "AuditorAdmin",
            UserRole::Partner => "Partner",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "SuperAdmin" => Ok(UserRole::SuperAdmin),
            "Admin" => Ok(UserRole::Admin),
            "Member" => Ok(UserRole::Member),
            "Viewer" => Ok(UserRole::Viewer),
            "Concierge" => Ok(UserRole::Concierge),
            "Auditor" => Ok(UserRole::Auditor),
            "AuditorAdmin" => Ok(UserRole::AuditorAdmin),
            "Partner" => Ok(UserRole::Partner),
            other => Err(Error::Validation(format!("unknown user role: {other}"))),
        }
    }
}

/// Which identity backend holds a user's credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdpKind {
    Cognito,
    Okta,
}

impl IdpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdpKind::Cognito => "COGNITO",
            IdpKind::Okta => "OKTA",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "COGNITO" => Ok(IdpKind::Cognito),
            "OKTA" => Ok(IdpKind::Okta),
            other => Err(Error::Validation(format!("unknown idp: {other}"))),
        }
    }
}

/// Status shared by seed and migration runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    InProgress,
    Failed,
    Done,
    Updating,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::InProgress => "IN_PROGRESS",
            RunStatus::Failed => "FAILED",
            RunStatus::Done => "DONE",
            RunStatus::Updating => "UPDATING",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(RunStatus::Pending),
            "IN_PROGRESS" => Ok(RunStatus::InProgress),
            "FAILED" => Ok(RunStatus::Failed),
            "DONE" => Ok(RunStatus::Done),
            "UPDATING" => Ok(RunStatus::Updating),
            other => Err(Error::Validation(format!("unknown run status: {other}"))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Done)
    }
}

/// Content model a seed profile targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileKind {
    Playbooks,
    MyCompliance,
    None,
}

impl ProfileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileKind::Playbooks => "PLAYBOOKS",
            ProfileKind::MyCompliance => "MY_COMPLIANCE",
            ProfileKind::None => "NONE",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PLAYBOOKS" => Ok(ProfileKind::Playbooks),
            "MY_COMPLIANCE" => Ok(ProfileKind::MyCompliance),
            "NONE" => Ok(ProfileKind::None),
            other => Err(Error::Validation(format!("unknown profile kind: {other}"))),
        }
    }
}

/// Outcome of a blueprint prescription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlueprintStatus {
    Success,
    PartialComplete,
    Failed,
}

impl BlueprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlueprintStatus::Success => "SUCCESS",
            BlueprintStatus::PartialComplete => "PARTIAL_COMPLETE",
            BlueprintStatus::Failed => "FAILED",
        }
    }
}

/// Tenant row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub state: TenantState,
    pub tier: Option<String>,
    pub sfdc_id: Option<String>,
    pub csm_user_id: Option<Uuid>,
    pub ca_user_id: Option<Uuid>,
    pub contract_sign_date: Option<chrono::NaiveDate>,
    pub is_internal: bool,
    pub billing_address: Option<serde_json::Value>,
    pub row_version: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Onboarding row (1-1 with tenant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Onboarding {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub state_v1: OnboardingStateV1,
    pub state_v2: OnboardingStateV2,
    pub period_ends: Option<chrono::NaiveDate>,
    pub calendly_event_id: Option<String>,
    pub calendly_invitee_id: Option<String>,
    pub row_version: i64,
}

/// One of the six setup steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupStep {
    pub onboarding_id: Uuid,
    pub name: SetupStepName,
    pub completed: bool,
}

/// User row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub idp: IdpKind,
    pub is_active: bool,
    pub last_login: Option<chrono::DateTime<chrono::Utc>>,
    pub invitation_sent_at: Option<chrono::DateTime<chrono::Utc>>,
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub manager_user_id: Option<Uuid>,
}

/// Feature flag row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub tenant_id: Uuid,
    pub name: String,
    pub enabled: bool,
}

/// Questionnaire capture, append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub questionary_id: String,
    pub typeform_response_id: String,
    pub response: serde_json::Value,
    pub submitted_by_user_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Seed run row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRun {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub profile_id: Option<Uuid>,
    pub archive_path: String,
    pub status: RunStatus,
    pub status_detail: String,
    pub created_by_user_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Seed profile row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedProfile {
    pub id: Uuid,
    pub name: String,
    pub content_kind: ProfileKind,
    pub visible: bool,
    pub archive_path: String,
    pub default_base: bool,
}

/// Migration run row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRun {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub frameworks: Vec<String>,
    pub mapping_path: String,
    pub status: RunStatus,
    pub status_detail: String,
    pub mapped_subtasks: Option<String>,
    pub created_by_user_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// API token row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiToken {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub token_identifier: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_state_roundtrip() {
        for s in ["ONBOARDING", "ACTIVE", "TRIAL", "DEACTIVATED"] {
            assert_eq!(TenantState::parse(s).unwrap().as_str(), s);
        }
        assert!(TenantState::parse("active").is_err());
    }

    #[test]
    fn state_v2_uses_snake_case_wire_form() {
        assert_eq!(
            OnboardingStateV2::ArchitectMeeting.as_str(),
            "architect_meeting"
        );
        assert_eq!(
            OnboardingStateV2::parse("automate_compliance").unwrap(),
            OnboardingStateV2::AutomateCompliance
        );
    }

    #[test]
    fn six_setup_steps_are_distinct() {
        let names: std::collections::HashSet<_> =
            SetupStepName::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn run_status_terminality() {
        assert!(RunStatus::Done.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Updating.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
    }
}
