//! Authoritative feature flag names

pub const OKTA: &str = "oktaFeatureFlag";
pub const SSO: &str = "ssoFeatureFlag";
pub const ONBOARDING_V2: &str = "onboardingV2FeatureFlag";
pub const NEW_CONTROLS: &str = "newControlsFeatureFlag";
pub const PLAYBOOKS: &str = "playbooksFeatureFlag";
pub const MFA: &str = "mfaFeatureFlag";

/// Flags enabled by the My Compliance migration
pub const MY_COMPLIANCE_MIGRATION_FLAGS: &[&str] = &[NEW_CONTROLS, ONBOARDING_V2];

/// Flags set on every freshly created tenant
pub const DEFAULT_TENANT_FLAGS: &[(&str, bool)] = &[
    (ONBOARDING_V2, true),
    (NEW_CONTROLS, true),
    (SSO, false),
    (MFA, false),
];
