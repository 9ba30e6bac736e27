//! Identity provider adapter
//!
//! A single façade over the two credential back-ends: the hosted OIDC
//! provider (Okta) and the user-pool provider (Cognito). Exactly one
//! back-end is authoritative per tenant, selected by the tenant's
//! `oktaFeatureFlag`; switching is an admin-only operation that
//! re-creates all users.

pub mod cognito;
pub mod local;
pub mod okta;
pub mod token;

pub use cognito::CognitoProvider;
pub use local::LocalProvider;
pub use okta::OktaProvider;
pub use token::{Claims, JwksSource, TokenVerifier};

use polaris_common::db::models::IdpKind;
use polaris_common::Result;
use rand::Rng;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Provisioning request for a new identity
#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub tenant_name: String,
    pub groups: Vec<String>,
}

/// What the back-end issued for a freshly created user
#[derive(Debug, Clone)]
pub struct NewIdpUser {
    pub username: String,
    pub temp_password: String,
}

/// One identity back-end
pub enum IdpClient {
    Cognito(CognitoProvider),
    Okta(OktaProvider),
    Local(LocalProvider),
}

impl IdpClient {
    pub fn kind(&self) -> IdpKind {
        match self {
            IdpClient::Cognito(_) => IdpKind::Cognito,
            IdpClient::Okta(_) => IdpKind::Okta,
            IdpClient::Local(l) => l.kind(),
        }
    }

    pub async fn create_user(&self, req: &CreateUserRequest) -> Result<NewIdpUser> {
        match self {
            IdpClient::Cognito(c) => c.create_user(req).await,
            IdpClient::Okta(o) => o.create_user(req).await,
            IdpClient::Local(l) => l.create_user(req),
        }
    }

    pub async fn delete_user(&self, username: &str) -> Result<()> {
        match self {
            IdpClient::Cognito(c) => c.delete_user(username).await,
            IdpClient::Okta(o) => o.delete_user(username).await,
            IdpClient::Local(l) => l.delete_user(username),
        }
    }

    pub async fn set_password(&self, username: &str, password: &str) -> Result<()> {
        match self {
            IdpClient::Cognito(c) => c.set_password(username, password).await,
            IdpClient::Okta(o) => o.set_password(username, password).await,
            IdpClient::Local(l) => l.set_password(username, password),
        }
    }

    /// Expire the current temporary password and issue a fresh one
    pub async fn expire_and_get_temp_password(&self, username: &str) -> Result<String> {
        match self {
            IdpClient::Cognito(c) => c.expire_and_get_temp_password(username).await,
            IdpClient::Okta(o) => o.expire_and_get_temp_password(username).await,
            IdpClient::Local(l) => l.expire_and_get_temp_password(username),
        }
    }

    pub async fn add_to_group(&self, username: &str, group: &str) -> Result<()> {
        match self {
            IdpClient::Cognito(c) => c.add_to_group(username, group).await,
            IdpClient::Okta(o) => o.add_to_group(username, group).await,
            IdpClient::Local(l) => l.add_to_group(username, group),
        }
    }

    pub async fn remove_from_group(&self, username: &str, group: &str) -> Result<()> {
        match self {
            IdpClient::Cognito(c) => c.remove_from_group(username, group).await,
            IdpClient::Okta(o) => o.remove_from_group(username, group).await,
            IdpClient::Local(l) => l.remove_from_group(username, group),
        }
    }

    pub async fn update_attributes(
        &self,
        username: &str,
        attributes: &[(String, String)],
    ) -> Result<()> {
        match self {
            IdpClient::Cognito(c) => c.update_attributes(username, attributes).await,
            IdpClient::Okta(o) => o.update_attributes(username, attributes).await,
            IdpClient::Local(l) => l.update_attributes(username, attributes),
        }
    }

    pub async fn associate_software_mfa(&self, username: &str) -> Result<String> {
        match self {
            IdpClient::Cognito(c) => c.associate_software_mfa(username).await,
            IdpClient::Okta(o) => o.associate_software_mfa(username).await,
            IdpClient::Local(l) => l.associate_software_mfa(username),
        }
    }

    pub async fn verify_software_mfa(&self, username: &str, code: &str) -> Result<bool> {
        match self {
            IdpClient::Cognito(c) => c.verify_software_mfa(username, code).await,
            IdpClient::Okta(o) => o.verify_software_mfa(username, code).await,
            IdpClient::Local(l) => l.verify_software_mfa(username, code),
        }
    }

    pub async fn set_mfa_preference(&self, username: &str, enabled: bool) -> Result<()> {
        match self {
            IdpClient::Cognito(c) => c.set_mfa_preference(username, enabled).await,
            IdpClient::Okta(o) => o.set_mfa_preference(username, enabled).await,
            IdpClient::Local(l) => l.set_mfa_preference(username, enabled),
        }
    }

    /// Whether the user's temporary password has lapsed
    pub async fn temp_password_expired(&self, username: &str) -> Result<bool> {
        match self {
            IdpClient::Cognito(c) => c.temp_password_expired(username).await,
            IdpClient::Okta(o) => o.temp_password_expired(username).await,
            IdpClient::Local(l) => l.temp_password_expired(username),
        }
    }
}

/// Both back-ends, with per-tenant selection
pub struct IdpRegistry {
    cognito: IdpClient,
    okta: IdpClient,
}

impl IdpRegistry {
    pub fn new(cognito: IdpClient, okta: IdpClient) -> Self {
        Self { cognito, okta }
    }

    /// Local-only registry for development and tests
    pub fn local() -> Self {
        Self {
            cognito: IdpClient::Local(LocalProvider::new(IdpKind::Cognito)),
            okta: IdpClient::Local(LocalProvider::new(IdpKind::Okta)),
        }
    }

    pub fn by_kind(&self, kind: IdpKind) -> &IdpClient {
        match kind {
            IdpKind::Cognito => &self.cognito,
            IdpKind::Okta => &self.okta,
        }
    }

    /// The authoritative back-end for a tenant: a pure lookup on the
    /// okta feature flag.
    pub async fn for_tenant(&self, pool: &SqlitePool, tenant_id: Uuid) -> Result<&IdpClient> {
        let use_okta =
            crate::db::feature_flags::is_enabled(pool, tenant_id, crate::flags::OKTA).await?;
        Ok(if use_okta { &self.okta } else { &self.cognito })
    }
}

/// Generate a temporary password satisfying both back-ends' policies
pub(crate) fn generate_temp_password() -> String {
    const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
    const LOWER: &[u8] = b"abcdefghjkmnpqrstuvwxyz";
    const DIGIT: &[u8] = b"23456789";
    const SYMBOL: &[u8] = b"!@#$%^&*";

    let mut rng = rand::thread_rng();
    let mut pick = |set: &[u8], n: usize| -> Vec<u8> {
        (0..n).map(|_| set[rng.gen_range(0..set.len())]).collect()
    };

    let mut chars = Vec::new();
    chars.extend(pick(UPPER, 4));
    chars.extend(pick(LOWER, 5));
    chars.extend(pick(DIGIT, 4));
    chars.extend(pick(SYMBOL, 2));

    // Shuffle so the class runs are not positional
    for i in (1..chars.len()).rev() {
        let j = rng.gen_range(0..=i);
        chars.swap(i, j);
    }

    String::from_utf8(chars).expect("password charset is ascii")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_passwords_meet_complexity() {
        for _ in 0..20 {
            let p = generate_temp_password();
            assert_eq!(p.len(), 15);
            assert!(p.chars().any(|c| c.is_ascii_uppercase()));
            assert!(p.chars().any(|c| c.is_ascii_lowercase()));
            assert!(p.chars().any(|c| c.is_ascii_digit()));
            assert!(p.chars().any(|c| "!@#$%^&*".contains(c)));
        }
    }

    #[tokio::test]
    async fn tenant_selection_follows_okta_flag() {
        let pool = polaris_common::db::init_in_memory().await.unwrap();
        let tenant = crate::db::tenants::insert(
            &pool,
            &crate::db::tenants::NewTenant {
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

        let registry = IdpRegistry::local();
        assert_eq!(
            registry.for_tenant(&pool, tenant.id).await.unwrap().kind(),
            IdpKind::Cognito
        );

        crate::db::feature_flags::set(&pool, tenant.id, crate::flags::OKTA, true)
            .await
            .unwrap();
        assert_eq!(
            registry.for_tenant(&pool, tenant.id).await.unwrap().kind(),
            IdpKind::Okta
        );
    }
}
