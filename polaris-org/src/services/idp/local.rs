//! In-process identity back-end
//!
//! Stands in for a hosted provider when none is configured. Holds the
//! user table in memory with the same observable behavior: usernames are
//! issued by the provider, temporary passwords expire when explicitly
//! expired, group membership is a set.

use polaris_common::db::models::IdpKind;
use polaris_common::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{generate_temp_password, CreateUserRequest, NewIdpUser};

#[derive(Debug, Clone)]
struct LocalUser {
    email: String,
    groups: HashSet<String>,
    attributes: HashMap<String, String>,
    temp_password: Option<String>,
    temp_password_expired: bool,
    mfa_enabled: bool,
    mfa_secret: Option<String>,
}

pub struct LocalProvider {
    kind: IdpKind,
    users: Mutex<HashMap<String, LocalUser>>,
}

impl LocalProvider {
    pub fn new(kind: IdpKind) -> Self {
        Self {
            kind,
            users: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> IdpKind {
        self.kind
    }

    fn with_user<T>(
        &self,
        username: &str,
        f: impl FnOnce(&mut LocalUser) -> T,
    ) -> Result<T> {
        let mut users = self.users.lock().expect("idp lock poisoned");
        let user = users
            .get_mut(username)
            .ok_or_else(|| Error::NotFound(format!("idp user {username}")))?;
        Ok(f(user))
    }

    pub fn create_user(&self, req: &CreateUserRequest) -> Result<NewIdpUser> {
        let username = req.email.to_lowercase();
        let mut users = self.users.lock().expect("idp lock poisoned");
        if users.contains_key(&username) {
            return Err(Error::Duplicate(format!("idp user exists: {username}")));
        }

        let temp_password = generate_temp_password();
        users.insert(
            username.clone(),
            LocalUser {
                email: req.email.clone(),
                groups: req.groups.iter().cloned().collect(),
                attributes: HashMap::from([
                    ("given_name".to_string(), req.first_name.clone()),
                    ("family_name".to_string(), req.last_name.clone()),
                    ("custom:organization".to_string(), req.tenant_name.clone()),
                ]),
                temp_password: Some(temp_password.clone()),
                temp_password_expired: false,
                mfa_enabled: false,
                mfa_secret: None,
            },
        );

        Ok(NewIdpUser {
            username,
            temp_password,
        })
    }

    pub fn delete_user(&self, username: &str) -> Result<()> {
        let mut users = self.users.lock().expect("idp lock poisoned");
        users
            .remove(username)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("idp user {username}")))
    }

    pub fn set_password(&self, username: &str, password: &str) -> Result<()> {
        let _ = password;
        self.with_user(username, |u| {
            u.temp_password = None;
            u.temp_password_expired = false;
        })
    }

    pub fn expire_and_get_temp_password(&self, username: &str) -> Result<String> {
        let fresh = generate_temp_password();
        let issued = fresh.clone();
        self.with_user(username, move |u| {
            u.temp_password = Some(fresh);
            u.temp_password_expired = false;
        })?;
        Ok(issued)
    }

    pub fn add_to_group(&self, username: &str, group: &str) -> Result<()> {
        self.with_user(username, |u| {
            u.groups.insert(group.to_string());
        })
    }

    pub fn remove_from_group(&self, username: &str, group: &str) -> Result<()> {
        self.with_user(username, |u| {
            u.groups.remove(group);
        })
    }

    pub fn update_attributes(&self, username: &str, attributes: &[(String, String)]) -> Result<()> {
        self.with_user(username, |u| {
            for (k, v) in attributes {
                u.attributes.insert(k.clone(), v.clone());
            }
        })
    }

    pub fn associate_software_mfa(&self, username: &str) -> Result<String> {
        let secret = generate_temp_password();
        let issued = secret.clone();
        self.with_user(username, move |u| {
            u.mfa_secret = Some(secret);
        })?;
        Ok(issued)
    }

    pub fn verify_software_mfa(&self, username: &str, code: &str) -> Result<bool> {
        self.with_user(username, |u| u.mfa_secret.is_some() && !code.is_empty())
    }

    pub fn set_mfa_preference(&self, username: &str, enabled: bool) -> Result<()> {
        self.with_user(username, |u| {
            u.mfa_enabled = enabled;
        })
    }

    pub fn temp_password_expired(&self, username: &str) -> Result<bool> {
        self.with_user(username, |u| u.temp_password_expired)
    }

    /// Test hook: mark the temporary password lapsed
    pub fn force_expire_temp_password(&self, username: &str) -> Result<()> {
        self.with_user(username, |u| {
            u.temp_password_expired = true;
        })
    }

    pub fn user_email(&self, username: &str) -> Result<String> {
        self.with_user(username, |u| u.email.clone())
    }

    pub fn user_groups(&self, username: &str) -> Result<Vec<String>> {
        self.with_user(username, |u| {
            let mut groups: Vec<String> = u.groups.iter().cloned().collect();
            groups.sort();
            groups
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(email: &str) -> CreateUserRequest {
        CreateUserRequest {
            first_name: "Ada".to_string(),
            last_name: "Li".to_string(),
            email: email.to_string(),
            tenant_name: "Acme".to_string(),
            groups: vec!["SuperAdmin".to_string()],
        }
    }

    #[test]
    fn create_issues_username_and_temp_password() {
        let idp = LocalProvider::new(IdpKind::Cognito);
        let user = idp.create_user(&req("Ada@Acme.example")).unwrap();
        assert_eq!(user.username, "ada@acme.example");
        assert!(!user.temp_password.is_empty());
        assert!(idp.create_user(&req("ada@acme.example")).is_err());
    }

    #[test]
    fn group_membership_roundtrip() {
        let idp = LocalProvider::new(IdpKind::Okta);
        let user = idp.create_user(&req("a@x.example")).unwrap();
        idp.add_to_group(&user.username, "Admin").unwrap();
        idp.remove_from_group(&user.username, "SuperAdmin").unwrap();
        assert_eq!(idp.user_groups(&user.username).unwrap(), vec!["Admin"]);
    }

    #[test]
    fn expire_then_reissue_clears_expired_state() {
        let idp = LocalProvider::new(IdpKind::Cognito);
        let user = idp.create_user(&req("a@x.example")).unwrap();
        idp.force_expire_temp_password(&user.username).unwrap();
        assert!(idp.temp_password_expired(&user.username).unwrap());

        let fresh = idp.expire_and_get_temp_password(&user.username).unwrap();
        assert_ne!(fresh, user.temp_password);
        assert!(!idp.temp_password_expired(&user.username).unwrap());
    }
}
