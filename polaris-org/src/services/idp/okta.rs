//! Hosted OIDC identity back-end (Okta)
//!
//! REST client against the org's management API, authenticated with an
//! SSWS API token.

use polaris_common::{Error, Result};
use serde_json::{json, Value};
use std::time::Duration;

use super::{generate_temp_password, CreateUserRequest, NewIdpUser};

pub struct OktaProvider {
    org_url: String,
    api_token: String,
    http: reqwest::Client,
}

impl OktaProvider {
    pub fn new(org_url: String, api_token: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            org_url,
            api_token,
            http,
        }
    }

    fn auth_header(&self) -> String {
        format!("SSWS {}", self.api_token)
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let url = format!("{}{path}", self.org_url);
        let mut builder = self
            .http
            .request(method, &url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json");
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::external("okta", e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("okta resource {path}")));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::external(
                "okta",
                format!("{path} returned {status}: {detail}"),
            ));
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        response
            .json()
            .await
            .map_err(|e| Error::external("okta", e.to_string()))
    }

    pub async fn create_user(&self, req: &CreateUserRequest) -> Result<NewIdpUser> {
        let temp_password = generate_temp_password();

        let payload = self
            .request(
                reqwest::Method::POST,
                "/api/v1/users?activate=true",
                Some(json!({
                    "profile": {
                        "firstName": req.first_name,
                        "lastName": req.last_name,
                        "email": req.email,
                        "login": req.email.to_lowercase(),
                        "organization": req.tenant_name,
                    },
                    "credentials": {
                        "password": { "value": temp_password }
                    },
                })),
            )
            .await?;

        let username = payload
            .pointer("/profile/login")
            .and_then(Value::as_str)
            .unwrap_or(&req.email)
            .to_string();

        // Expire the initial password so the first login forces a change
        let user_id = payload.get("id").and_then(Value::as_str).unwrap_or(&username);
        self.request(
            reqwest::Method::POST,
            &format!("/api/v1/users/{user_id}/lifecycle/expire_password"),
            None,
        )
        .await?;

        for group in &req.groups {
            self.add_to_group(&username, group).await?;
        }

        Ok(NewIdpUser {
            username,
            temp_password,
        })
    }

    pub async fn delete_user(&self, username: &str) -> Result<()> {
        // Okta requires deactivation before deletion
        let _ = self
            .request(
                reqwest::Method::POST,
                &format!("/api/v1/users/{username}/lifecycle/deactivate"),
                None,
            )
            .await;
        self.request(
            reqwest::Method::DELETE,
            &format!("/api/v1/users/{username}"),
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn set_password(&self, username: &str, password: &str) -> Result<()> {
        self.request(
            reqwest::Method::PUT,
            &format!("/api/v1/users/{username}"),
            Some(json!({
                "credentials": { "password": { "value": password } }
            })),
        )
        .await?;
        Ok(())
    }

    pub async fn expire_and_get_temp_password(&self, username: &str) -> Result<String> {
        let payload = self
            .request(
                reqwest::Method::POST,
                &format!("/api/v1/users/{username}/lifecycle/expire_password?tempPassword=true"),
                None,
            )
            .await?;
        payload
            .get("tempPassword")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| Error::external("okta", "missing tempPassword".to_string()))
    }

    async fn group_id(&self, group: &str) -> Result<String> {
        let payload = self
            .request(
                reqwest::Method::GET,
                &format!("/api/v1/groups?q={group}&limit=1"),
                None,
            )
            .await?;
        payload
            .as_array()
            .and_then(|groups| groups.first())
            .and_then(|g| g.get("id"))
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| Error::NotFound(format!("okta group {group}")))
    }

    pub async fn add_to_group(&self, username: &str, group: &str) -> Result<()> {
        let group_id = self.group_id(group).await?;
        self.request(
            reqwest::Method::PUT,
            &format!("/api/v1/groups/{group_id}/users/{username}"),
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn remove_from_group(&self, username: &str, group: &str) -> Result<()> {
        let group_id = self.group_id(group).await?;
        self.request(
            reqwest::Method::DELETE,
            &format!("/api/v1/groups/{group_id}/users/{username}"),
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn update_attributes(
        &self,
        username: &str,
        attributes: &[(String, String)],
    ) -> Result<()> {
        let mut profile = serde_json::Map::new();
        for (k, v) in attributes {
            profile.insert(k.clone(), Value::String(v.clone()));
        }
        self.request(
            reqwest::Method::POST,
            &format!("/api/v1/users/{username}"),
            Some(json!({ "profile": profile })),
        )
        .await?;
        Ok(())
    }

    pub async fn associate_software_mfa(&self, username: &str) -> Result<String> {
        let payload = self
            .request(
                reqwest::Method::POST,
                &format!("/api/v1/users/{username}/factors"),
                Some(json!({ "factorType": "token:software:totp", "provider": "OKTA" })),
            )
            .await?;
        payload
            .pointer("/_embedded/activation/sharedSecret")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| Error::external("okta", "missing sharedSecret".to_string()))
    }

    pub async fn verify_software_mfa(&self, username: &str, code: &str) -> Result<bool> {
        let factors = self
            .request(
                reqwest::Method::GET,
                &format!("/api/v1/users/{username}/factors"),
                None,
            )
            .await?;
        let factor_id = factors
            .as_array()
            .and_then(|fs| {
                fs.iter()
                    .find(|f| f.get("factorType").and_then(Value::as_str) == Some("token:software:totp"))
            })
            .and_then(|f| f.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::NotFound(format!("okta totp factor for {username}")))?;

        let payload = self
            .request(
                reqwest::Method::POST,
                &format!("/api/v1/users/{username}/factors/{factor_id}/verify"),
                Some(json!({ "passCode": code })),
            )
            .await?;
        Ok(payload.get("factorResult").and_then(Value::as_str) == Some("SUCCESS"))
    }

    pub async fn set_mfa_preference(&self, username: &str, enabled: bool) -> Result<()> {
        if enabled {
            return Ok(()); // Enrolled factors are preferred by default
        }
        let _ = self
            .request(
                reqwest::Method::POST,
                &format!("/api/v1/users/{username}/lifecycle/reset_factors"),
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn temp_password_expired(&self, username: &str) -> Result<bool> {
        let payload = self
            .request(reqwest::Method::GET, &format!("/api/v1/users/{username}"), None)
            .await?;
        let status = payload.get("status").and_then(Value::as_str).unwrap_or("");
        Ok(status == "PASSWORD_EXPIRED" || status == "RECOVERY")
    }
}
