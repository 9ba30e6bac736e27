//! User-pool identity back-end (Cognito)
//!
//! Talks the admin JSON protocol: every operation is a POST with an
//! `X-Amz-Target` action header. Request signing happens in the
//! credential layer handed to the HTTP client; this module owns only the
//! action payloads and response mapping.

use polaris_common::{Error, Result};
use serde_json::{json, Value};
use std::time::Duration;

use super::{generate_temp_password, CreateUserRequest, NewIdpUser};

const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";

pub struct CognitoProvider {
    endpoint: String,
    user_pool_id: String,
    authorization: String,
    http: reqwest::Client,
}

impl CognitoProvider {
    pub fn new(endpoint: String, user_pool_id: String, authorization: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            endpoint,
            user_pool_id,
            authorization,
            http,
        }
    }

    async fn call(&self, action: &str, body: Value) -> Result<Value> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{action}"))
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("Authorization", &self.authorization)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::external("cognito", e.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::external("cognito", e.to_string()))?;

        if !status.is_success() {
            let error_type = payload
                .get("__type")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return match error_type {
                "UserNotFoundException" => Err(Error::NotFound("cognito user".to_string())),
                "UsernameExistsException" => {
                    Err(Error::Duplicate("cognito username exists".to_string()))
                }
                _ => Err(Error::external(
                    "cognito",
                    format!("{action} returned {status}: {error_type}"),
                )),
            };
        }

        Ok(payload)
    }

    pub async fn create_user(&self, req: &CreateUserRequest) -> Result<NewIdpUser> {
        let temp_password = generate_temp_password();

        let payload = self
            .call(
                "AdminCreateUser",
                json!({
                    "UserPoolId": self.user_pool_id,
                    "Username": req.email.to_lowercase(),
                    "TemporaryPassword": temp_password,
                    "MessageAction": "SUPPRESS",
                    "UserAttributes": [
                        {"Name": "email", "Value": req.email},
                        {"Name": "email_verified", "Value": "true"},
                        {"Name": "given_name", "Value": req.first_name},
                        {"Name": "family_name", "Value": req.last_name},
                        {"Name": "custom:organization", "Value": req.tenant_name},
                    ],
                }),
            )
            .await?;

        let username = payload
            .pointer("/User/Username")
            .and_then(Value::as_str)
            .unwrap_or(&req.email)
            .to_string();

        for group in &req.groups {
            self.add_to_group(&username, group).await?;
        }

        Ok(NewIdpUser {
            username,
            temp_password,
        })
    }

    pub async fn delete_user(&self, username: &str) -> Result<()> {
        self.call(
            "AdminDeleteUser",
            json!({ "UserPoolId": self.user_pool_id, "Username": username }),
        )
        .await?;
        Ok(())
    }

    pub async fn set_password(&self, username: &str, password: &str) -> Result<()> {
        self.call(
            "AdminSetUserPassword",
            json!({
                "UserPoolId": self.user_pool_id,
                "Username": username,
                "Password": password,
                "Permanent": true,
            }),
        )
        .await?;
        Ok(())
    }

    /// Re-issue the temporary password by re-creating the invitation
    pub async fn expire_and_get_temp_password(&self, username: &str) -> Result<String> {
        let temp_password = generate_temp_password();
        self.call(
            "AdminSetUserPassword",
            json!({
                "UserPoolId": self.user_pool_id,
                "Username": username,
                "Password": temp_password,
                "Permanent": false,
            }),
        )
        .await?;
        Ok(temp_password)
    }

    pub async fn add_to_group(&self, username: &str, group: &str) -> Result<()> {
        self.call(
            "AdminAddUserToGroup",
            json!({
                "UserPoolId": self.user_pool_id,
                "Username": username,
                "GroupName": group,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn remove_from_group(&self, username: &str, group: &str) -> Result<()> {
        self.call(
            "AdminRemoveUserFromGroup",
            json!({
                "UserPoolId": self.user_pool_id,
                "Username": username,
                "GroupName": group,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn update_attributes(
        &self,
        username: &str,
        attributes: &[(String, String)],
    ) -> Result<()> {
        let attrs: Vec<Value> = attributes
            .iter()
            .map(|(k, v)| json!({"Name": k, "Value": v}))
            .collect();
        self.call(
            "AdminUpdateUserAttributes",
            json!({
                "UserPoolId": self.user_pool_id,
                "Username": username,
                "UserAttributes": attrs,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn associate_software_mfa(&self, username: &str) -> Result<String> {
        let payload = self
            .call("AssociateSoftwareToken", json!({ "Username": username }))
            .await?;
        payload
            .get("SecretCode")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| Error::external("cognito", "missing SecretCode".to_string()))
    }

    pub async fn verify_software_mfa(&self, username: &str, code: &str) -> Result<bool> {
        let payload = self
            .call(
                "VerifySoftwareToken",
                json!({ "Username": username, "UserCode": code }),
            )
            .await?;
        Ok(payload.get("Status").and_then(Value::as_str) == Some("SUCCESS"))
    }

    pub async fn set_mfa_preference(&self, username: &str, enabled: bool) -> Result<()> {
        self.call(
            "AdminSetUserMFAPreference",
            json!({
                "UserPoolId": self.user_pool_id,
                "Username": username,
                "SoftwareTokenMfaSettings": { "Enabled": enabled, "PreferredMfa": enabled },
            }),
        )
        .await?;
        Ok(())
    }

    /// FORCE_CHANGE_PASSWORD users past the invitation window read as expired
    pub async fn temp_password_expired(&self, username: &str) -> Result<bool> {
        let payload = self
            .call(
                "AdminGetUser",
                json!({ "UserPoolId": self.user_pool_id, "Username": username }),
            )
            .await?;
        let status = payload
            .get("UserStatus")
            .and_then(Value::as_str)
            .unwrap_or("");
        Ok(status == "EXPIRED" || status == "RESET_REQUIRED")
    }
}
