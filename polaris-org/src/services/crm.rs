//! Salesforce REST client
//!
//! Handles the OAuth token exchange, the ready-to-sync account pull and
//! the back-reference push. Payload normalization and the decision tree
//! live in the crm domain module.

use polaris_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;

pub struct SalesforceClient {
    base_url: String,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    token: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Back-reference pair pushed after a successful sync
#[derive(Debug, Clone, Serialize)]
pub struct BackReference {
    #[serde(rename = "polarisID")]
    pub polaris_id: String,
    #[serde(rename = "salesforceID")]
    pub salesforce_id: String,
}

impl SalesforceClient {
    pub fn new(base_url: String, client_id: String, client_secret: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            base_url,
            client_id,
            client_secret,
            http,
            token: Mutex::new(None),
        }
    }

    /// Client-credentials token, cached until a call fails
    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(t) = token.as_ref() {
            return Ok(t.clone());
        }

        let url = format!("{}/services/oauth2/token", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::external("salesforce", e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::external(
                "salesforce",
                format!("token exchange returned {}", response.status()),
            ));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::external("salesforce", e.to_string()))?;

        *token = Some(parsed.access_token.clone());
        Ok(parsed.access_token)
    }

    pub async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Accounts flagged ready-to-sync, raw provider shape. The caller
    /// filters against Polaris's known external ids.
    pub async fn fetch_ready_accounts(&self) -> Result<Vec<Value>> {
        let token = self.access_token().await?;
        let url = format!("{}/services/apexrest/polaris/accounts/ready", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::external("salesforce", e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.invalidate_token().await;
            return Err(Error::external("salesforce", "token rejected".to_string()));
        }
        if !response.status().is_success() {
            return Err(Error::external(
                "salesforce",
                format!("account pull returned {}", response.status()),
            ));
        }

        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| Error::external("salesforce", e.to_string()))
    }

    /// Pull a single account by its 18-character id, for enrichment
    pub async fn fetch_account(&self, sfdc_id: &str) -> Result<Option<Value>> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/services/apexrest/polaris/accounts/{sfdc_id}",
            self.base_url
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::external("salesforce", e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::external(
                "salesforce",
                format!("account fetch returned {}", response.status()),
            ));
        }

        response
            .json::<Value>()
            .await
            .map(Some)
            .map_err(|e| Error::external("salesforce", e.to_string()))
    }

    /// Store Polaris ids back on the CRM side for newly-synced accounts
    pub async fn push_back_references(&self, pairs: &[BackReference]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }

        let token = self.access_token().await?;
        let url = format!("{}/services/apexrest/polaris/accounts/link", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(pairs)
            .send()
            .await
            .map_err(|e| Error::external("salesforce", e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::external(
                "salesforce",
                format!("back-reference push returned {}", response.status()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_reference_wire_names() {
        let pair = BackReference {
            polaris_id: "p-1".to_string(),
            salesforce_id: "abc123".to_string(),
        };
        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["polarisID"], "p-1");
        assert_eq!(json["salesforceID"], "abc123");
    }
}
