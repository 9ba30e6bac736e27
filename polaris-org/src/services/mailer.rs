//! Mail relay client
//!
//! Template rendering lives outside this service; the orchestrator only
//! hands the relay a recipient, a template name and its variables.

use polaris_common::{Error, Result};
use serde_json::json;
use std::time::Duration;

pub struct Mailer {
    relay_url: Option<String>,
    from: String,
    http: reqwest::Client,
}

impl Mailer {
    pub fn new(relay_url: Option<String>, from: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        if relay_url.is_none() {
            tracing::warn!("Mail relay not configured, emails will be logged only");
        }
        Self {
            relay_url,
            from,
            http,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, "noreply@polaris.example".to_string())
    }

    pub async fn send(
        &self,
        to: &str,
        template: &str,
        variables: serde_json::Value,
    ) -> Result<()> {
        let Some(url) = &self.relay_url else {
            tracing::info!(to = %to, template = %template, "Email (relay disabled)");
            return Ok(());
        };

        let response = self
            .http
            .post(url)
            .json(&json!({
                "from": self.from,
                "to": to,
                "template": template,
                "variables": variables,
            }))
            .send()
            .await
            .map_err(|e| Error::external("mail", e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::external(
                "mail",
                format!("relay returned {}", response.status()),
            ));
        }
        Ok(())
    }
}
