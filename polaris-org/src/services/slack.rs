//! Slack notification sink
//!
//! Posts to an incoming-webhook URL. When no webhook is configured the
//! notifier degrades to log lines, which keeps worker paths identical in
//! development and tests.

use polaris_common::{Error, Result};
use serde_json::json;
use std::time::Duration;

pub struct SlackNotifier {
    webhook_url: Option<String>,
    http: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        if webhook_url.is_none() {
            tracing::warn!("Slack webhook not configured, notifications will be logged only");
        }
        Self { webhook_url, http }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Post a plain informational message
    pub async fn post_message(&self, text: &str) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            tracing::info!(message = %text, "Slack notification (disabled)");
            return Ok(());
        };

        let response = self
            .http
            .post(url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| Error::external("slack", e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::external(
                "slack",
                format!("webhook returned {}", response.status()),
            ));
        }
        Ok(())
    }

    /// Post an aggregated error block; one message for a whole sync run
    pub async fn post_error_block(&self, title: &str, lines: &[String]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let body = format!("*{}*\n{}", title, lines.join("\n"));
        self.post_message(&body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_notifier_swallows_messages() {
        let slack = SlackNotifier::disabled();
        slack.post_message("Seeding finished").await.unwrap();
        slack
            .post_error_block("Salesforce sync errors", &["line".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_error_block_is_not_sent() {
        let slack = SlackNotifier::disabled();
        slack.post_error_block("title", &[]).await.unwrap();
    }
}
