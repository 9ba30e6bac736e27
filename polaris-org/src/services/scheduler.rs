//! Meeting scheduler client
//!
//! The onboarding architect meeting is booked through Calendly; validation
//! asks the provider whether the event is still live. A local backend with
//! programmable statuses stands in when no provider is configured.

use polaris_common::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Scheduler's view of a booked meeting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingStatus {
    Active,
    Cancelled,
}

pub enum SchedulerClient {
    Calendly(CalendlyClient),
    Local(LocalScheduler),
}

impl SchedulerClient {
    pub async fn event_status(&self, event_id: &str, invitee_id: &str) -> Result<MeetingStatus> {
        match self {
            SchedulerClient::Calendly(c) => c.event_status(event_id, invitee_id).await,
            SchedulerClient::Local(l) => l.event_status(event_id, invitee_id),
        }
    }
}

/// Calendly REST client
pub struct CalendlyClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CalendlyInvitee {
    resource: CalendlyInviteeResource,
}

#[derive(Debug, Deserialize)]
struct CalendlyInviteeResource {
    status: String,
}

impl CalendlyClient {
    pub fn new(base_url: String, token: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            base_url,
            token,
            http,
        }
    }

    async fn event_status(&self, event_id: &str, invitee_id: &str) -> Result<MeetingStatus> {
        let url = format!(
            "{}/scheduled_events/{}/invitees/{}",
            self.base_url, event_id, invitee_id
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::external("calendly", e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::external(
                "calendly",
                format!("invitee lookup returned {}", response.status()),
            ));
        }

        let invitee: CalendlyInvitee = response
            .json()
            .await
            .map_err(|e| Error::external("calendly", e.to_string()))?;

        // Calendly reports "canceled" on the invitee resource
        if invitee.resource.status.eq_ignore_ascii_case("canceled") {
            Ok(MeetingStatus::Cancelled)
        } else {
            Ok(MeetingStatus::Active)
        }
    }
}

/// In-process scheduler used when no provider is configured
#[derive(Default)]
pub struct LocalScheduler {
    statuses: Mutex<HashMap<(String, String), MeetingStatus>>,
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program the status the next lookup will observe
    pub fn set_status(&self, event_id: &str, invitee_id: &str, status: MeetingStatus) {
        self.statuses
            .lock()
            .expect("scheduler lock poisoned")
            .insert((event_id.to_string(), invitee_id.to_string()), status);
    }

    fn event_status(&self, event_id: &str, invitee_id: &str) -> Result<MeetingStatus> {
        Ok(self
            .statuses
            .lock()
            .expect("scheduler lock poisoned")
            .get(&(event_id.to_string(), invitee_id.to_string()))
            .copied()
            .unwrap_or(MeetingStatus::Active))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_scheduler_defaults_to_active() {
        let scheduler = SchedulerClient::Local(LocalScheduler::new());
        assert_eq!(
            scheduler.event_status("E", "I").await.unwrap(),
            MeetingStatus::Active
        );
    }

    #[tokio::test]
    async fn local_scheduler_reports_programmed_cancellation() {
        let local = LocalScheduler::new();
        local.set_status("E", "I", MeetingStatus::Cancelled);
        let scheduler = SchedulerClient::Local(local);
        assert_eq!(
            scheduler.event_status("E", "I").await.unwrap(),
            MeetingStatus::Cancelled
        );
    }
}
