//! Shared application state
//!
//! One instance per process, cloned into every handler and task closure.
//! Services are dependency-injected here with an explicit lifecycle:
//! constructed at startup, drained at shutdown.

use polaris_common::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::seed::locks::TenantLocks;
use crate::services::crm::SalesforceClient;
use crate::services::drive::DriveStore;
use crate::services::idp::{IdpRegistry, TokenVerifier};
use crate::services::mailer::Mailer;
use crate::services::scheduler::SchedulerClient;
use crate::services::slack::SlackNotifier;
use crate::tasks::TaskDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: EventBus,
    pub idp: Arc<IdpRegistry>,
    pub verifier: Arc<TokenVerifier>,
    pub crm: Option<Arc<SalesforceClient>>,
    pub scheduler: Arc<SchedulerClient>,
    pub slack: Arc<SlackNotifier>,
    pub mailer: Arc<Mailer>,
    pub drive: Arc<DriveStore>,
    pub tasks: TaskDispatcher,
    pub locks: Arc<TenantLocks>,
    /// Shared secret expected in the CRM webhook's Authorization header
    pub webhook_secret: String,
    /// API key for the user-facing endpoints; empty disables the check
    pub api_key: String,
}

impl AppState {
    /// State wired to local back-ends, for tests and development
    pub fn for_tests(db: SqlitePool, tasks: TaskDispatcher) -> Self {
        use crate::services::scheduler::LocalScheduler;

        Self {
            db,
            events: EventBus::new(64),
            idp: Arc::new(IdpRegistry::local()),
            verifier: Arc::new(TokenVerifier::new(vec![])),
            crm: None,
            scheduler: Arc::new(SchedulerClient::Local(LocalScheduler::new())),
            slack: Arc::new(SlackNotifier::disabled()),
            mailer: Arc::new(Mailer::disabled()),
            drive: Arc::new(DriveStore::new(std::env::temp_dir().join("polaris-test-drive"))),
            tasks,
            locks: Arc::new(TenantLocks::new()),
            webhook_secret: "test-webhook-secret".to_string(),
            api_key: String::new(),
        }
    }
}
