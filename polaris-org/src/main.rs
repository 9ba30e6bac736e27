//! Organization orchestrator (polaris-org) - Main entry point

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polaris_common::EventBus;
use polaris_org::seed::locks::TenantLocks;
use polaris_org::services::crm::SalesforceClient;
use polaris_org::services::drive::DriveStore;
use polaris_org::services::idp::{
    CognitoProvider, IdpClient, IdpRegistry, JwksSource, OktaProvider, TokenVerifier,
};
use polaris_org::services::mailer::Mailer;
use polaris_org::services::scheduler::{CalendlyClient, LocalScheduler, SchedulerClient};
use polaris_org::services::slack::SlackNotifier;
use polaris_org::tasks::TaskDispatcher;
use polaris_org::{build_router, AppState};

/// Command-line arguments for polaris-org
#[derive(Parser, Debug)]
#[command(name = "polaris-org")]
#[command(about = "Organization lifecycle & onboarding orchestrator")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5780", env = "POLARIS_ORG_PORT")]
    port: u16,

    /// Data folder (database, drive storage, seed archives)
    #[arg(short, long, env = "POLARIS_DATA_FOLDER")]
    data_folder: Option<PathBuf>,

    /// Shared secret expected on the Salesforce webhook
    #[arg(long, env = "POLARIS_WEBHOOK_SECRET", default_value = "")]
    webhook_secret: String,

    /// API key for the user endpoints; empty disables the check
    #[arg(long, env = "POLARIS_API_KEY", default_value = "")]
    api_key: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polaris_org=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let data_folder = match &args.data_folder {
        Some(folder) => folder.clone(),
        None => polaris_common::config::resolve_data_folder(None, "POLARIS_DATA_FOLDER")
            .context("Failed to resolve data folder")?,
    };
    info!("Data folder: {}", data_folder.display());

    let db = polaris_common::db::init_database(&data_folder.join("polaris.db"))
        .await
        .context("Failed to initialize database")?;

    let shutdown = CancellationToken::new();
    let workers =
        polaris_common::config::get_setting_i64(&db, "task_worker_count", 4).await.max(1) as usize;
    let tasks = TaskDispatcher::start(db.clone(), workers, shutdown.clone());
    info!("Task dispatcher started with {} workers", workers);

    let state = AppState {
        db: db.clone(),
        events: EventBus::new(1000),
        idp: Arc::new(build_idp_registry()),
        verifier: Arc::new(build_token_verifier()),
        crm: build_crm_client().map(Arc::new),
        scheduler: Arc::new(build_scheduler()),
        slack: Arc::new(SlackNotifier::new(std::env::var("POLARIS_SLACK_WEBHOOK").ok())),
        mailer: Arc::new(Mailer::new(
            std::env::var("POLARIS_MAIL_RELAY").ok(),
            std::env::var("POLARIS_MAIL_FROM")
                .unwrap_or_else(|_| "noreply@polaris.example".to_string()),
        )),
        drive: Arc::new(DriveStore::new(data_folder.join("drive"))),
        tasks: tasks.clone(),
        locks: Arc::new(TenantLocks::new()),
        webhook_secret: args.webhook_secret.clone(),
        api_key: args.api_key.clone(),
    };

    // Periodic outbound CRM sync
    if state.crm.is_some() {
        spawn_sync_loop(state.clone(), shutdown.clone());
    }

    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    // Workers finish their in-flight task before exiting
    shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(200)).await;

    info!("Server shutdown complete");
    Ok(())
}

/// Both IdP back-ends from environment, with the in-process back-end as
/// the development fallback.
fn build_idp_registry() -> IdpRegistry {
    use polaris_common::db::models::IdpKind;
    use polaris_org::services::idp::LocalProvider;

    let cognito = match (
        std::env::var("POLARIS_COGNITO_ENDPOINT"),
        std::env::var("POLARIS_COGNITO_USER_POOL_ID"),
        std::env::var("POLARIS_COGNITO_AUTHORIZATION"),
    ) {
        (Ok(endpoint), Ok(pool), Ok(authorization)) => {
            IdpClient::Cognito(CognitoProvider::new(endpoint, pool, authorization))
        }
        _ => {
            tracing::warn!("Cognito not configured, using in-process identity back-end");
            IdpClient::Local(LocalProvider::new(IdpKind::Cognito))
        }
    };

    let okta = match (
        std::env::var("POLARIS_OKTA_ORG_URL"),
        std::env::var("POLARIS_OKTA_API_TOKEN"),
    ) {
        (Ok(org_url), Ok(token)) => IdpClient::Okta(OktaProvider::new(org_url, token)),
        _ => {
            tracing::warn!("Okta not configured, using in-process identity back-end");
            IdpClient::Local(LocalProvider::new(IdpKind::Okta))
        }
    };

    IdpRegistry::new(cognito, okta)
}

fn build_token_verifier() -> TokenVerifier {
    let mut sources = Vec::new();
    if let Ok(issuer) = std::env::var("POLARIS_COGNITO_ISSUER") {
        sources.push(JwksSource::cognito(issuer));
    }
    if let Ok(issuer) = std::env::var("POLARIS_OKTA_ISSUER") {
        sources.push(JwksSource::okta(issuer));
    }
    TokenVerifier::new(sources)
}

fn build_crm_client() -> Option<SalesforceClient> {
    match (
        std::env::var("POLARIS_SFDC_BASE_URL"),
        std::env::var("POLARIS_SFDC_CLIENT_ID"),
        std::env::var("POLARIS_SFDC_CLIENT_SECRET"),
    ) {
        (Ok(base_url), Ok(client_id), Ok(client_secret)) => {
            Some(SalesforceClient::new(base_url, client_id, client_secret))
        }
        _ => {
            tracing::warn!("Salesforce not configured, CRM sync disabled");
            None
        }
    }
}

fn build_scheduler() -> SchedulerClient {
    match (
        std::env::var("POLARIS_CALENDLY_BASE_URL"),
        std::env::var("POLARIS_CALENDLY_TOKEN"),
    ) {
        (Ok(base_url), Ok(token)) => {
            SchedulerClient::Calendly(CalendlyClient::new(base_url, token))
        }
        _ => {
            tracing::warn!("Calendly not configured, using in-process scheduler");
            SchedulerClient::Local(LocalScheduler::new())
        }
    }
}

/// Hourly outbound sync through the task dispatcher
fn spawn_sync_loop(state: AppState, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            let task_state = state.clone();
            let dispatched = state
                .tasks
                .dispatch(
                    "sync_salesforce",
                    polaris_org::tasks::RetryPolicy::crm_sync(),
                    move || {
                        let state = task_state.clone();
                        async move { polaris_org::crm::outbound::sync_salesforce(&state).await }
                    },
                )
                .await;
            if let Err(e) = dispatched {
                tracing::error!(error = %e, "Failed to queue Salesforce sync");
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }

    shutdown.cancel();
}
