//! CRM webhook handler
//!
//! `POST /organization/salesforce`, authenticated by the shared secret in
//! the Authorization header. The response body on success is the bare
//! tenant UUID. Detailed processing failures go to the alerting channel;
//! the caller only sees a generic 500.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::crm::inbound;
use crate::crm::types::SalesforceAccountPayload;
use crate::state::AppState;
use polaris_common::Error;

/// Body fields the webhook contract requires
const REQUIRED_FIELDS: &[&str] = &[
    "Account_ID_18_char__c",
    "Name",
    "Website",
    "Compliance_Architect__r",
    "Customer_Success_Manager__r",
    "Current_Contract_Start_Date_Auto__c",
    "Account_Status__c",
    "LastModifiedById",
];

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Json<Value>,
) -> Response {
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if provided != Some(state.webhook_secret.as_str()) {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| body.get(field).map(Value::is_null).unwrap_or(true))
        .collect();
    if !missing.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            format!("missing required fields: {}", missing.join(", ")),
        )
            .into_response();
    }

    let payload: SalesforceAccountPayload = match serde_json::from_value(body.0.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("unreadable payload: {e}")).into_response()
        }
    };
    let Some(account) = payload.normalize() else {
        return (StatusCode::BAD_REQUEST, "empty Account_ID_18_char__c").into_response();
    };

    match inbound::process_account(&state, &account).await {
        Ok(outcome) => {
            for line in &outcome.status_lines {
                tracing::warn!(sfdc_id = %account.sfdc_id, line = %line, "Webhook status");
            }
            (StatusCode::OK, outcome.tenant_id.to_string()).into_response()
        }
        Err(Error::Validation(line)) => {
            tracing::warn!(sfdc_id = %account.sfdc_id, line = %line, "Webhook rejected");
            (StatusCode::BAD_REQUEST, line).into_response()
        }
        Err(e) => {
            tracing::error!(sfdc_id = %account.sfdc_id, error = %e, "Webhook processing failed");
            let detail = format!(
                "Salesforce webhook failed for account {}: {e}",
                account.sfdc_id
            );
            if let Err(post_err) = state.slack.post_message(&detail).await {
                tracing::warn!(error = %post_err, "Webhook failure Slack post failed");
            }
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}
