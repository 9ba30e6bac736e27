//! CRM payload shapes and normalization

use polaris_common::db::models::TenantState;
use serde::Deserialize;

/// Raw webhook/pull payload, provider field names preserved
#[derive(Debug, Clone, Deserialize)]
pub struct SalesforceAccountPayload {
    #[serde(rename = "Account_ID_18_char__c")]
    pub account_id: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Website")]
    pub website: Option<String>,
    #[serde(rename = "Compliance_Architect__r")]
    pub compliance_architect: Option<ContactRef>,
    #[serde(rename = "Customer_Success_Manager__r")]
    pub customer_success_manager: Option<ContactRef>,
    #[serde(rename = "Current_Contract_Start_Date_Auto__c")]
    pub contract_start_date: Option<String>,
    #[serde(rename = "Account_Status__c")]
    pub account_status: Option<String>,
    #[serde(rename = "LastModifiedById")]
    pub last_modified_by: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactRef {
    #[serde(rename = "Email")]
    pub email: Option<String>,
}

/// Normalized account as the decision tree consumes it
#[derive(Debug, Clone)]
pub struct CrmAccount {
    pub sfdc_id: String,
    pub name: Option<String>,
    pub website: Option<String>,
    pub csm_email: Option<String>,
    pub ca_email: Option<String>,
    pub contract_sign_date: Option<chrono::NaiveDate>,
    pub account_status: Option<String>,
    pub last_modified_by: Option<String>,
}

impl SalesforceAccountPayload {
    /// Normalize; only the account id is strictly required to address
    /// the account at all.
    pub fn normalize(self) -> Option<CrmAccount> {
        let sfdc_id = self.account_id?.trim().to_string();
        if sfdc_id.is_empty() {
            return None;
        }

        Some(CrmAccount {
            sfdc_id,
            name: self.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            website: self
                .website
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty()),
            csm_email: self
                .customer_success_manager
                .and_then(|c| c.email)
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
            ca_email: self
                .compliance_architect
                .and_then(|c| c.email)
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
            contract_sign_date: self
                .contract_start_date
                .as_deref()
                .and_then(parse_contract_date),
            account_status: self
                .account_status
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            last_modified_by: self.last_modified_by,
        })
    }
}

/// The CRM sends "2024-01-10 00:00:00"; a bare date also appears
fn parse_contract_date(raw: &str) -> Option<chrono::NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    raw.parse::<chrono::NaiveDate>().ok()
}

/// Account statuses that may create or keep a live tenant
pub fn map_account_status(status: &str) -> Option<TenantState> {
    match status {
        "Customer" => Some(TenantState::Active),
        "Active Trial" => Some(TenantState::Trial),
        "Churned" | "Deactivated" => Some(TenantState::Deactivated),
        _ => None,
    }
}

/// Statuses allowed to create a brand-new tenant
pub fn status_allows_creation(status: &str) -> bool {
    matches!(status, "Customer" | "Active Trial")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_normalizes_nested_contacts_and_date() {
        let payload: SalesforceAccountPayload = serde_json::from_value(json!({
            "Account_ID_18_char__c": "abc123",
            "Name": "Acme",
            "Website": "https://acme.example",
            "Compliance_Architect__r": {"Email": "ca@x"},
            "Customer_Success_Manager__r": {"Email": "csm@x"},
            "Current_Contract_Start_Date_Auto__c": "2024-01-10 00:00:00",
            "Account_Status__c": "Customer",
            "LastModifiedById": "u1"
        }))
        .unwrap();

        let account = payload.normalize().unwrap();
        assert_eq!(account.sfdc_id, "abc123");
        assert_eq!(account.csm_email.as_deref(), Some("csm@x"));
        assert_eq!(account.ca_email.as_deref(), Some("ca@x"));
        assert_eq!(
            account.contract_sign_date,
            Some(chrono::NaiveDate::from_ymd_opt(2024, 1, 10).unwrap())
        );
    }

    #[test]
    fn payload_without_account_id_does_not_normalize() {
        let payload: SalesforceAccountPayload =
            serde_json::from_value(json!({ "Name": "Acme" })).unwrap();
        assert!(payload.normalize().is_none());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(map_account_status("Customer"), Some(TenantState::Active));
        assert_eq!(map_account_status("Active Trial"), Some(TenantState::Trial));
        assert_eq!(map_account_status("Prospect"), None);
        assert!(status_allows_creation("Active Trial"));
        assert!(!status_allows_creation("Churned"));
    }
}
