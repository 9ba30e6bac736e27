//! CRM reconciliation
//!
//! Bidirectional sync with Salesforce. Inbound (webhook and pull) runs a
//! single decision tree keyed on the account's 18-character id; outbound
//! pushes back-references for newly-synced accounts. Both directions are
//! idempotent upserts, so webhook and periodic sync may overlap freely.

pub mod inbound;
pub mod outbound;
pub mod types;
