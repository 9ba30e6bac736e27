//! Common error types for Polaris

use thiserror::Error;

/// Common result type for Polaris operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the Polaris services
///
/// Everything a handler or task can fail with maps onto one of these
/// variants; the HTTP layer and the task dispatcher both dispatch on them.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input violated a schema or invariant
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested entity not found by key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// Missing or invalid credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not permitted
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// IdP, CRM, mail or blob store failure. The task dispatcher retries
    /// these; every other variant is fatal for a task.
    #[error("External system error ({system}): {detail}")]
    ExternalSystem { system: String, detail: String },

    /// State machine refused a transition
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// A referenced entity is missing (foreign key at the domain level)
    #[error("Reference missing: {0}")]
    ReferenceMissing(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for external-system failures
    pub fn external(system: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::ExternalSystem {
            system: system.into(),
            detail: detail.into(),
        }
    }

    /// Whether the task dispatcher may retry the failed operation
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::ExternalSystem { .. })
    }
}
