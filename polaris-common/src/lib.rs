//! # Polaris Common Library
//!
//! Shared code for the Polaris organization lifecycle services including:
//! - Database schema, models and initialization
//! - Domain event types (DomainEvent enum) and the EventBus
//! - Error taxonomy
//! - Configuration loading
//! - Database retry helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod retry;

pub use error::{Error, Result};
pub use events::{DomainEvent, EventBus};
