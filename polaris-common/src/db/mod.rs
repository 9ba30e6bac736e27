//! Database access for Polaris
//!
//! Schema initialization and shared row models. Per-entity query modules
//! live in the service crates.

pub mod init;
pub mod models;

pub use init::{init_database, init_in_memory};
