//! Content-entity database operations
//!
//! These tables are owned by the seed, prescription and migration engines.
//! Everything here is an upsert keyed on the entity's natural key so the
//! engines can re-run safely.

pub mod certifications;
pub mod controls;
pub mod library;
pub mod misc;
pub mod people;
pub mod programs;
