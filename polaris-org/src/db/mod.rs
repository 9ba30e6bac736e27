//! Per-entity database operations
//!
//! Every query module works against the schema created by
//! `polaris_common::db::init`. Upserts use `ON CONFLICT ... DO UPDATE`
//! keyed on the entity's natural key.

pub mod api_tokens;
pub mod content;
pub mod feature_flags;
pub mod migration_runs;
pub mod onboarding;
pub mod seeds;
pub mod tenants;
pub mod users;
