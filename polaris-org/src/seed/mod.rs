//! Seed engine
//!
//! Upserts default content (controls, policies, programs, ...) from a
//! versioned archive into a tenant. Runs are serialized per tenant via
//! the advisory lock registry and always terminate in DONE or FAILED with
//! the accumulated row errors in status_detail.

pub mod archive;
pub mod engine;
pub mod locks;
pub mod naming;
pub mod sheets;

pub use engine::{
    create_seed_for_target, dispatch_seed, run_seed_for_tenant, BULK_TARGET_SENTINEL,
};
