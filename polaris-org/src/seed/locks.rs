//! Per-tenant advisory locks
//!
//! Seed runs against one tenant are serialized by holding the tenant's
//! lock for the whole run; concurrent seeds queue on the same mutex
//! rather than being discarded. The migration engine takes the same lock,
//! which makes it mutually exclusive with seeding.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

#[derive(Default)]
pub struct TenantLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the tenant's lock, waiting behind any holder
    pub async fn acquire(&self, tenant_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("tenant lock registry poisoned");
            map.entry(tenant_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn concurrent_holders_queue_rather_than_overlap() {
        let locks = Arc::new(TenantLocks::new());
        let tenant = Uuid::new_v4();
        let active = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = locks.clone();
            let active = active.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(tenant).await;
                assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn different_tenants_do_not_contend() {
        let locks = TenantLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let _b = locks.acquire(Uuid::new_v4()).await;
    }
}
