//! Tenant blob storage
//!
//! Keys are namespaced by tenant id so deletion can be a single prefix
//! removal. The backing store is a filesystem tree rooted at the service
//! data folder.

use polaris_common::{Error, Result};
use std::path::PathBuf;
use uuid::Uuid;

pub struct DriveStore {
    root: PathBuf,
}

impl DriveStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn namespace(&self, tenant_id: Uuid) -> PathBuf {
        self.root.join(tenant_id.to_string())
    }

    /// Create the tenant's namespace. Returns the namespace key recorded
    /// in the drives table. Idempotent.
    pub fn ensure_namespace(&self, tenant_id: Uuid) -> Result<String> {
        let path = self.namespace(tenant_id);
        std::fs::create_dir_all(&path)?;
        Ok(tenant_id.to_string())
    }

    /// Remove everything stored under the tenant's namespace
    pub fn delete_namespace(&self, tenant_id: Uuid) -> Result<()> {
        let path = self.namespace(tenant_id);
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        Ok(())
    }

    /// Store a file under the tenant's namespace
    pub fn put_file(&self, tenant_id: Uuid, rel_path: &str, bytes: &[u8]) -> Result<PathBuf> {
        if rel_path.contains("..") {
            return Err(Error::Validation(format!("bad blob path: {rel_path}")));
        }
        let path = self.namespace(tenant_id).join(rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn exists(&self, tenant_id: Uuid) -> bool {
        self.namespace(tenant_id).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = DriveStore::new(dir.path().to_path_buf());
        let tenant = Uuid::new_v4();

        store.ensure_namespace(tenant).unwrap();
        assert!(store.exists(tenant));

        store.put_file(tenant, "policies/security.docx", b"doc").unwrap();

        store.delete_namespace(tenant).unwrap();
        assert!(!store.exists(tenant));
    }

    #[test]
    fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DriveStore::new(dir.path().to_path_buf());
        let err = store.put_file(Uuid::new_v4(), "../escape", b"x").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
