//! In-process resource store.
//!
//! Blobs live in a map for the lifetime of the store; local copies are
//! written to a private scratch directory. Suitable for tests and ephemeral
//! deployments.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use uuid::Uuid;

use super::{LocalCopy, ResourceStore};
use crate::core::{StorageError, StorageResult};
use crate::domain::ResourceHandle;

/// Resource store holding blobs in memory
#[derive(Debug)]
pub struct MemoryResourceStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    scratch: TempDir,
}

impl MemoryResourceStore {
    pub fn new() -> StorageResult<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("packvault-memory-")
            .tempdir()
            .map_err(|e| StorageError::store("open", None, e))?;
        Ok(Self {
            blobs: Mutex::new(HashMap::new()),
            scratch,
        })
    }

    /// Number of blobs currently held
    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| StorageError::store("lock", None, "blob map poisoned"))
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn import(&self, path: &Path) -> StorageResult<ResourceHandle> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            StorageError::store("import", None, format!("{}: {}", path.display(), e))
        })?;

        let checksum = hex::encode(Sha256::digest(&bytes));
        let key = Uuid::new_v4().to_string();
        let handle = ResourceHandle::new(key.clone(), checksum, bytes.len() as u64);

        self.lock()?.insert(key, bytes);
        Ok(handle)
    }

    async fn delete(&self, handle: &ResourceHandle) -> StorageResult<()> {
        self.lock()?.remove(handle.key());
        Ok(())
    }

    async fn open_local_copy(&self, handle: &ResourceHandle) -> StorageResult<LocalCopy> {
        let bytes = self
            .lock()?
            .get(handle.key())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("blob {}", handle.key())))?;

        let mut copy = tempfile::Builder::new()
            .prefix("copy-")
            .suffix(".zip")
            .tempfile_in(self.scratch.path())
            .map_err(|e| StorageError::store("open", Some(handle.key()), e))?;
        copy.write_all(&bytes)
            .and_then(|_| copy.flush())
            .map_err(|e| StorageError::store("open", Some(handle.key()), e))?;

        LocalCopy::new(copy.into_temp_path())
    }

    async fn contains(&self, handle: &ResourceHandle) -> StorageResult<bool> {
        Ok(self.lock()?.contains_key(handle.key()))
    }
}
