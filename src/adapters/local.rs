//! Filesystem-backed resource store.
//!
//! # Storage Layout
//!
//! ```text
//! <root>/
//! ├── <uuid>.blob      # imported archives
//! └── scratch/         # temporary local copies
//! ```

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{copy_with_digest, file_digest, LocalCopy, ResourceStore};
use crate::core::{StorageError, StorageResult};
use crate::domain::ResourceHandle;

/// Resource store keeping blobs as files under a root directory
#[derive(Debug, Clone)]
pub struct LocalResourceStore {
    root: PathBuf,
}

impl LocalResourceStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        let scratch = root.join("scratch");
        fs::create_dir_all(&scratch)
            .map_err(|e| StorageError::io("create resource store", &scratch, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> StorageResult<PathBuf> {
        Uuid::parse_str(key)
            .map_err(|_| StorageError::store("resolve", Some(key), "malformed blob key"))?;
        Ok(self.root.join(format!("{}.blob", key)))
    }

    fn scratch_dir(&self) -> PathBuf {
        self.root.join("scratch")
    }
}

#[async_trait]
impl ResourceStore for LocalResourceStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn import(&self, path: &Path) -> StorageResult<ResourceHandle> {
        let key = Uuid::new_v4().to_string();
        let blob = self.blob_path(&key)?;
        let scratch = self.scratch_dir();
        let source = path.to_path_buf();

        let (checksum, size) = tokio::task::spawn_blocking(move || {
            let file = File::open(&source).map_err(|e| {
                StorageError::store("import", None, format!("{}: {}", source.display(), e))
            })?;
            let mut reader = BufReader::new(file);

            // Write beside the store and rename so a blob is never half-written
            let staged = tempfile::Builder::new()
                .prefix("import-")
                .tempfile_in(&scratch)
                .map_err(|e| StorageError::store("import", None, e))?;
            let mut writer = BufWriter::new(staged.as_file());
            let digest = copy_with_digest(&mut reader, &mut writer)
                .map_err(|e| StorageError::store("import", None, e))?;
            drop(writer);

            staged
                .persist(&blob)
                .map_err(|e| StorageError::store("import", None, e.error))?;
            Ok::<_, StorageError>(digest)
        })
        .await
        .map_err(|e| StorageError::store("import", None, e))??;

        debug!(%key, size, "Imported blob");
        Ok(ResourceHandle::new(key, checksum, size))
    }

    async fn delete(&self, handle: &ResourceHandle) -> StorageResult<()> {
        let blob = self.blob_path(handle.key())?;
        match tokio::fs::remove_file(&blob).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key = %handle.key(), "Blob already absent");
                Ok(())
            }
            Err(e) => Err(StorageError::store("delete", Some(handle.key()), e)),
        }
    }

    async fn open_local_copy(&self, handle: &ResourceHandle) -> StorageResult<LocalCopy> {
        let blob = self.blob_path(handle.key())?;
        let scratch = self.scratch_dir();
        let key = handle.key().to_string();
        let expected = handle.checksum().to_string();

        tokio::task::spawn_blocking(move || {
            let file = File::open(&blob).map_err(|e| match e.kind() {
                ErrorKind::NotFound => StorageError::NotFound(format!("blob {}", key)),
                _ => StorageError::store("open", Some(&key), e),
            })?;

            let copy = tempfile::Builder::new()
                .prefix("copy-")
                .suffix(".zip")
                .tempfile_in(&scratch)
                .map_err(|e| StorageError::store("open", Some(&key), e))?;
            let (checksum, _) = copy_with_digest(
                &mut BufReader::new(file),
                &mut BufWriter::new(copy.as_file()),
            )
            .map_err(|e| StorageError::store("open", Some(&key), e))?;

            if checksum != expected {
                return Err(StorageError::store("open", Some(&key), "checksum mismatch"));
            }

            LocalCopy::new(copy.into_temp_path())
        })
        .await
        .map_err(|e| StorageError::store("open", None, e))?
    }

    async fn contains(&self, handle: &ResourceHandle) -> StorageResult<bool> {
        let blob = self.blob_path(handle.key())?;
        if !blob.is_file() {
            return Ok(false);
        }
        let digest = tokio::task::spawn_blocking(move || file_digest(&blob))
            .await
            .map_err(|e| StorageError::store("inspect", Some(handle.key()), e))?
            .map_err(|e| StorageError::store("inspect", Some(handle.key()), e))?;
        Ok(digest == handle.checksum())
    }
}
