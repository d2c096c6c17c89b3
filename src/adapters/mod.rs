//! Resource store backends.
//!
//! A resource store holds the durable archive blobs. Working directories are
//! always reconstructible from it. Backends are selected by configuration
//! through [`open_store`].

pub mod local;
pub mod memory;

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::TempPath;

use crate::config::{StorageConfig, StoreBackend};
use crate::core::{StorageError, StorageResult};
use crate::domain::ResourceHandle;

pub use local::LocalResourceStore;
pub use memory::MemoryResourceStore;

/// A temporary, read-only local copy of a stored blob
///
/// The file is removed when the copy is dropped.
#[derive(Debug)]
pub struct LocalCopy {
    path: TempPath,
}

impl LocalCopy {
    /// Wrap a temp file, marking it read-only
    pub fn new(path: TempPath) -> StorageResult<Self> {
        let mut permissions = fs::metadata(&path)
            .map_err(|e| StorageError::io("inspect local copy", path.to_path_buf(), e))?
            .permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&path, permissions)
            .map_err(|e| StorageError::io("protect local copy", path.to_path_buf(), e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRef<Path> for LocalCopy {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Trait for blob storage backends
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Import the file at `path` as a new blob
    async fn import(&self, path: &Path) -> StorageResult<ResourceHandle>;

    /// Delete a blob; deleting an absent blob is a no-op
    async fn delete(&self, handle: &ResourceHandle) -> StorageResult<()>;

    /// Materialize a temporary local copy of a blob
    async fn open_local_copy(&self, handle: &ResourceHandle) -> StorageResult<LocalCopy>;

    /// Whether the blob is still held by the store
    async fn contains(&self, handle: &ResourceHandle) -> StorageResult<bool>;
}

/// Build the resource store selected by configuration
pub fn open_store(config: &StorageConfig) -> StorageResult<Arc<dyn ResourceStore>> {
    match &config.store {
        StoreBackend::Local { root } => Ok(Arc::new(LocalResourceStore::open(root)?)),
        StoreBackend::Memory => Ok(Arc::new(MemoryResourceStore::new()?)),
    }
}

/// Stream `reader` into `writer`, returning (sha256 hex, byte count)
pub(crate) fn copy_with_digest<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    let mut total = 0u64;

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        writer.write_all(&buffer[..read])?;
        total += read as u64;
    }
    writer.flush()?;

    Ok((hex::encode(hasher.finalize()), total))
}

/// SHA-256 of a file's contents (hex)
pub(crate) fn file_digest(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let (digest, _) = copy_with_digest(&mut reader, &mut io::sink())?;
    Ok(digest)
}
