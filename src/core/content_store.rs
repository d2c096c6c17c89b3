//! Unpack-on-demand and repack-on-save for content packages.
//!
//! Life of a package inside one [`EditSession`]:
//! 1. `ensure_working_directory` takes the lease and extracts the stored
//!    archive into `<temp_root>/<id>` (once per session)
//! 2. The caller edits files in place
//! 3. `persist_working_directory` re-archives the directory, swaps the
//!    stored handle, removes the working directory and releases the lease

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::adapters::ResourceStore;
use crate::config::StorageConfig;
use crate::domain::{PackageId, PackageRecord, ResourceHandle};

use super::archive::{self, Compression};
use super::error::{PackageContext, StorageResult};
use super::run_blocking;
use super::session::{EditSession, PackageLease};
use super::workdir::WorkingDirectoryManager;

/// Orchestrates a package's working directory and its archived state
pub struct ContentPackageStore {
    store: Arc<dyn ResourceStore>,
    workdirs: WorkingDirectoryManager,
    compression: Compression,
    locking: bool,
}

impl ContentPackageStore {
    pub fn new(store: Arc<dyn ResourceStore>, workdirs: WorkingDirectoryManager) -> Self {
        Self {
            store,
            workdirs,
            compression: Compression::default(),
            locking: true,
        }
    }

    /// Build a store from resolved configuration
    pub fn from_config(config: &StorageConfig, store: Arc<dyn ResourceStore>) -> Self {
        Self::new(store, WorkingDirectoryManager::new(&config.temp_root))
            .with_compression(config.compression)
            .with_locking(config.locking)
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_locking(mut self, locking: bool) -> Self {
        self.locking = locking;
        self
    }

    pub fn working_directories(&self) -> &WorkingDirectoryManager {
        &self.workdirs
    }

    pub fn resource_store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Working directory of a package
    pub fn working_directory(&self, id: PackageId) -> PathBuf {
        self.workdirs.path_for(id)
    }

    /// Take the package lease for this session if it is not held yet
    pub async fn acquire_lease(&self, session: &mut EditSession, id: PackageId) -> StorageResult<()> {
        if session.holds_lease(id) {
            return Ok(());
        }

        let lock_path = self.workdirs.lock_path_for(id);
        let enabled = self.locking;
        let lease = run_blocking(move || PackageLease::acquire(id, &lock_path, enabled))
            .await
            .package_context(id, "acquire lease")?;
        session.insert_lease(lease);
        Ok(())
    }

    /// Materialize the working directory for `id`, extracting `stored` into it.
    ///
    /// A second call in the same session is a no-op, so in-progress edits
    /// are never overwritten. If extraction fails the package stays marked
    /// as dumped; the caller decides whether to clean up.
    #[instrument(skip(self, session, stored), fields(session = %session.id()))]
    pub async fn ensure_working_directory(
        &self,
        session: &mut EditSession,
        id: PackageId,
        stored: Option<&ResourceHandle>,
    ) -> StorageResult<PathBuf> {
        let path = self.workdirs.path_for(id);

        if session.is_dumped(id) {
            debug!("Working directory already dumped in this session");
            return Ok(path);
        }

        self.acquire_lease(session, id).await?;
        session.mark_dumped(id);

        self.workdirs
            .ensure(&path)
            .package_context(id, "create working directory")?;

        let Some(handle) = stored else {
            debug!("No archive stored yet");
            return Ok(path);
        };

        let copy = self
            .store
            .open_local_copy(handle)
            .await
            .package_context(id, "open archive")?;

        let dest = path.clone();
        let summary = run_blocking(move || archive::unpack(copy.path(), &dest))
            .await
            .package_context(id, "unpack")?;

        info!(
            handle = %handle,
            entries = summary.entries,
            bytes = summary.total_bytes,
            "Unpacked package archive"
        );
        Ok(path)
    }

    /// Persist the working directory of `id` as its new archive.
    ///
    /// Returns the handle that replaces `previous`, or `None` when the
    /// working directory is empty or missing (in which case `previous` is
    /// deleted). On failure `previous` is left untouched and the working
    /// directory stays on disk.
    #[instrument(skip(self, session, previous), fields(session = %session.id()))]
    pub async fn persist_working_directory(
        &self,
        session: &mut EditSession,
        id: PackageId,
        previous: Option<&ResourceHandle>,
    ) -> StorageResult<Option<ResourceHandle>> {
        self.acquire_lease(session, id).await?;

        let path = self.workdirs.path_for(id);
        let workdirs = self.workdirs.clone();
        let dir = path.clone();
        let empty = run_blocking(move || workdirs.is_empty_or_missing(&dir))
            .await
            .package_context(id, "inspect working directory")?;

        if empty {
            if let Some(old) = previous {
                self.store
                    .delete(old)
                    .await
                    .package_context(id, "delete archive")?;
                info!(handle = %old, "Working directory empty, archive removed");
            }
            self.cleanup(id, &path).await;
            session.finish(id);
            return Ok(None);
        }

        let staging = self.workdirs.staging_archive_for(id);
        let (source, target, compression) = (path.clone(), staging.clone(), self.compression);
        let packed = run_blocking(move || archive::pack(&source, &target, compression)).await;
        let summary = match packed {
            Ok(summary) => summary,
            Err(e) => {
                self.discard_staging(&staging);
                return Err(e.for_package(id, "pack"));
            }
        };

        let handle = match self.store.import(&staging).await {
            Ok(handle) => handle,
            Err(e) => {
                self.discard_staging(&staging);
                return Err(e.for_package(id, "import archive"));
            }
        };

        // The old blob goes only once the new one is imported
        if let Some(old) = previous {
            if let Err(e) = self.store.delete(old).await {
                // Roll back so the caller keeps exactly one owned handle
                if let Err(rollback) = self.store.delete(&handle).await {
                    warn!(handle = %handle, "Failed to roll back imported archive: {}", rollback);
                }
                self.discard_staging(&staging);
                return Err(e.for_package(id, "delete previous archive"));
            }
        }

        info!(
            handle = %handle,
            entries = summary.entries,
            bytes = summary.total_bytes,
            "Repacked package"
        );

        self.discard_staging(&staging);
        self.cleanup(id, &path).await;
        session.finish(id);

        Ok(Some(handle))
    }

    /// Unpack a record's archive (see [`Self::ensure_working_directory`])
    pub async fn open(&self, session: &mut EditSession, record: &PackageRecord) -> StorageResult<PathBuf> {
        self.ensure_working_directory(session, record.id, record.archive.as_ref())
            .await
    }

    /// Repack a record's working directory and swap its archive handle
    pub async fn save(&self, session: &mut EditSession, record: &mut PackageRecord) -> StorageResult<()> {
        record.archive = self
            .persist_working_directory(session, record.id, record.archive.as_ref())
            .await?;
        Ok(())
    }

    /// Delete everything associated with a package
    #[instrument(skip(self, session, stored), fields(session = %session.id()))]
    pub async fn delete_package(
        &self,
        session: &mut EditSession,
        id: PackageId,
        stored: Option<&ResourceHandle>,
    ) -> StorageResult<()> {
        self.acquire_lease(session, id).await?;

        if let Some(handle) = stored {
            self.store
                .delete(handle)
                .await
                .package_context(id, "delete archive")?;
        }

        let path = self.workdirs.path_for(id);
        let staging = self.workdirs.staging_archive_for(id);
        let workdirs = self.workdirs.clone();
        run_blocking(move || {
            workdirs.remove_recursively(&path)?;
            workdirs.remove_file(&staging)
        })
        .await
        .package_context(id, "remove working directory")?;

        session.finish(id);
        info!("Deleted package");
        Ok(())
    }

    /// Store an independent copy of an archive (for a cloned package)
    pub async fn clone_package(&self, archive: &ResourceHandle) -> StorageResult<ResourceHandle> {
        let copy = self.store.open_local_copy(archive).await?;
        let handle = self.store.import(copy.path()).await?;
        debug!(from = %archive, to = %handle, "Cloned package archive");
        Ok(handle)
    }

    /// Remove the working directory after a successful repack.
    ///
    /// The new handle is already committed, so failures are only logged.
    async fn cleanup(&self, id: PackageId, path: &Path) {
        let workdirs = self.workdirs.clone();
        let target = path.to_path_buf();
        if let Err(e) = run_blocking(move || workdirs.remove_recursively(&target)).await {
            warn!(%id, "Failed to remove working directory: {}", e);
        }
    }

    fn discard_staging(&self, staging: &Path) {
        if let Err(e) = self.workdirs.remove_file(staging) {
            warn!(path = %staging.display(), "Failed to remove staging archive: {}", e);
        }
    }
}
