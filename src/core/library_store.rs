//! One-shot packaging of library upload directories.
//!
//! A library archive is always built fresh from the upload directory, which
//! is never modified. There is no working-directory concept here.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::adapters::ResourceStore;
use crate::config::{paths, StorageConfig};
use crate::domain::{LibraryRecord, ResourceHandle};

use super::archive::{self, Compression};
use super::error::{StorageError, StorageResult};
use super::run_blocking;

/// Packages library folders into the resource store
pub struct LibraryPackageStore {
    store: Arc<dyn ResourceStore>,
    temp_root: PathBuf,
    compression: Compression,
}

impl LibraryPackageStore {
    pub fn new(store: Arc<dyn ResourceStore>, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            temp_root: temp_root.into(),
            compression: Compression::default(),
        }
    }

    /// Build a store from resolved configuration
    pub fn from_config(config: &StorageConfig, store: Arc<dyn ResourceStore>) -> Self {
        Self::new(store, &config.temp_root).with_compression(config.compression)
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Archive `upload_dir` and register it on `record`.
    ///
    /// A handle already present on the record is deleted once the new
    /// archive is imported. The caller persists the record.
    #[instrument(skip(self, upload_dir, record), fields(library_id = record.library_id, library = %record.folder_name()))]
    pub async fn package_library(
        &self,
        upload_dir: &Path,
        record: &mut LibraryRecord,
    ) -> StorageResult<ResourceHandle> {
        let library_id = record.library_id;
        let context = |e: StorageError, op: &'static str| e.for_library(library_id, op);

        if !upload_dir.is_dir() {
            return Err(context(
                StorageError::NotFound(format!("upload directory {}", upload_dir.display())),
                "package library",
            ));
        }

        let staging = paths::library_staging_archive(&self.temp_root, library_id);
        let (source, target, compression) =
            (upload_dir.to_path_buf(), staging.clone(), self.compression);
        let packed = run_blocking(move || archive::pack(&source, &target, compression)).await;
        let summary = match packed {
            Ok(summary) => summary,
            Err(e) => {
                discard(&staging);
                return Err(context(e, "pack"));
            }
        };

        let imported = self.store.import(&staging).await;
        discard(&staging);
        let handle = imported.map_err(|e| context(e, "import archive"))?;

        if let Some(old) = record.archive.take() {
            if let Err(e) = self.store.delete(&old).await {
                if let Err(rollback) = self.store.delete(&handle).await {
                    warn!(handle = %handle, "Failed to roll back imported archive: {}", rollback);
                }
                record.archive = Some(old);
                return Err(context(e, "delete previous archive"));
            }
        }

        info!(
            handle = %handle,
            entries = summary.entries,
            bytes = summary.total_bytes,
            "Packaged library"
        );

        record.archive = Some(handle.clone());
        Ok(handle)
    }

    /// Unpack a library archive into `<target_root>/<Name-Major.Minor>`
    pub async fn export_library(
        &self,
        record: &LibraryRecord,
        target_root: &Path,
    ) -> StorageResult<PathBuf> {
        let handle = record.archive.as_ref().ok_or_else(|| {
            StorageError::NotFound(format!("archive for library {}", record.folder_name()))
        })?;

        let folder = record.folder_name();
        let mut components = Path::new(&folder).components();
        let single = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single || folder.contains('\\') {
            return Err(StorageError::InvalidName(format!("library folder {:?}", folder))
                .for_library(record.library_id, "export"));
        }

        let copy = self
            .store
            .open_local_copy(handle)
            .await
            .map_err(|e| e.for_library(record.library_id, "open archive"))?;

        let dest = target_root.join(&folder);
        let target = dest.clone();
        run_blocking(move || archive::unpack(copy.path(), &target))
            .await
            .map_err(|e| e.for_library(record.library_id, "export"))?;

        Ok(dest)
    }
}

fn discard(staging: &Path) {
    if let Err(e) = std::fs::remove_file(staging) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %staging.display(), "Failed to remove staging archive: {}", e);
        }
    }
}
