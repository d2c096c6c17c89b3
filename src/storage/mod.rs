//! File storage capability surface used by the rest of the system.
//!
//! [`FileStorageAdapter`] bundles the orchestrating stores with the per-file
//! operations editors need: named files inside a package's working
//! directory, exports, fresh upload paths, cached asset bundles and the
//! write-access check. Every caller-supplied file name goes through the same
//! path-safety rule as archive extraction.

pub mod assets;

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::adapters::{self, ResourceStore};
use crate::config::{paths, StorageConfig};
use crate::core::{
    archive, run_blocking, ContentPackageStore, EditSession, LibraryPackageStore, StorageError,
    StorageResult,
};
use crate::domain::{
    LibraryRecord, PackageDescriptor, PackageId, ResourceHandle, CONTENT_DIR, CONTENT_FILE,
    DESCRIPTOR_FILE,
};

pub use assets::{AssetCache, AssetFile, AssetKind, CachedAssets};

/// How a resolved path is about to be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    /// The temp root is created first so the check runs against it
    Write,
}

/// Origin of a file copied between packages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSource {
    /// Working directory of another package
    Package(PackageId),
    /// Editor scratch area
    Editor,
}

/// Full storage surface over one resource store and one set of roots
pub struct FileStorageAdapter {
    content: ContentPackageStore,
    libraries: LibraryPackageStore,
    assets: AssetCache,
    config: StorageConfig,
}

impl FileStorageAdapter {
    pub fn new(config: StorageConfig, store: Arc<dyn ResourceStore>) -> Self {
        Self {
            content: ContentPackageStore::from_config(&config, store.clone()),
            libraries: LibraryPackageStore::from_config(&config, store),
            assets: AssetCache::new(&config.cache_dir),
            config,
        }
    }

    /// Open the adapter with the resource store selected by `config`
    pub fn open(config: StorageConfig) -> StorageResult<Self> {
        let store = adapters::open_store(&config)?;
        info!(backend = store.name(), temp_root = %config.temp_root.display(), "Opened file storage");
        Ok(Self::new(config, store))
    }

    pub fn content(&self) -> &ContentPackageStore {
        &self.content
    }

    pub fn libraries(&self) -> &LibraryPackageStore {
        &self.libraries
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    // ========================================================================
    // Packages and libraries
    // ========================================================================

    /// Archive a library upload directory and register it on `record`
    pub async fn save_library(
        &self,
        upload_dir: &Path,
        record: &mut LibraryRecord,
    ) -> StorageResult<ResourceHandle> {
        self.libraries.package_library(upload_dir, record).await
    }

    /// Unpack a library into `<target_root>/<Name-Major.Minor>`
    pub async fn export_library(
        &self,
        record: &LibraryRecord,
        target_root: &Path,
    ) -> StorageResult<PathBuf> {
        self.libraries.export_library(record, target_root).await
    }

    /// Store an independent copy of a package archive
    pub async fn clone_content(&self, stored: &ResourceHandle) -> StorageResult<ResourceHandle> {
        self.content.clone_package(stored).await
    }

    /// Delete a package's archive and working directory
    pub async fn delete_content(
        &self,
        session: &mut EditSession,
        id: PackageId,
        stored: Option<&ResourceHandle>,
    ) -> StorageResult<()> {
        self.content.delete_package(session, id, stored).await
    }

    /// Unpack a package's stored archive into `target_dir`.
    ///
    /// The stored blob is only read.
    pub async fn export_content(
        &self,
        stored: &ResourceHandle,
        target_dir: &Path,
    ) -> StorageResult<()> {
        let copy = self.content.resource_store().open_local_copy(stored).await?;
        let target = target_dir.to_path_buf();
        let summary = run_blocking(move || archive::unpack(copy.path(), &target)).await?;
        debug!(handle = %stored, entries = summary.entries, "Exported content");
        Ok(())
    }

    /// Copy an upload's content files into the package working directory.
    ///
    /// Returns the parsed descriptor and content parameters. The parameters
    /// file itself is not copied.
    pub async fn move_content_directory(
        &self,
        source: &Path,
        id: PackageId,
    ) -> StorageResult<PackageDescriptor> {
        let descriptor = read_json(&source.join(DESCRIPTOR_FILE)).await?;
        let parameters = read_json(&source.join(CONTENT_FILE)).await?;

        let from = source.join(CONTENT_DIR);
        let to = self
            .contained(PathBuf::from(id.to_string()), &id.to_string(), Access::Write)
            .await?;
        let copied = run_blocking(move || copy_tree(&from, &to, &[Path::new("content.json")]))
            .await
            .map_err(|e| e.for_package(id, "move content directory"))?;

        debug!(%id, copied, "Moved content directory");
        Ok(PackageDescriptor {
            descriptor,
            parameters,
        })
    }

    // ========================================================================
    // Named files
    // ========================================================================

    /// Whether a package's working directory holds `file`
    pub async fn has_content_file(&self, id: PackageId, file: &str) -> StorageResult<bool> {
        let path = self.resolve(FileSource::Package(id), file, Access::Read).await?;
        Ok(fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false))
    }

    /// Remove `file` from a package's working directory; absent is a no-op
    pub async fn remove_content_file(&self, id: PackageId, file: &str) -> StorageResult<()> {
        let path = self.resolve(FileSource::Package(id), file, Access::Read).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io("remove content file", path, e)),
        }
    }

    /// Copy `file` from another package or the editor area into package `to`
    pub async fn clone_content_file(
        &self,
        file: &str,
        from: FileSource,
        to: PackageId,
    ) -> StorageResult<PathBuf> {
        let source = self.resolve(from, file, Access::Read).await?;
        let target = self
            .resolve(FileSource::Package(to), file, Access::Write)
            .await?;

        if !fs::metadata(&source).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(StorageError::NotFound(format!(
                "file {} in {:?}",
                file, from
            )));
        }
        if source == target {
            return Ok(target);
        }

        create_parent(&target).await?;
        fs::copy(&source, &target)
            .await
            .map_err(|e| StorageError::io("copy content file", &target, e))?;
        Ok(target)
    }

    /// Store an editor upload at `file` under `target`
    pub async fn save_file(
        &self,
        target: FileSource,
        file: &str,
        bytes: &[u8],
    ) -> StorageResult<PathBuf> {
        let path = self.resolve(target, file, Access::Write).await?;
        create_parent(&path).await?;
        fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::io("save file", &path, e))?;
        Ok(path)
    }

    /// Read a text file below the temp root
    pub async fn get_content(&self, file: &str) -> StorageResult<String> {
        let path = self.contained(non_empty(file)?, file, Access::Read).await?;
        fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(format!("file {}", file)),
            _ => StorageError::io("read file", &path, e),
        })
    }

    // ========================================================================
    // Exports
    // ========================================================================

    /// Copy a finished export file into the exports directory
    pub async fn save_export(&self, source: &Path, filename: &str) -> StorageResult<PathBuf> {
        let target = self.export_path(filename)?;
        create_parent(&target).await?;
        fs::copy(source, &target)
            .await
            .map_err(|e| StorageError::io("save export", &target, e))?;
        Ok(target)
    }

    pub async fn has_export(&self, filename: &str) -> StorageResult<bool> {
        let path = self.export_path(filename)?;
        Ok(fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false))
    }

    /// Remove an export; absent is a no-op
    pub async fn delete_export(&self, filename: &str) -> StorageResult<()> {
        let path = self.export_path(filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io("delete export", path, e)),
        }
    }

    // ========================================================================
    // Temp paths, asset cache, self-checks
    // ========================================================================

    /// A fresh, unused path for an upload directory.
    ///
    /// The parent exists afterwards; the path itself is not created.
    pub async fn tmp_path(&self) -> StorageResult<PathBuf> {
        let dir = paths::uploads_dir(&self.config.temp_root);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io("create uploads directory", &dir, e))?;
        Ok(dir.join(format!("upload-{}", Uuid::new_v4().simple())))
    }

    /// Concatenate assets into cached bundles under `key`
    pub async fn cache_assets(
        &self,
        files: &[AssetFile],
        key: &str,
    ) -> StorageResult<CachedAssets> {
        let cache = self.assets.clone();
        let (files, key) = (files.to_vec(), key.to_string());
        run_blocking(move || cache.store(&files, &key)).await
    }

    /// Cached bundles for `key`, or `None` on a miss
    pub async fn get_cached_assets(&self, key: &str) -> StorageResult<Option<CachedAssets>> {
        self.assets.get(key)
    }

    /// Invalidate cached bundles
    pub async fn delete_cached_assets<S: AsRef<str>>(&self, keys: &[S]) -> StorageResult<()> {
        self.assets.invalidate(keys)
    }

    /// Whether every configured root can be created and written
    pub async fn has_write_access(&self) -> bool {
        for root in self.config.writable_roots() {
            if let Err(e) = check_writable(root).await {
                warn!(root = %root.display(), "Storage root is not writable: {}", e);
                return false;
            }
        }
        true
    }

    /// Path of `file` inside a package working directory or the editor area
    async fn resolve(
        &self,
        source: FileSource,
        file: &str,
        access: Access,
    ) -> StorageResult<PathBuf> {
        let base = match source {
            FileSource::Package(id) => PathBuf::from(id.to_string()),
            FileSource::Editor => PathBuf::from(paths::EDITOR_DIR),
        };
        self.contained(base.join(non_empty(file)?), file, access)
            .await
    }

    /// Join `relative` onto the temp root, refusing paths that a symlink
    /// would redirect outside of it
    async fn contained(
        &self,
        relative: PathBuf,
        file: &str,
        access: Access,
    ) -> StorageResult<PathBuf> {
        let temp_root = self.config.temp_root.clone();
        let entry = file.to_string();
        run_blocking(move || within_root(&temp_root, &relative, &entry, access)).await
    }

    fn export_path(&self, filename: &str) -> StorageResult<PathBuf> {
        let relative = non_empty(filename)?;
        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.config.exports_dir.join(relative)),
            _ => Err(StorageError::InvalidName(format!("export name {:?}", filename))),
        }
    }
}

fn non_empty(file: &str) -> StorageResult<PathBuf> {
    let relative = archive::safe_relative_path(file)?;
    if relative.as_os_str().is_empty() {
        return Err(StorageError::InvalidName(format!("file name {:?}", file)));
    }
    Ok(relative)
}

fn within_root(
    root: &Path,
    relative: &Path,
    entry: &str,
    access: Access,
) -> StorageResult<PathBuf> {
    if access == Access::Write {
        std::fs::create_dir_all(root)
            .map_err(|e| StorageError::io("create temp root", root, e))?;
    }

    let canonical = match root.canonicalize() {
        Ok(canonical) => canonical,
        // Nothing can exist below a missing root
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(root.join(relative)),
        Err(e) => return Err(StorageError::io("resolve temp root", root, e)),
    };
    archive::ensure_within(&canonical, &canonical.join(relative), entry)?;

    Ok(root.join(relative))
}

async fn create_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io("create directory", parent, e))?;
    }
    Ok(())
}

async fn read_json(path: &Path) -> StorageResult<serde_json::Value> {
    let content = fs::read_to_string(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound(format!("{}", path.display())),
        _ => StorageError::io("read descriptor", path, e),
    })?;
    serde_json::from_str(&content).map_err(|e| {
        StorageError::io(
            "parse descriptor",
            path,
            std::io::Error::new(ErrorKind::InvalidData, e),
        )
    })
}

async fn check_writable(root: &Path) -> std::io::Result<()> {
    fs::create_dir_all(root).await?;
    let marker = root.join(format!(".write-check-{}", Uuid::new_v4().simple()));
    fs::write(&marker, b"ok").await?;
    fs::remove_file(&marker).await
}

/// Copy every regular file under `from` into `to`, skipping `excluded`
/// relative paths. A missing `from` copies nothing.
fn copy_tree(from: &Path, to: &Path, excluded: &[&Path]) -> StorageResult<usize> {
    std::fs::create_dir_all(to).map_err(|e| StorageError::io("create directory", to, e))?;
    if !from.is_dir() {
        return Ok(0);
    }
    let root = to
        .canonicalize()
        .map_err(|e| StorageError::io("resolve directory", to, e))?;

    let mut copied = 0;
    for entry in WalkDir::new(from).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| StorageError::io("walk upload", from, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|_| StorageError::InvalidName(entry.path().display().to_string()))?;
        if excluded.contains(&relative) {
            continue;
        }

        let target = root.join(relative);
        archive::ensure_within(&root, &target, &relative.display().to_string())?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::io("create directory", parent, e))?;
        }
        std::fs::copy(entry.path(), &target)
            .map_err(|e| StorageError::io("copy file", &target, e))?;
        copied += 1;
    }

    Ok(copied)
}
