//! Per-package working directories under the temp root.
//!
//! # Layout
//!
//! ```text
//! <temp_root>/
//! ├── <id>/          # working directory (disposable)
//! ├── <id>.zip       # staging archive during repack
//! └── <id>.lock      # package lease (never removed)
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::domain::PackageId;

use super::error::{StorageError, StorageResult};

/// Maps package ids to working directories and manages their lifetime
#[derive(Debug, Clone)]
pub struct WorkingDirectoryManager {
    temp_root: PathBuf,
}

impl WorkingDirectoryManager {
    pub fn new(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
        }
    }

    /// Working directory for a package (`<temp_root>/<id>`)
    pub fn path_for(&self, id: PackageId) -> PathBuf {
        self.temp_root.join(id.to_string())
    }

    /// Staging archive for a package, outside its working directory
    pub fn staging_archive_for(&self, id: PackageId) -> PathBuf {
        self.temp_root.join(format!("{}.zip", id))
    }

    /// Lease file for a package.
    ///
    /// The file outlives every lease and package deletion: a waiter may be
    /// blocked on its inode, and a recreated file would admit a second holder.
    pub fn lock_path_for(&self, id: PackageId) -> PathBuf {
        self.temp_root.join(format!("{}.lock", id))
    }

    /// Create the directory tree if missing
    pub fn ensure(&self, path: &Path) -> StorageResult<()> {
        fs::create_dir_all(path).map_err(|e| StorageError::io("create directory", path, e))
    }

    /// Remove empty subdirectories below `path`, deepest first.
    ///
    /// `path` itself is kept. Returns the number of files found.
    pub fn prune_empty_dirs(&self, path: &Path) -> StorageResult<usize> {
        if !path.is_dir() {
            return Ok(0);
        }
        prune(path, true)
    }

    /// True if `path` is missing or holds no files once empty
    /// subdirectories are pruned.
    pub fn is_empty_or_missing(&self, path: &Path) -> StorageResult<bool> {
        Ok(self.prune_empty_dirs(path)? == 0)
    }

    /// Delete the tree at `path`; a missing path is not an error
    pub fn remove_recursively(&self, path: &Path) -> StorageResult<()> {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io("remove directory", path, e)),
        }
    }

    /// Delete a single file; a missing file is not an error
    pub fn remove_file(&self, path: &Path) -> StorageResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io("remove file", path, e)),
        }
    }
}

/// Returns the number of regular files left under `dir`.
///
/// Symlinks and other special entries are not counted, matching what
/// `archive::pack` would write, but a directory holding one is kept.
fn prune(dir: &Path, is_root: bool) -> StorageResult<usize> {
    let entries = fs::read_dir(dir).map_err(|e| StorageError::io("read directory", dir, e))?;

    let mut files = 0;
    let mut others = 0;
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io("read directory", dir, e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| StorageError::io("inspect entry", entry.path(), e))?;

        if file_type.is_dir() {
            let nested = prune(&entry.path(), false)?;
            if nested == 0 && entry.path().exists() {
                others += 1;
            }
            files += nested;
        } else if file_type.is_file() {
            files += 1;
        } else {
            others += 1;
        }
    }

    if files == 0 && others == 0 && !is_root {
        fs::remove_dir(dir).map_err(|e| StorageError::io("remove empty directory", dir, e))?;
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_are_derived_from_id() {
        let manager = WorkingDirectoryManager::new("/tmp/packvault");
        let id = PackageId::new(42);

        assert_eq!(manager.path_for(id), PathBuf::from("/tmp/packvault/42"));
        assert_eq!(
            manager.staging_archive_for(id),
            PathBuf::from("/tmp/packvault/42.zip")
        );
        assert!(!manager.staging_archive_for(id).starts_with(manager.path_for(id)));
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let manager = WorkingDirectoryManager::new(temp.path());
        let path = manager.path_for(PackageId::new(1)).join("a/b");

        manager.ensure(&path).unwrap();
        manager.ensure(&path).unwrap();
        assert!(path.is_dir());
    }

    #[test]
    fn test_empty_or_missing() {
        let temp = TempDir::new().unwrap();
        let manager = WorkingDirectoryManager::new(temp.path());
        let path = manager.path_for(PackageId::new(5));

        assert!(manager.is_empty_or_missing(&path).unwrap());

        fs::create_dir_all(path.join("x/y/z")).unwrap();
        fs::create_dir_all(path.join("w")).unwrap();
        assert!(manager.is_empty_or_missing(&path).unwrap());
        assert!(path.is_dir());
        assert!(!path.join("x").exists());

        fs::create_dir_all(path.join("keep/empty")).unwrap();
        fs::write(path.join("keep/file.txt"), b"data").unwrap();
        assert!(!manager.is_empty_or_missing(&path).unwrap());
        assert!(!path.join("keep/empty").exists());
        assert!(path.join("keep/file.txt").exists());
    }

    #[test]
    fn test_remove_recursively_tolerates_missing() {
        let temp = TempDir::new().unwrap();
        let manager = WorkingDirectoryManager::new(temp.path());
        let path = manager.path_for(PackageId::new(9));

        manager.remove_recursively(&path).unwrap();

        fs::create_dir_all(path.join("sub")).unwrap();
        fs::write(path.join("sub/f"), b"1").unwrap();
        manager.remove_recursively(&path).unwrap();
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_only_tree_counts_as_empty() {
        let temp = TempDir::new().unwrap();
        let manager = WorkingDirectoryManager::new(temp.path());
        let path = manager.path_for(PackageId::new(6));
        fs::create_dir_all(path.join("sub")).unwrap();
        std::os::unix::fs::symlink(temp.path(), path.join("sub/link")).unwrap();

        assert!(manager.is_empty_or_missing(&path).unwrap());
        assert!(path.join("sub").is_dir(), "directory holding a symlink is kept");
    }
}
