//! Canonical paths for packvault.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! ## Temp Root Layout
//!
//! | Location | Owner | Purpose |
//! |----------|-------|---------|
//! | `<id>/` | ContentPackageStore | Working directory of a package |
//! | `<id>.zip` | ContentPackageStore | Staging archive during repack |
//! | `<id>.lock` | PackageLease | Advisory lock for a package |
//! | `library-<n>.zip` | LibraryPackageStore | Staging archive for a library |
//! | `editor/` | FileStorageAdapter | Editor scratch files |
//! | `uploads/` | FileStorageAdapter | Fresh upload directories |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Editor scratch directory name
pub const EDITOR_DIR: &str = "editor";

/// Upload directory name
pub const UPLOADS_DIR: &str = "uploads";

/// Default data home (~/.packvault)
pub fn default_home() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".packvault"))
}

/// Default temp root below a data home
pub fn default_temp_root(home: &Path) -> PathBuf {
    home.join("tmp")
}

/// Editor scratch area for files that do not yet belong to a package
pub fn editor_dir(temp_root: &Path) -> PathBuf {
    temp_root.join(EDITOR_DIR)
}

/// Parent directory of fresh upload paths
pub fn uploads_dir(temp_root: &Path) -> PathBuf {
    temp_root.join(UPLOADS_DIR)
}

/// Staging archive for packaging a library
pub fn library_staging_archive(temp_root: &Path, library_id: u64) -> PathBuf {
    temp_root.join(format!("library-{}.zip", library_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_home_is_dot_dir() {
        let home = default_home().unwrap();
        assert!(home.ends_with(".packvault"));
    }

    #[test]
    fn test_temp_root_layout() {
        let root = Path::new("/srv/tmp");
        assert_eq!(editor_dir(root), PathBuf::from("/srv/tmp/editor"));
        assert_eq!(uploads_dir(root), PathBuf::from("/srv/tmp/uploads"));
        assert_eq!(
            library_staging_archive(root, 12),
            PathBuf::from("/srv/tmp/library-12.zip")
        );
    }
}
