//! Core storage engine.
//!
//! This module contains:
//! - Archive: Zip pack/unpack with path-safety checks
//! - WorkingDirectoryManager: Per-package working directories
//! - EditSession: Session-scoped dump tracking and package leases
//! - ContentPackageStore: Unpack-on-demand and repack-on-save
//! - LibraryPackageStore: One-shot library packaging

pub mod archive;
pub mod content_store;
pub mod error;
pub mod library_store;
pub mod session;
pub mod workdir;

// Re-export commonly used types
pub use archive::{pack, safe_relative_path, unpack, ArchiveSummary, Compression};
pub use content_store::ContentPackageStore;
pub use error::{PackageContext, StorageError, StorageResult};
pub use library_store::LibraryPackageStore;
pub use session::{EditSession, PackageLease};
pub use workdir::WorkingDirectoryManager;

/// Run blocking filesystem work on the blocking thread pool
pub(crate) async fn run_blocking<T, F>(work: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        StorageError::io(
            "join blocking task",
            std::path::PathBuf::new(),
            std::io::Error::new(std::io::ErrorKind::Other, e),
        )
    })?
}
